/// The cluster registry.
pub mod registry;
/// Storage pool scheduling for replica placement.
pub mod scheduling;
/// Wrapper over a node and its satellite connection.
pub mod wrapper;
