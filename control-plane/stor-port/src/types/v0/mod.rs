/// Transport types.
pub mod transport;
