/// The max-volume-size and size-info query service.
pub mod service;
