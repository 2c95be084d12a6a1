/// Common error type and conversions for the agents.
pub mod errors;
