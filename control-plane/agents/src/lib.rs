#![warn(missing_docs)]
//! Controller-side orchestration engine for the control plane: cluster
//! registry, capacity estimation and simulation, thin pool free space
//! fan-out, satellite update dispatch and the max-volume-size queries.

mod common;

/// Agent level errors.
pub use common::errors;

/// Capacity estimation, simulation and the free space fetcher.
pub mod capacity;
/// The cluster registry, satellite wrappers and pool scheduling.
pub mod controller;
/// Max-volume-size and size-info query engines.
pub mod query;
/// Satellite update dispatch with deferred failure aggregation.
pub mod satellite;
