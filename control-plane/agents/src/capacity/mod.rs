/// Usable free capacity estimation.
pub mod estimator;
/// Asynchronous thin pool free space fetcher.
pub mod fetcher;
/// Greedy multi-bin capacity simulation.
pub mod simulator;
