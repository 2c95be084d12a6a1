//! Shared helpers for the control plane binaries: tracing bootstrap, shutdown
//! handling and default tunables.

/// Shutdown signal handling.
pub mod shutdown;
/// Tracing initialisation.
pub mod tracing_telemetry;

/// Default request timeout for satellite requests.
pub const DEFAULT_REQ_TIMEOUT: &str = "5s";
/// Default connect timeout for satellite connections.
pub const DEFAULT_CONN_TIMEOUT: &str = "1s";
/// Default thin oversubscription ratio applied when neither the pool nor the
/// cluster configures one.
pub const DEFAULT_MAX_OVERSUBSCRIPTION_RATIO: &str = "20";

/// Package description and version from the package manifest.
#[macro_export]
macro_rules! package_description {
    () => {
        env!("CARGO_PKG_DESCRIPTION")
    };
}

/// Print package name and version, eg on binary startup.
#[macro_export]
macro_rules! print_package_info {
    () => {
        println!(
            "{} {} ({})",
            env!("CARGO_PKG_DESCRIPTION"),
            env!("CARGO_PKG_VERSION"),
            env!("CARGO_PKG_NAME"),
        );
    };
}
