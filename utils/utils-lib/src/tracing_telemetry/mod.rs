use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Fmt style for the tracing output.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum FmtStyle {
    /// Plain human readable lines.
    Pretty,
    /// One json object per event.
    Json,
}

/// Initialise tracing for a binary: an fmt layer filtered by `RUST_LOG`,
/// defaulting to info level for our own crates.
pub fn init_tracing(service_name: &str, style: FmtStyle) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,h2=warn"));
    let registry = tracing_subscriber::registry().with(filter);
    match style {
        FmtStyle::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
        FmtStyle::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
    tracing::info!(service = service_name, "Tracing initialised");
}
