//! The Controller Agent: owns the cluster registry and keeps the thin pool
//! capacity cache fresh. Satellites connect through the transport surface
//! wired on top of this process.

use agents::controller::registry::{Registry, RegistryConfig};
use clap::Parser;
use utils::tracing_telemetry::FmtStyle;

/// The Cli arguments for this binary.
#[derive(Debug, Parser)]
#[clap(name = utils::package_description!(), version)]
pub(crate) struct CliArgs {
    /// The period at which the registry updates its cache of the thin pool
    /// capacity of all nodes.
    #[clap(long, short, default_value = "30s")]
    pub(crate) cache_period: humantime::Duration,

    /// The default timeout for satellite requests.
    #[clap(long, short, default_value = utils::DEFAULT_REQ_TIMEOUT)]
    pub(crate) request_timeout: humantime::Duration,

    /// The thin oversubscription ratio applied when a pool does not configure
    /// its own.
    #[clap(long, default_value = utils::DEFAULT_MAX_OVERSUBSCRIPTION_RATIO)]
    pub(crate) max_oversubscription_ratio: f64,

    /// Format the logs as json.
    #[clap(long)]
    json_logs: bool,
}
impl CliArgs {
    fn args() -> Self {
        CliArgs::parse()
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli_args = CliArgs::args();
    utils::print_package_info!();
    println!("Using options: {cli_args:?}");
    let style = if cli_args.json_logs {
        FmtStyle::Json
    } else {
        FmtStyle::Pretty
    };
    utils::tracing_telemetry::init_tracing("agent-controller", style);
    server(cli_args).await
}

async fn server(cli_args: CliArgs) -> anyhow::Result<()> {
    let registry = Registry::new(RegistryConfig::new(
        cli_args.cache_period.into(),
        cli_args.request_timeout.into(),
        cli_args.max_oversubscription_ratio,
    ));
    registry.start().await;

    let signal = utils::shutdown::Shutdown::wait().await;
    tracing::info!(?signal, "Shutting down");
    Ok(())
}
