use anyhow::Context;
use clap::Parser;

use youtube_relay::telemetry::init_tracing;
use youtube_relay::{run_server, Cli, ServerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = ServerConfig::from_cli(cli).context("Invalid configuration")?;

    init_tracing(config.log_level).context("Failed to initialize tracing")?;

    run_server(config).await?;
    Ok(())
}
