mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use netfilter::Relay;

use crate::cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(cli.log_level())),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = cli.into_config();
    info!(
        host = %config.upstream_host,
        port = config.upstream_port,
        tls = config.tls,
        socket = %config.socket_path.display(),
        "Starting netfilter"
    );

    let relay = Relay::new(config);

    let shutdown = relay.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received");
            shutdown.trigger();
        }
    });

    relay.run().await.context("relay failed to start")?;

    info!("Relay stopped cleanly");
    Ok(())
}
