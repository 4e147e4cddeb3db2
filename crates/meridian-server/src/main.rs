//! Main entry point for a Meridian node.
//!
//! Loads configuration, initializes logging and metrics, starts the node and
//! runs the before-shutdown hooks when asked to stop.

use clap::Parser;
use tracing::{error, info};

use meridian_server::{
    cli::Cli,
    startup::{self, LoggingConfig, MeridianNode},
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let configuration = cli.load_configuration()?;

    let _logging_guard = startup::init_logging(&LoggingConfig::from_configuration(&configuration))?;

    meridian_server::metrics::init_metrics();
    if configuration.metrics_enabled() {
        meridian_server::metrics::install_exporter(&configuration.metrics_listen())?;
    }

    let node = MeridianNode::start(&configuration).await;

    let shutdown = startup::wait_for_shutdown_signal();
    let mut shutdown_rx = shutdown.subscribe();
    let _ = shutdown_rx.recv().await;

    if let Err(e) = node.shutdown().await {
        error!("Node shut down with errors: {}", e);
    }

    info!("Meridian node stopped");
    Ok(())
}
