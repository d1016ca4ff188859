//! Schema-validating HTTP gateway.
//!
//! ```text
//!     Client Request
//!     ──────────────▶ http server ──▶ ValidationGate ──┬──▶ pass-through ─────┐
//!                                                      │                      │
//!                                                      └──▶ ValidationPipeline│
//!                                                           in-check          │
//!                                                           forward ◀─────────┤
//!                                                           out-check         │
//!                                                                             ▼
//!     Client Response                                   DeferCloseClient ──▶ Backend
//!     ◀──────────────────────────────────────────────────────────────────────
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use schema_gateway::config::{load_config, ConfigWatcher, GatewayConfig};
use schema_gateway::observability::{logging, metrics};
use schema_gateway::{HttpServer, Shutdown};

#[derive(Parser)]
#[command(name = "schema-gateway")]
#[command(about = "HTTP gateway validating JSON bodies against schemas", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file. Defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => GatewayConfig::default(),
    };

    logging::init_logging(&config.observability.log_level);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "schema-gateway starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        backend = %config.backend.address,
        rules = config.validation.rules.len(),
        fail_on_error = config.validation.fail_on_error,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    // The watcher must stay alive for as long as the server runs.
    let (config_updates, _watcher) = match &cli.config {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            (updates, Some(watcher.run()?))
        }
        None => {
            let (_tx, updates) = mpsc::unbounded_channel();
            (updates, None)
        }
    };

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let server = HttpServer::new(config)?;
    let signals = shutdown.trigger_on_signal();
    server.run(listener, config_updates, shutdown.subscribe()).await?;
    signals.abort();

    tracing::info!("Shutdown complete");
    Ok(())
}
