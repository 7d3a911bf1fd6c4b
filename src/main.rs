//! Custody engine (v1)
//!
//! # Architecture Overview
//!
//! ```text
//!   Client ──▶ http (axum) ──▶ services ──┬──▶ jobs::WorkerPool ──┐
//!                                        │                       ▼
//!                                        └──────────────▶ workflow (submit / confirm)
//!                                                           │           │
//!                                                  keys::KeyManager   chain::BlockchainClient
//!                                                  (per-key leases)          │
//!                                                                            ▼
//!                                                                      chain::Emulator
//! ```

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;

use custody_engine::config::{load_config, ServiceConfig};
use custody_engine::http::{AppState, HttpServer};
use custody_engine::keys::LocalKey;
use custody_engine::lifecycle::{bootstrap, wait_for_signal, Shutdown};
use custody_engine::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "custody-engine")]
#[command(about = "Custodial ledger account and transaction service", long_about = None)]
struct Cli {
    /// TOML configuration file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ServiceConfig::default(),
    };
    logging::init_logging(&config.observability.log_level);

    tracing::info!("custody-engine v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        network = config.chain.network.chain_id(),
        workers = config.workers.count,
        capacity = config.workers.capacity,
        "Configuration loaded"
    );

    let admin_key = LocalKey::from_env(&config.admin.private_key_env)?;

    if config.observability.metrics_enabled {
        let addr: SocketAddr = config.observability.metrics_address.parse()?;
        metrics::init_metrics(addr)?;
    }

    let app = Arc::new(bootstrap(config, admin_key)?);

    let listener = TcpListener::bind(&app.config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let stopped = shutdown.signalled();
    let signals = {
        let app = app.clone();
        tokio::spawn(async move {
            wait_for_signal().await;
            shutdown.trigger();
            wait_for_signal().await;
            app.abort();
        })
    };

    let server = HttpServer::new(AppState::from_app(&app), &app.config.listener);
    server.run(listener, stopped).await?;

    app.shutdown().await;
    signals.abort();

    tracing::info!("Shutdown complete");
    Ok(())
}
