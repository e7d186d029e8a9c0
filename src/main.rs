//! Edge request-filtering gateway.
//!
//! # Architecture Overview
//!
//! ```text
//!                        ┌───────────────────────────────────────────────────────┐
//!                        │                    EDGE GATEWAY                        │
//!    Client Request      │  ┌─────────┐   ┌──────────┐   ┌──────────────────┐    │
//!  ──────────────────────┼─▶│  http   │──▶│ request  │──▶│ decision engine  │    │
//!                        │  │ server  │   │ context  │   │ scan → geo →     │    │
//!                        │  └─────────┘   └──────────┘   │ rate → bot       │    │
//!                        │                               └────────┬─────────┘    │
//!                        │                    deny ◀──────────────┤              │
//!                        │                      │                 │ allow        │
//!    Client Response     │  ┌──────────┐        │         ┌───────▼───────┐      │
//!  ◀─────────────────────┼──│ response │◀───────┴─────────│ origin client │◀─────┼──── Origin
//!                        │  │ + headers│                  └───────────────┘      │
//!                        │  └──────────┘                                         │
//!                        │  ┌──────────────────────────────────────────────────┐ │
//!                        │  │ counter store (memory | redis)   audit worker    │ │
//!                        │  │ policy snapshot (arc-swap)       admin API       │ │
//!                        │  └──────────────────────────────────────────────────┘ │
//!                        └───────────────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use edge_gateway::admin::setup_admin_router;
use edge_gateway::config::{load_config, watcher::ConfigWatcher, GatewayConfig};
use edge_gateway::error::StartupError;
use edge_gateway::lifecycle::{signals, startup, Shutdown};
use edge_gateway::observability::{init_logging, metrics};
use edge_gateway::GatewayServer;

#[derive(Parser)]
#[command(name = "edge-gateway", version, about = "Edge request-filtering gateway")]
struct Args {
    /// Path to the TOML configuration file. Built-in defaults when omitted.
    #[arg(short, long, env = "GATEWAY_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => GatewayConfig::default(),
    };

    if let Err(e) = init_logging(&config.observability) {
        eprintln!("logging already initialised: {e}");
    }

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "edge-gateway starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        origin = %config.origin.url,
        max_in_flight = config.listener.max_in_flight,
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let store = startup::build_counter_store(&config).await?;
    let sink = startup::build_audit_sink(&config).await?;
    let server = GatewayServer::new(config.clone(), store, sink)?;

    let shutdown = Shutdown::new();
    signals::spawn_signal_listener(shutdown.clone());

    // The watcher handle must outlive the server.
    let (config_updates, _watcher) = match &args.config {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            (updates, Some(watcher.run()?))
        }
        None => {
            let (_tx, updates) = mpsc::unbounded_channel();
            (updates, None)
        }
    };

    if config.admin.enabled {
        let admin_listener = TcpListener::bind(&config.admin.bind_address)
            .await
            .map_err(|_| StartupError::Address {
                field: "admin.bind_address",
                value: config.admin.bind_address.clone(),
            })?;
        tracing::info!(address = %admin_listener.local_addr()?, "Admin API listening");

        let admin = setup_admin_router(server.admin_state());
        let mut admin_shutdown = shutdown.subscribe();
        tokio::spawn(async move {
            let result = axum::serve(admin_listener, admin)
                .with_graceful_shutdown(async move {
                    let _ = admin_shutdown.recv().await;
                })
                .await;
            if let Err(e) = result {
                tracing::error!(error = %e, "Admin API stopped with error");
            }
        });
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    server.run(listener, config_updates, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
