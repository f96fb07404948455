//! Streaming relay daemon
//!
//! Binds the listening port, accepts source and listener connections,
//! and logs per-mount status lines until Ctrl-C.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use icy_relay::{error::ConfigError, RelayConfig, RelayServer};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = RelayConfig::load()?;

    // Optional port override from the command line
    if let Some(arg) = std::env::args().nth(1) {
        config.port = arg
            .parse()
            .map_err(|_| ConfigError::InvalidPort(arg.clone()))?;
    }

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting icy-relay");

    let server = Arc::new(RelayServer::new(config));
    let listener = server.bind().await?;

    let accept_task = {
        let server = server.clone();
        tokio::spawn(async move { server.serve(listener).await })
    };

    // Periodic stream status logging
    let status_task = {
        let server = server.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(30));
            // the first tick completes immediately, skip it
            ticker.tick().await;
            loop {
                ticker.tick().await;
                for mount in server.status() {
                    tracing::info!(
                        mount = %mount.path,
                        source = if mount.has_source { "connected" } else { "disconnected" },
                        listeners = mount.listener_count,
                        name = %mount.name,
                        bitrate = %mount.bitrate,
                        "stream status"
                    );
                }
            }
        })
    };

    tracing::info!("relay running - press Ctrl+C to stop");
    tokio::signal::ctrl_c().await?;

    status_task.abort();
    server.shutdown().await;
    accept_task.await?;

    Ok(())
}
