//! Kroncache - async client for the Kroncache key-value service
//!
//! Connects to the configured service and logs key-expiration notices until
//! interrupted or the connection ends.

use anyhow::Context;
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use kroncache::{CacheClient, ClientConfig};

/// Main entry point for the Kroncache client.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Connect to the cache service
/// 4. Log expiration notices as they arrive
/// 5. Exit on SIGINT/SIGTERM or when the connection terminates
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kroncache=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Kroncache client");

    let config = ClientConfig::from_env();
    info!(
        "Configuration loaded: url={}, request_timeout={:?}, expiration_capacity={}, outbound_buffer={}",
        config.url, config.request_timeout, config.expiration_capacity, config.outbound_buffer
    );

    let client = CacheClient::connect_to(config)
        .await
        .context("failed to connect to cache service")?;
    info!("Connected");

    let mut expirations = client.subscribe_expirations();
    let watcher = tokio::spawn(async move {
        loop {
            match expirations.recv().await {
                Ok(notice) => info!(
                    key = %notice.key,
                    value = %notice.value,
                    expired_at = notice.expired_at,
                    "key expired"
                ),
                Err(RecvError::Lagged(missed)) => warn!("missed {} expiration notices", missed),
                Err(RecvError::Closed) => break,
            }
        }
    });

    tokio::select! {
        _ = shutdown_signal() => {
            client.close();
        }
        cause = client.terminated() => {
            error!("Connection lost: {}", cause);
        }
    }

    watcher.abort();
    info!("Client stats: {}", serde_json::to_string(&client.stats())?);
    info!("Client shutdown complete");
    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }
}
