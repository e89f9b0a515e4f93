//! # pushgated
//!
//! Sender daemon: reads notification jobs from stdin, one JSON object per
//! line, and writes them to the gateway over a single persistent connection.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           pushgated                                     │
//! │                                                                         │
//! │  stdin ──► reader thread ──► MemoryQueue ──► SenderWorker ──► gateway  │
//! │                              (bounded)           ▲            (TLS)    │
//! │                                                  │                      │
//! │  SIGINT/SIGTERM ──────────► SenderHandle ────────┘                      │
//! │                                                                         │
//! │  Exits when stdin closes or a signal arrives; the in-flight job        │
//! │  finishes and the connection is closed first. A reader still blocked   │
//! │  on stdin does not hold up exit.                                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use anyhow::Context;
use pushgate_gateway::{ConnectionManager, CredentialBundle, GatewayConfig, MemoryQueue};
use tracing::{info, warn};

use pushgated::{init_tracing, run_sender, shutdown_signal, spawn_stdin_feeder};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    info!("Starting pushgated...");

    let config = GatewayConfig::load(None).context("Failed to load configuration")?;
    info!(
        environment = %config.environment,
        gateway = %config.gateway_endpoint()?,
        "Configuration loaded"
    );

    let credentials =
        CredentialBundle::from_config(&config).context("Failed to load credentials")?;
    let mut manager = ConnectionManager::tls(&config, credentials)
        .context("Failed to load client identity")?;

    // Surface network problems at startup; the first send retries anyway.
    if let Err(e) = manager.connect().await {
        warn!(kind = %e.kind(), error = %e, "Initial gateway connection failed");
    }

    let (queue, producer) = MemoryQueue::from_settings(&config.queue);
    let failures = producer.failure_log();
    spawn_stdin_feeder(producer).context("Failed to start stdin reader")?;

    let stats = run_sender(manager, queue, shutdown_signal()).await;

    info!(
        delivered = stats.delivered,
        failed = stats.failed,
        failures_kept = failures.len().await,
        failures_evicted = failures.evicted().await,
        "pushgated stopped"
    );
    Ok(())
}
