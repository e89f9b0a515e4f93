//! # pushgate-feedback
//!
//! Connects once to the feedback service and prints every expired token as
//! a JSON line on stdout:
//!
//! ```text
//! {"timestamp":"2024-05-01T12:00:00Z","token":"a1b2c3..."}
//! ```
//!
//! The service never repeats a record, so pipe the output somewhere durable.

use std::io::Write;

use anyhow::Context;
use pushgate_gateway::{CredentialBundle, FeedbackClient, GatewayConfig, TlsConnector};
use tracing::info;

use pushgated::{feedback_line, init_tracing};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = GatewayConfig::load(None).context("Failed to load configuration")?;
    let credentials =
        CredentialBundle::from_config(&config).context("Failed to load credentials")?;

    let connector = TlsConnector::new(credentials, config.connection.connect_timeout())
        .context("Failed to load client identity")?;
    let mut client = FeedbackClient::from_config(connector, &config)?;
    info!(environment = %config.environment, endpoint = %client.endpoint(), "Fetching feedback");

    let items = client.data(false).await.context("Failed to read feedback")?;

    let mut out = std::io::stdout().lock();
    for item in items {
        writeln!(out, "{}", feedback_line(item)?)?;
    }
    out.flush()?;

    info!(count = items.len(), "Feedback dump complete");
    Ok(())
}
