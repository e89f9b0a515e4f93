//! # pushgate-gateway: Gateway I/O for Pushgate
//!
//! This crate owns the network side of Pushgate: the persistent sender
//! connection, the worker that feeds it, and the feedback reader.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Gateway Architecture                             │
//! │                                                                         │
//! │  ┌──────────────┐     ┌──────────────────────────────────────────────┐ │
//! │  │  JobSource   │     │              SenderWorker                    │ │
//! │  │ (MemoryQueue │────►│  pull job ─► Notification ─► send ─► next    │ │
//! │  │  or a broker)│◄────│  failures reported back, loop never stops    │ │
//! │  └──────────────┘     └──────────────────────┬───────────────────────┘ │
//! │                                              │                          │
//! │                                              ▼                          │
//! │                        ┌──────────────────────────────────────────────┐ │
//! │                        │            ConnectionManager                 │ │
//! │                        │  one socket, lazy connect, one reconnect     │ │
//! │                        │  per send, exponential backoff               │ │
//! │                        └──────────────────────┬───────────────────────┘ │
//! │                                              │                          │
//! │  ┌──────────────────────┐                    ▼                          │
//! │  │   FeedbackClient     │        ┌──────────────────────┐              │
//! │  │ read-to-EOF, cached  │───────►│  Connector (TLS)     │              │
//! │  │ until forced         │        │  client certificate  │              │
//! │  └──────────────────────┘        └──────────────────────┘              │
//! │                                                                         │
//! │  Both connectors share one read-only CredentialBundle.                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`config`] - Layered configuration (file, environment, defaults)
//! - [`connection`] - `ConnectionManager` and its state
//! - [`credentials`] - Certificate/key bundle
//! - [`error`] - Gateway error types and kinds
//! - [`feedback`] - `FeedbackClient`
//! - [`queue`] - `JobSource` trait and the in-memory queue
//! - [`sender`] - `SenderWorker` daemon loop
//! - [`tls`] - `Connector` trait and the TLS implementation
//!
//! ## Usage
//!
//! ```rust,ignore
//! use pushgate_gateway::{ConnectionManager, CredentialBundle, GatewayConfig, MemoryQueue, SenderWorker};
//!
//! let config = GatewayConfig::load(None)?;
//! let credentials = CredentialBundle::from_config(&config)?;
//! let manager = ConnectionManager::tls(&config, credentials)?;
//!
//! let (queue, producer) = MemoryQueue::from_settings(&config.queue);
//! let (worker, handle) = SenderWorker::new(manager, queue);
//! tokio::spawn(worker.run());
//!
//! producer.push(Job::new(token).with_alert("Hi")).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod connection;
pub mod credentials;
pub mod error;
pub mod feedback;
pub mod queue;
pub mod sender;
pub mod tls;

#[cfg(test)]
mod mock;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::{Endpoint, Environment, GatewayConfig};
pub use connection::{ConnectionConfig, ConnectionManager, ConnectionState};
pub use credentials::CredentialBundle;
pub use error::{ErrorKind, GatewayError, GatewayResult};
pub use feedback::FeedbackClient;
pub use queue::{FailedJob, FailureLog, JobSource, MemoryQueue, QueueProducer, QueuedJob};
pub use sender::{JobState, SenderHandle, SenderWorker, WorkerStats};
pub use tls::{Connector, TlsConnector};
