//! # Connection Manager
//!
//! Owns the one persistent session to the notification gateway.
//!
//! ## Connection Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Gateway Connection States                            │
//! │                                                                         │
//! │  ┌────────────┐   connect() / first send()   ┌────────────┐            │
//! │  │Disconnected│ ───────────────────────────► │ Connected  │            │
//! │  └────────────┘                              └─────┬──────┘            │
//! │        ▲                                           │                    │
//! │        │         close() / failed write            │                    │
//! │        └───────────────────────────────────────────┘                    │
//! │                                                                         │
//! │  SEND WITH ONE RECONNECT                                               │
//! │  ───────────────────────                                               │
//! │  encode ──► write ──ok──► done (backoff reset)                         │
//! │               │                                                         │
//! │             fails                                                       │
//! │               ▼                                                         │
//! │  drop socket ──► wait backoff ──► reconnect ──► write ──ok──► done     │
//! │                                      │            │                     │
//! │                               ConnectionError   SendError               │
//! │                                                                         │
//! │  BACKOFF (before any connect that follows a failure, across sends)     │
//! │  ─────────────────────────────────────────────────────────────────     │
//! │  500ms, 1s, 2s, ... capped at 60s; reset after any successful write    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The gateway revokes clients that open a connection per message, so a
//! manager holds at most one socket and offers no way to open a second.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use pushgate_core::{codec, Notification, PayloadLimits};
use tokio::io::AsyncWriteExt;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::config::{Endpoint, GatewayConfig};
use crate::credentials::CredentialBundle;
use crate::error::{GatewayError, GatewayResult};
use crate::tls::{Connector, TlsConnector};

/// Writes attempted per send: the original plus one after reconnecting.
const SEND_ATTEMPTS: u32 = 2;

// =============================================================================
// Connection State
// =============================================================================

/// Whether the manager currently holds an open socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connected => write!(f, "connected"),
        }
    }
}

// =============================================================================
// Connection Configuration
// =============================================================================

/// Configuration for one connection manager.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Gateway host and port.
    pub endpoint: Endpoint,

    /// Bound on one frame write.
    pub write_timeout: Duration,

    /// First reconnect delay.
    pub initial_backoff: Duration,

    /// Longest reconnect delay.
    pub max_backoff: Duration,

    /// Frame limits checked before any write.
    pub limits: PayloadLimits,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        ConnectionConfig {
            endpoint: crate::config::Environment::Sandbox.gateway_endpoint(),
            write_timeout: Duration::from_secs(10),
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(60),
            limits: PayloadLimits::default(),
        }
    }
}

impl ConnectionConfig {
    pub fn from_gateway_config(config: &GatewayConfig) -> GatewayResult<Self> {
        Ok(ConnectionConfig {
            endpoint: config.gateway_endpoint()?,
            write_timeout: config.connection.write_timeout(),
            initial_backoff: config.connection.initial_backoff(),
            max_backoff: config.connection.max_backoff(),
            limits: config.payload_limits(),
        })
    }
}

// =============================================================================
// Connection Manager
// =============================================================================

/// One open session.
struct Connection<S> {
    stream: S,
    frames_written: u64,
}

/// Sends notifications over a single, lazily opened connection.
pub struct ConnectionManager<C: Connector> {
    config: ConnectionConfig,
    connector: C,
    connection: Option<Connection<C::Stream>>,
    backoff: ExponentialBackoff,
    /// Set by a failed connect or write, cleared by a successful write.
    last_attempt_failed: bool,
    reconnects: u64,
}

impl ConnectionManager<TlsConnector> {
    /// Builds a TLS-backed manager for the configured environment.
    ///
    /// No socket is opened until the first `connect` or `send`; an
    /// unusable certificate or key fails here instead.
    pub fn tls(config: &GatewayConfig, credentials: Arc<CredentialBundle>) -> GatewayResult<Self> {
        let connector = TlsConnector::new(credentials, config.connection.connect_timeout())?;
        Ok(Self::new(ConnectionConfig::from_gateway_config(config)?, connector))
    }
}

impl<C: Connector> ConnectionManager<C> {
    pub fn new(config: ConnectionConfig, connector: C) -> Self {
        let backoff = create_backoff(&config);
        ConnectionManager {
            config,
            connector,
            connection: None,
            backoff,
            last_attempt_failed: false,
            reconnects: 0,
        }
    }

    pub fn state(&self) -> ConnectionState {
        if self.connection.is_some() {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.config.endpoint
    }

    pub fn limits(&self) -> &PayloadLimits {
        &self.config.limits
    }

    /// Reconnects performed after failed writes, over the manager's life.
    pub fn reconnects(&self) -> u64 {
        self.reconnects
    }

    /// Opens the session if none is open. Does not retry or wait.
    pub async fn connect(&mut self) -> GatewayResult<()> {
        if self.connection.is_some() {
            return Ok(());
        }

        info!(endpoint = %self.config.endpoint, "Connecting to gateway");
        match self.connector.connect(&self.config.endpoint).await {
            Ok(stream) => {
                self.connection = Some(Connection {
                    stream,
                    frames_written: 0,
                });
                info!(endpoint = %self.config.endpoint, "Gateway connection established");
                Ok(())
            }
            Err(e) => {
                self.last_attempt_failed = true;
                error!(endpoint = %self.config.endpoint, error = %e, "Gateway connection failed");
                Err(e)
            }
        }
    }

    /// Encodes and writes one notification.
    ///
    /// Encoding happens before any socket work, so a malformed notification
    /// never opens a connection or writes a partial frame.
    pub async fn send(&mut self, notification: &Notification) -> GatewayResult<()> {
        let frame = codec::encode(notification, &self.config.limits)?;
        self.send_frame(&frame).await
    }

    /// Writes an already encoded frame, reconnecting at most once.
    ///
    /// A second failed write returns [`GatewayError::SendFailed`]. When the
    /// reconnect itself fails the connect error is returned unchanged
    /// (`ConnectionFailed`, `ConnectTimeout` or `Tls`), so callers that
    /// requeue on [`ErrorKind::Send`](crate::error::ErrorKind::Send) should
    /// treat [`ErrorKind::Connection`](crate::error::ErrorKind::Connection)
    /// the same way.
    ///
    /// Any connect that follows a failed connect or write first waits out
    /// the backoff, including the opening connect of a later send.
    pub async fn send_frame(&mut self, frame: &[u8]) -> GatewayResult<()> {
        self.paced_connect().await?;

        let reason = match self.write(frame).await {
            Ok(()) => {
                self.write_succeeded();
                return Ok(());
            }
            Err(reason) => reason,
        };

        warn!(endpoint = %self.config.endpoint, %reason, "Write failed, reconnecting");
        self.last_attempt_failed = true;
        self.drop_connection();

        self.paced_connect().await?;
        self.reconnects += 1;

        match self.write(frame).await {
            Ok(()) => {
                self.write_succeeded();
                info!(endpoint = %self.config.endpoint, "Frame sent after reconnect");
                Ok(())
            }
            Err(reason) => {
                self.last_attempt_failed = true;
                self.drop_connection();
                error!(endpoint = %self.config.endpoint, %reason, "Write failed after reconnect");
                Err(GatewayError::SendFailed {
                    attempts: SEND_ATTEMPTS,
                    reason,
                })
            }
        }
    }

    /// Releases the socket if open. Idempotent.
    pub async fn close(&mut self) {
        if let Some(mut connection) = self.connection.take() {
            if let Err(e) = connection.stream.shutdown().await {
                debug!(?e, "Socket shutdown failed");
            }
            info!(
                endpoint = %self.config.endpoint,
                frames = connection.frames_written,
                "Gateway connection closed"
            );
        }
    }

    async fn write(&mut self, frame: &[u8]) -> Result<(), String> {
        let Some(connection) = self.connection.as_mut() else {
            return Err("no open connection".into());
        };

        let write = async {
            connection.stream.write_all(frame).await?;
            connection.stream.flush().await
        };

        match timeout(self.config.write_timeout, write).await {
            Ok(Ok(())) => {
                connection.frames_written += 1;
                debug!(bytes = frame.len(), "Frame written");
                Ok(())
            }
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(format!(
                "write timed out after {}ms",
                self.config.write_timeout.as_millis()
            )),
        }
    }

    /// `connect`, preceded by the next backoff delay if the previous
    /// attempt failed.
    async fn paced_connect(&mut self) -> GatewayResult<()> {
        if self.connection.is_some() {
            return Ok(());
        }

        if self.last_attempt_failed {
            if let Some(delay) = self.backoff.next_backoff() {
                debug!(?delay, "Waiting before reconnect");
                tokio::time::sleep(delay).await;
            }
        }

        self.connect().await
    }

    fn write_succeeded(&mut self) {
        self.last_attempt_failed = false;
        self.backoff.reset();
    }

    fn drop_connection(&mut self) {
        if let Some(connection) = self.connection.take() {
            debug!(frames = connection.frames_written, "Dropping broken connection");
        }
    }
}

/// Creates the reconnect backoff.
fn create_backoff(config: &ConnectionConfig) -> ExponentialBackoff {
    let mut backoff = ExponentialBackoff {
        initial_interval: config.initial_backoff,
        current_interval: config.initial_backoff,
        max_interval: config.max_backoff,
        multiplier: 2.0,
        max_elapsed_time: None,
        ..Default::default()
    };
    backoff.reset();
    backoff
}
