//! # TLS Connector
//!
//! Opens mutually authenticated TLS sessions to the gateway and feedback
//! hosts.
//!
//! ```text
//! ┌──────────────┐  TCP connect   ┌──────────────┐  TLS handshake  ┌──────────────┐
//! │   Endpoint   │ ─────────────► │  TcpStream   │ ──────────────► │  TlsStream   │
//! │  host:port   │                │  (nodelay)   │  client cert    │              │
//! └──────────────┘                └──────────────┘                 └──────────────┘
//!        └────────────────── bounded by connect_timeout ─────────────────┘
//! ```
//!
//! [`Connector`] is the seam the connection manager and feedback client are
//! written against; tests substitute a scripted connector.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_native_tls::TlsStream;
use tracing::{debug, warn};

use crate::config::Endpoint;
use crate::credentials::CredentialBundle;
use crate::error::{GatewayError, GatewayResult};

/// Opens a byte stream to an endpoint.
#[async_trait]
pub trait Connector: Send + Sync {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send;

    /// Opens one session. Implementations do not retry.
    async fn connect(&self, endpoint: &Endpoint) -> GatewayResult<Self::Stream>;
}

/// Production connector: TCP plus TLS with a client certificate.
#[derive(Clone)]
pub struct TlsConnector {
    tls: tokio_native_tls::TlsConnector,
    connect_timeout: Duration,
}

impl TlsConnector {
    /// Parses the client identity once; every later connect reuses it.
    ///
    /// A bundle that does not parse fails here with
    /// [`GatewayError::CredentialLoadFailed`], never at connect time.
    pub fn new(credentials: Arc<CredentialBundle>, connect_timeout: Duration) -> GatewayResult<Self> {
        let identity = credentials.identity()?;
        let connector = native_tls::TlsConnector::builder()
            .identity(identity)
            .build()?;

        Ok(TlsConnector {
            tls: tokio_native_tls::TlsConnector::from(connector),
            connect_timeout,
        })
    }
}

#[async_trait]
impl Connector for TlsConnector {
    type Stream = TlsStream<TcpStream>;

    async fn connect(&self, endpoint: &Endpoint) -> GatewayResult<Self::Stream> {
        let tls = &self.tls;

        let handshake = async {
            let tcp = TcpStream::connect((endpoint.host.as_str(), endpoint.port))
                .await
                .map_err(|e| GatewayError::ConnectionFailed {
                    endpoint: endpoint.to_string(),
                    reason: e.to_string(),
                })?;

            if let Err(e) = tcp.set_nodelay(true) {
                warn!(?e, "Failed to set TCP_NODELAY");
            }

            tls.connect(&endpoint.host, tcp).await.map_err(GatewayError::from)
        };

        match timeout(self.connect_timeout, handshake).await {
            Ok(Ok(stream)) => {
                debug!(endpoint = %endpoint, "TLS handshake complete");
                Ok(stream)
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(GatewayError::ConnectTimeout {
                endpoint: endpoint.to_string(),
                secs: self.connect_timeout.as_secs(),
            }),
        }
    }
}
