//! # Feedback Client
//!
//! Reads the list of device tokens the gateway no longer delivers to.
//!
//! ## Read Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  data(force) ──► cached and !force? ──yes──► return cache              │
//! │                         │                                               │
//! │                         no                                              │
//! │                         ▼                                               │
//! │  connect ──► read chunk ──► FeedbackDecoder ──► drain records          │
//! │                  ▲                                   │                  │
//! │                  └──────────── until EOF ◄───────────┘                  │
//! │                         │                                               │
//! │                         ▼                                               │
//! │  discard truncated tail (logged) ──► close ──► replace cache           │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The service hands each record out exactly once. A fetched list is kept
//! for the life of the client so calling again does not lose data; `force`
//! and `invalidate` throw it away for good.

use std::time::Duration;

use pushgate_core::{DeviceToken, FeedbackDecoder, FeedbackItem};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::{Endpoint, Environment, GatewayConfig};
use crate::error::{GatewayError, GatewayResult};
use crate::tls::Connector;

/// Bytes requested per read.
const READ_CHUNK: usize = 4096;

/// Default bound on one read.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Pull-based client for the feedback service, with a per-instance cache.
pub struct FeedbackClient<C: Connector> {
    connector: C,
    endpoint: Endpoint,
    read_timeout: Duration,
    cache: Option<Vec<FeedbackItem>>,
    fetches: u64,
}

impl<C: Connector> FeedbackClient<C> {
    /// Client for the environment's feedback host.
    pub fn new(connector: C, environment: Environment) -> Self {
        Self::with_endpoint(connector, environment.feedback_endpoint())
    }

    /// Client for an explicit host.
    pub fn with_endpoint(connector: C, endpoint: Endpoint) -> Self {
        FeedbackClient {
            connector,
            endpoint,
            read_timeout: DEFAULT_READ_TIMEOUT,
            cache: None,
            fetches: 0,
        }
    }

    /// Client for the configured host and read timeout.
    pub fn from_config(connector: C, config: &GatewayConfig) -> GatewayResult<Self> {
        Ok(Self::with_endpoint(connector, config.feedback_endpoint()?)
            .with_read_timeout(config.connection.read_timeout()))
    }

    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Network reads performed so far.
    pub fn fetches(&self) -> u64 {
        self.fetches
    }

    /// Returns feedback records, fetching only when nothing is cached or
    /// `force` is set.
    ///
    /// On failure the previous cache, if any, is kept.
    pub async fn data(&mut self, force: bool) -> GatewayResult<&[FeedbackItem]> {
        let items = match self.cache.take() {
            Some(cached) if !force => cached,
            previous => match self.fetch().await {
                Ok(items) => items,
                Err(e) => {
                    self.cache = previous;
                    return Err(e);
                }
            },
        };
        Ok(self.cache.insert(items).as_slice())
    }

    /// Returns just the tokens, with the same caching rules as [`Self::data`].
    pub async fn tokens(&mut self, force: bool) -> GatewayResult<Vec<DeviceToken>> {
        let items = self.data(force).await?;
        Ok(items.iter().map(|item| item.token.clone()).collect())
    }

    /// The cached records, without touching the network.
    pub fn cached(&self) -> Option<&[FeedbackItem]> {
        self.cache.as_deref()
    }

    /// Drops the cache. The dropped records cannot be fetched again.
    pub fn invalidate(&mut self) {
        if let Some(items) = self.cache.take() {
            warn!(discarded = items.len(), "Feedback cache invalidated");
        }
    }

    async fn fetch(&mut self) -> GatewayResult<Vec<FeedbackItem>> {
        info!(endpoint = %self.endpoint, "Connecting to feedback service");
        let mut stream = self.connector.connect(&self.endpoint).await?;

        let mut decoder = FeedbackDecoder::new();
        let mut items = Vec::new();
        let mut buf = vec![0u8; READ_CHUNK];
        let mut total = 0usize;

        loop {
            let n = match timeout(self.read_timeout, stream.read(&mut buf)).await {
                Ok(Ok(0)) => break,
                Ok(Ok(n)) => n,
                Ok(Err(e)) => return Err(GatewayError::FeedbackReadFailed(e.to_string())),
                Err(_) => {
                    return Err(GatewayError::FeedbackReadFailed(format!(
                        "read timed out after {}s",
                        self.read_timeout.as_secs()
                    )))
                }
            };
            total += n;
            decoder.extend(&buf[..n]);
            items.extend(decoder.drain_items());
        }

        if let Err(e) = decoder.finish() {
            warn!(error = %e, "Discarding truncated feedback record");
        }

        if let Err(e) = stream.shutdown().await {
            debug!(?e, "Feedback socket shutdown failed");
        }

        self.fetches += 1;
        info!(
            endpoint = %self.endpoint,
            items = items.len(),
            bytes = total,
            "Feedback stream consumed"
        );
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::mock::{ConnectStep, MockConnector, StreamScript};

    fn record(timestamp: u32, token: &[u8]) -> Vec<u8> {
        let mut bytes = timestamp.to_be_bytes().to_vec();
        bytes.extend_from_slice(&(token.len() as u16).to_be_bytes());
        bytes.extend_from_slice(token);
        bytes
    }

    fn client(connector: &MockConnector) -> FeedbackClient<MockConnector> {
        FeedbackClient::with_endpoint(connector.clone(), Endpoint::new("127.0.0.1", 2196))
    }

    #[tokio::test]
    async fn test_decodes_single_record() {
        let bytes = vec![0x00, 0x00, 0x00, 0x64, 0x00, 0x02, 0xAB, 0xCD];
        let connector = MockConnector::script([ConnectStep::Open(StreamScript::serving(bytes, 0))]);
        let mut client = client(&connector);

        let items = client.data(false).await.unwrap();

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].timestamp.timestamp(), 100);
        assert_eq!(items[0].token.to_hex(), "abcd");
        assert_eq!(connector.shutdowns(), 1);
    }

    #[tokio::test]
    async fn test_records_split_across_reads() {
        let mut bytes = Vec::new();
        for i in 0..5u8 {
            bytes.extend(record(1_000 + i as u32, &[i; 32]));
        }
        let connector = MockConnector::script([ConnectStep::Open(StreamScript::serving(bytes, 7))]);
        let mut client = client(&connector);

        let items = client.data(false).await.unwrap();

        assert_eq!(items.len(), 5);
        for (i, item) in items.iter().enumerate() {
            assert_eq!(item.timestamp.timestamp(), 1_000 + i as i64);
            assert_eq!(item.token.as_bytes(), &[i as u8; 32]);
        }
    }

    #[tokio::test]
    async fn test_second_call_uses_cache() {
        let connector = MockConnector::script([ConnectStep::Open(StreamScript::serving(
            record(100, &[0xab, 0xcd]),
            0,
        ))]);
        let mut client = client(&connector);

        let first = client.tokens(false).await.unwrap();
        let second = client.tokens(false).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(connector.connects(), 1);
        assert_eq!(client.fetches(), 1);
    }

    #[tokio::test]
    async fn test_force_replaces_cache_even_when_empty() {
        let connector = MockConnector::script([
            ConnectStep::Open(StreamScript::serving(record(100, &[0xab, 0xcd]), 0)),
            ConnectStep::Open(StreamScript::serving(Vec::new(), 0)),
        ]);
        let mut client = client(&connector);

        assert_eq!(client.tokens(false).await.unwrap().len(), 1);
        assert!(client.tokens(true).await.unwrap().is_empty());

        assert_eq!(connector.connects(), 2);
        assert_eq!(client.cached(), Some(&[][..]));
    }

    #[tokio::test]
    async fn test_truncated_tail_is_discarded() {
        let mut bytes = record(100, &[0x01; 32]);
        bytes.extend(record(200, &[0x02; 32]));
        bytes.extend([0x00, 0x00, 0x01, 0x2c, 0x00, 0x20, 0x03]);
        let connector = MockConnector::script([ConnectStep::Open(StreamScript::serving(bytes, 10))]);
        let mut client = client(&connector);

        let items = client.data(false).await.unwrap();

        assert_eq!(items.len(), 2);
        assert_eq!(items[1].timestamp.timestamp(), 200);
    }

    #[tokio::test]
    async fn test_connection_error_propagates() {
        let connector = MockConnector::script([ConnectStep::Refuse]);
        let mut client = client(&connector);

        let err = client.data(false).await.unwrap_err();

        assert!(err.is_connection_error());
        assert!(client.cached().is_none());
        assert_eq!(connector.connects(), 1);
    }

    #[tokio::test]
    async fn test_failed_forced_read_keeps_previous_cache() {
        let broken = StreamScript {
            read_error: true,
            ..StreamScript::serving(record(300, &[0x09; 4]), 0)
        };
        let connector = MockConnector::script([
            ConnectStep::Open(StreamScript::serving(record(100, &[0xab, 0xcd]), 0)),
            ConnectStep::Open(broken),
        ]);
        let mut client = client(&connector);

        client.data(false).await.unwrap();
        let err = client.data(true).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Feedback);
        let cached = client.cached().unwrap();
        assert_eq!(cached.len(), 1);
        assert_eq!(cached[0].token.to_hex(), "abcd");
    }

    #[tokio::test]
    async fn test_invalidate_forces_next_fetch() {
        let connector = MockConnector::script([
            ConnectStep::Open(StreamScript::serving(record(100, &[0xab, 0xcd]), 0)),
            ConnectStep::Open(StreamScript::serving(record(200, &[0xef, 0x01]), 0)),
        ]);
        let mut client = client(&connector);

        client.data(false).await.unwrap();
        client.invalidate();
        assert!(client.cached().is_none());

        let tokens = client.tokens(false).await.unwrap();
        assert_eq!(tokens[0].to_hex(), "ef01");
        assert_eq!(connector.connects(), 2);
    }

    #[tokio::test]
    async fn test_clients_do_not_share_caches() {
        let production = MockConnector::script([ConnectStep::Open(StreamScript::serving(
            record(100, &[0x01]),
            0,
        ))]);
        let sandbox = MockConnector::script([ConnectStep::Open(StreamScript::serving(
            record(100, &[0x02]),
            0,
        ))]);
        let mut production = FeedbackClient::new(production, Environment::Production);
        let mut sandbox = FeedbackClient::new(sandbox, Environment::Sandbox);

        assert_eq!(production.endpoint().host, "feedback.push.apple.com");
        assert_eq!(sandbox.endpoint().host, "feedback.sandbox.push.apple.com");

        assert_eq!(production.tokens(false).await.unwrap()[0].to_hex(), "01");
        assert_eq!(sandbox.tokens(false).await.unwrap()[0].to_hex(), "02");
    }
}
