//! # Gateway Error Types
//!
//! Error types for gateway operations.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Gateway Error Categories                           │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │    Encoding     │  │   Connection    │  │        Send             │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  PayloadTooLarge│  │ ConnectionFailed│  │  SendFailed             │ │
//! │  │  InvalidToken   │  │ ConnectTimeout  │  │  (after one reconnect)  │ │
//! │  │  (not retryable)│  │ Tls             │  │                         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │    Feedback     │  │  Configuration  │  │      Internal           │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │ FeedbackRead-   │  │  InvalidConfig  │  │  ChannelError           │ │
//! │  │ Failed          │  │  ConfigLoad...  │  │                         │ │
//! │  │                 │  │  CredentialLoad │  │                         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Connection errors and send errors are separate kinds on purpose: an
//! expired certificate shows up as a stream of `Connection` failures while a
//! network blip shows up as an occasional `Send` failure, and alerting
//! treats them differently.

use std::fmt;

use pushgate_core::EncodingError;
use thiserror::Error;

/// Result type alias for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Gateway error type covering all possible failures.
#[derive(Debug, Error)]
pub enum GatewayError {
    // =========================================================================
    // Encoding Errors
    // =========================================================================
    /// The job cannot be encoded into a frame.
    #[error("Encoding failed: {0}")]
    Encoding(#[from] EncodingError),

    // =========================================================================
    // Connection Errors
    // =========================================================================
    /// TCP connect or DNS resolution failed.
    #[error("Connection to {endpoint} failed: {reason}")]
    ConnectionFailed { endpoint: String, reason: String },

    /// Connect plus handshake did not finish in time.
    #[error("Connection to {endpoint} timed out after {secs} seconds")]
    ConnectTimeout { endpoint: String, secs: u64 },

    /// TLS setup or handshake failed (bad or expired certificate, etc).
    #[error("TLS error: {0}")]
    Tls(String),

    // =========================================================================
    // Send Errors
    // =========================================================================
    /// The frame could not be written, even after reconnecting once.
    #[error("Send failed after {attempts} attempts: {reason}")]
    SendFailed { attempts: u32, reason: String },

    // =========================================================================
    // Feedback Errors
    // =========================================================================
    /// The feedback stream broke before the peer closed it.
    #[error("Feedback read failed: {0}")]
    FeedbackReadFailed(String),

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid configuration value.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Failed to read or parse the config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Certificate or key could not be loaded.
    #[error("Failed to load credentials: {0}")]
    CredentialLoadFailed(String),

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// Channel send/receive failed.
    #[error("Channel error: {0}")]
    ChannelError(String),
}

// =============================================================================
// Error Kinds
// =============================================================================

/// Coarse error category, for reporting and alerting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Encoding,
    Connection,
    Send,
    Feedback,
    Config,
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Encoding => write!(f, "encoding"),
            ErrorKind::Connection => write!(f, "connection"),
            ErrorKind::Send => write!(f, "send"),
            ErrorKind::Feedback => write!(f, "feedback"),
            ErrorKind::Config => write!(f, "config"),
            ErrorKind::Internal => write!(f, "internal"),
        }
    }
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<native_tls::Error> for GatewayError {
    fn from(err: native_tls::Error) -> Self {
        GatewayError::Tls(err.to_string())
    }
}

impl From<toml::de::Error> for GatewayError {
    fn from(err: toml::de::Error) -> Self {
        GatewayError::ConfigLoadFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization (for retry logic)
// =============================================================================

impl GatewayError {
    /// Returns the error's category.
    pub fn kind(&self) -> ErrorKind {
        match self {
            GatewayError::Encoding(_) => ErrorKind::Encoding,
            GatewayError::ConnectionFailed { .. }
            | GatewayError::ConnectTimeout { .. }
            | GatewayError::Tls(_) => ErrorKind::Connection,
            GatewayError::SendFailed { .. } => ErrorKind::Send,
            GatewayError::FeedbackReadFailed(_) => ErrorKind::Feedback,
            GatewayError::InvalidConfig(_)
            | GatewayError::ConfigLoadFailed(_)
            | GatewayError::CredentialLoadFailed(_) => ErrorKind::Config,
            GatewayError::ChannelError(_) => ErrorKind::Internal,
        }
    }

    /// Returns true if the same job may succeed when tried again later.
    ///
    /// ## Retryable Errors
    /// - Connection failures and timeouts
    /// - Send failures
    /// - Broken feedback reads
    ///
    /// ## Non-Retryable Errors
    /// - Encoding errors (the job itself is malformed)
    /// - TLS errors (credentials need fixing first)
    /// - Configuration errors
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GatewayError::ConnectionFailed { .. }
                | GatewayError::ConnectTimeout { .. }
                | GatewayError::SendFailed { .. }
                | GatewayError::FeedbackReadFailed(_)
        )
    }

    /// Returns true if no session could be established.
    pub fn is_connection_error(&self) -> bool {
        self.kind() == ErrorKind::Connection
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        let err: GatewayError = EncodingError::PayloadTooLarge { size: 300, max: 256 }.into();
        assert_eq!(err.kind(), ErrorKind::Encoding);
        assert!(!err.is_retryable());

        let err = GatewayError::Tls("certificate expired".into());
        assert!(err.is_connection_error());
        assert!(!err.is_retryable());

        let err = GatewayError::SendFailed {
            attempts: 2,
            reason: "broken pipe".into(),
        };
        assert_eq!(err.kind(), ErrorKind::Send);
        assert!(!err.is_connection_error());
        assert!(err.is_retryable());
    }

    #[test]
    fn test_retryable_errors() {
        assert!(GatewayError::ConnectTimeout {
            endpoint: "gateway:2195".into(),
            secs: 10
        }
        .is_retryable());
        assert!(!GatewayError::InvalidConfig("bad".into()).is_retryable());
    }

    #[test]
    fn test_error_display() {
        let err = GatewayError::ConnectionFailed {
            endpoint: "gateway.sandbox.push.apple.com:2195".into(),
            reason: "dns failure".into(),
        };
        assert!(err.to_string().contains("gateway.sandbox.push.apple.com:2195"));
        assert_eq!(ErrorKind::Connection.to_string(), "connection");
    }
}
