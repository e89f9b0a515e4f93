//! # Error Types
//!
//! Codec error types for pushgate-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  pushgate-core errors (this file)                                      │
//! │  ├── EncodingError        - job cannot become a valid frame            │
//! │  ├── FrameError           - bytes are not a valid notification frame   │
//! │  └── FeedbackDecodeError  - feedback stream ended mid-record           │
//! │                                                                         │
//! │  pushgate-gateway errors (separate crate)                              │
//! │  └── GatewayError         - connection, send, feedback, config         │
//! │                                                                         │
//! │  Flow: EncodingError → GatewayError::Encoding → failed job report      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! An `EncodingError` means the job itself is malformed. Sending it again
//! unchanged will fail the same way.

use thiserror::Error;

// =============================================================================
// Encoding Error
// =============================================================================

/// A notification could not be turned into a wire frame.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodingError {
    /// The JSON payload is larger than the gateway accepts.
    ///
    /// ## When This Occurs
    /// - Long alert text
    /// - Large custom data objects
    #[error("Payload is {size} bytes, the gateway accepts at most {max}")]
    PayloadTooLarge { size: usize, max: usize },

    /// The decoded device token has the wrong number of bytes.
    #[error("Device token is {actual} bytes, expected {expected}")]
    InvalidTokenLength { expected: usize, actual: usize },

    /// The device token is not valid hex (or is empty).
    #[error("Invalid device token: {reason}")]
    InvalidToken { reason: String },

    /// The payload object could not be serialized.
    #[error("Failed to serialize payload: {0}")]
    Serialization(String),
}

// =============================================================================
// Frame Error
// =============================================================================

/// Bytes could not be parsed as a notification frame.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    /// First byte is not the notification command.
    #[error("Unknown command byte: {0}")]
    UnknownCommand(u8),

    /// Input ends before the frame does.
    #[error("Frame truncated: need {needed} more bytes")]
    Truncated { needed: usize },

    /// Payload bytes are not a JSON document.
    #[error("Invalid frame payload: {0}")]
    InvalidPayload(String),
}

// =============================================================================
// Feedback Decode Error
// =============================================================================

/// The feedback stream closed with a partial record in the buffer.
///
/// A truncated final record cannot be told apart from a graceful close on
/// this protocol, so callers log this and keep the records decoded so far.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FeedbackDecodeError {
    #[error("Feedback stream ended mid-record: {available} trailing bytes, {needed} more expected")]
    TruncatedRecord { available: usize, needed: usize },
}
