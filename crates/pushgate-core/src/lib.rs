//! # pushgate-core: Pure Notification Logic for Pushgate
//!
//! This crate holds everything about push notifications that can be
//! expressed without touching a socket: the data model, the JSON payload
//! layout and the gateway's fixed binary wire format.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Pushgate Architecture                            │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 apps/pushgated (host binaries)                  │   │
//! │  │      stdin jobs ──► SenderWorker        pushgate-feedback       │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │              pushgate-gateway (all network I/O)                 │   │
//! │  │   ConnectionManager ── TlsConnector ── FeedbackClient           │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │             ★ pushgate-core (THIS CRATE) ★                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐   │   │
//! │  │   │   types   │  │  payload  │  │   codec   │  │   error   │   │   │
//! │  │   │  Job      │  │  "aps"    │  │  frames   │  │ Encoding  │   │   │
//! │  │   │  Token    │  │  layout   │  │  feedback │  │ Frame     │   │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘   │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO SOCKETS • NO RUNTIME • PURE FUNCTIONS            │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (DeviceToken, Job, Notification, FeedbackItem)
//! - [`payload`] - JSON payload construction
//! - [`codec`] - Notification frames and feedback records
//! - [`error`] - Codec error types
//!
//! ## Example Usage
//!
//! ```rust
//! use pushgate_core::codec::{encode, PayloadLimits};
//! use pushgate_core::types::{DeviceToken, Notification};
//!
//! let token = DeviceToken::from_hex("a1b2c3d4e5f60718293a4b5c6d7e8f90").unwrap();
//! let notification = Notification::new(token).with_alert("Hi").with_badge(3);
//!
//! let limits = PayloadLimits { token_len: 16, ..Default::default() };
//! let frame = encode(&notification, &limits).unwrap();
//!
//! assert_eq!(frame[0], 1);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod codec;
pub mod error;
pub mod payload;
pub mod types;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use codec::{FeedbackDecoder, PayloadLimits};
pub use error::{EncodingError, FeedbackDecodeError, FrameError};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Device token length the gateway expects, in bytes.
pub const DEFAULT_TOKEN_LEN: usize = 32;

/// Largest JSON payload the gateway accepts in a notification frame.
///
/// Anything larger is rejected before it reaches the socket; the gateway
/// would otherwise drop the connection on a malformed frame.
pub const DEFAULT_MAX_PAYLOAD_LEN: usize = 256;

/// Sound name used when a job asks for `sound: true`.
pub const DEFAULT_SOUND: &str = "default";
