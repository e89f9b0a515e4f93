//! # Binary Codec
//!
//! The gateway's fixed binary formats.
//!
//! ## Notification Frame (client → gateway)
//! ```text
//! ┌─────────┬──────────────┬─────────────┬────────────────┬───────────────┐
//! │ command │ token length │ token bytes │ payload length │ payload bytes │
//! │ 1 byte  │ u16 BE       │ N bytes     │ u16 BE         │ M bytes JSON  │
//! │ = 1     │              │             │                │               │
//! └─────────┴──────────────┴─────────────┴────────────────┴───────────────┘
//! ```
//!
//! ## Feedback Record (gateway → client, repeated until the peer closes)
//! ```text
//! ┌──────────────────────┬──────────────┬─────────────┐
//! │ timestamp            │ token length │ token bytes │
//! │ u32 BE, epoch secs   │ u16 BE       │ N bytes     │
//! └──────────────────────┴──────────────┴─────────────┘
//! ```
//!
//! The feedback socket is a plain byte stream: a read can end anywhere,
//! including in the middle of a record. [`decode_feedback_record`] reports
//! [`Decoded::NeedMoreData`] in that case and [`FeedbackDecoder`] keeps the
//! partial bytes until the next read arrives.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::{EncodingError, FeedbackDecodeError, FrameError};
use crate::payload::payload_bytes;
use crate::types::{DeviceToken, FeedbackItem, Notification};
use crate::{DEFAULT_MAX_PAYLOAD_LEN, DEFAULT_TOKEN_LEN};

// =============================================================================
// Constants
// =============================================================================

/// Command byte of a notification frame.
pub const NOTIFICATION_COMMAND: u8 = 1;

/// Fixed bytes in a notification frame besides token and payload.
const FRAME_OVERHEAD: usize = 1 + 2 + 2;

/// Timestamp plus token length prefix.
const FEEDBACK_HEADER_LEN: usize = 4 + 2;

// =============================================================================
// Payload Limits
// =============================================================================

/// Size constraints the gateway enforces on a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayloadLimits {
    /// Exact token length in bytes.
    pub token_len: usize,

    /// Maximum payload length in bytes. At most `u16::MAX`.
    pub max_payload_len: usize,
}

impl Default for PayloadLimits {
    fn default() -> Self {
        PayloadLimits {
            token_len: DEFAULT_TOKEN_LEN,
            max_payload_len: DEFAULT_MAX_PAYLOAD_LEN,
        }
    }
}

// =============================================================================
// Notification Encoding
// =============================================================================

/// Builds a notification frame from a token and an encoded payload.
///
/// Both lengths are checked before the frame is allocated, so a failure
/// never yields partial output.
pub fn encode_notification(
    token: &DeviceToken,
    payload: &[u8],
    limits: &PayloadLimits,
) -> Result<Vec<u8>, EncodingError> {
    if token.len() != limits.token_len {
        return Err(EncodingError::InvalidTokenLength {
            expected: limits.token_len,
            actual: token.len(),
        });
    }

    let max = limits.max_payload_len.min(u16::MAX as usize);
    if payload.len() > max {
        return Err(EncodingError::PayloadTooLarge {
            size: payload.len(),
            max,
        });
    }

    let token_len = u16::try_from(token.len()).map_err(|_| EncodingError::InvalidTokenLength {
        expected: limits.token_len,
        actual: token.len(),
    })?;
    let payload_len = u16::try_from(payload.len()).map_err(|_| EncodingError::PayloadTooLarge {
        size: payload.len(),
        max,
    })?;

    let mut frame = Vec::with_capacity(FRAME_OVERHEAD + token.len() + payload.len());
    frame.push(NOTIFICATION_COMMAND);
    frame.extend_from_slice(&token_len.to_be_bytes());
    frame.extend_from_slice(token.as_bytes());
    frame.extend_from_slice(&payload_len.to_be_bytes());
    frame.extend_from_slice(payload);

    Ok(frame)
}

/// Builds the payload for a notification and frames it.
pub fn encode(notification: &Notification, limits: &PayloadLimits) -> Result<Vec<u8>, EncodingError> {
    let payload = payload_bytes(notification)?;
    encode_notification(&notification.token, &payload, limits)
}

// =============================================================================
// Notification Decoding
// =============================================================================

/// A parsed notification frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationFrame {
    pub token: DeviceToken,
    pub payload: Vec<u8>,
}

impl NotificationFrame {
    /// Parses the payload bytes as JSON.
    pub fn payload_json(&self) -> Result<Value, FrameError> {
        serde_json::from_slice(&self.payload).map_err(|e| FrameError::InvalidPayload(e.to_string()))
    }
}

/// Parses one notification frame from the front of `bytes`.
///
/// Returns the frame and the number of bytes it occupied, so captured
/// traffic holding several frames back to back can be walked in a loop.
pub fn decode_notification_frame(bytes: &[u8]) -> Result<(NotificationFrame, usize), FrameError> {
    let command = *bytes.first().ok_or(FrameError::Truncated { needed: 1 })?;
    if command != NOTIFICATION_COMMAND {
        return Err(FrameError::UnknownCommand(command));
    }

    let token_len = read_u16(bytes, 1)? as usize;
    let token_start = 3;
    let token_end = token_start + token_len;
    let payload_len = read_u16(bytes, token_end)? as usize;
    let payload_start = token_end + 2;
    let payload_end = payload_start + payload_len;

    if bytes.len() < payload_end {
        return Err(FrameError::Truncated {
            needed: payload_end - bytes.len(),
        });
    }

    let frame = NotificationFrame {
        token: DeviceToken::from_bytes(&bytes[token_start..token_end]),
        payload: bytes[payload_start..payload_end].to_vec(),
    };

    Ok((frame, payload_end))
}

fn read_u16(bytes: &[u8], at: usize) -> Result<u16, FrameError> {
    match bytes.get(at..at + 2) {
        Some(&[hi, lo]) => Ok(u16::from_be_bytes([hi, lo])),
        _ => Err(FrameError::Truncated {
            needed: (at + 2).saturating_sub(bytes.len()),
        }),
    }
}

// =============================================================================
// Feedback Decoding
// =============================================================================

/// Result of trying to decode one feedback record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// A complete record and how many bytes it used.
    Item { item: FeedbackItem, consumed: usize },

    /// The input holds only part of a record.
    NeedMoreData { needed: usize },
}

/// Decodes one feedback record from the front of `bytes`.
pub fn decode_feedback_record(bytes: &[u8]) -> Decoded {
    let (ts, len) = match bytes {
        [t0, t1, t2, t3, l0, l1, ..] => (
            u32::from_be_bytes([*t0, *t1, *t2, *t3]),
            u16::from_be_bytes([*l0, *l1]) as usize,
        ),
        _ => {
            return Decoded::NeedMoreData {
                needed: FEEDBACK_HEADER_LEN - bytes.len(),
            }
        }
    };

    let total = FEEDBACK_HEADER_LEN + len;
    if bytes.len() < total {
        return Decoded::NeedMoreData {
            needed: total - bytes.len(),
        };
    }

    let timestamp = DateTime::<Utc>::from_timestamp(i64::from(ts), 0).unwrap_or_default();
    let token = DeviceToken::from_bytes(&bytes[FEEDBACK_HEADER_LEN..total]);

    Decoded::Item {
        item: FeedbackItem::new(timestamp, token),
        consumed: total,
    }
}

/// Incremental feedback decoder.
///
/// Feed it whatever each socket read returns; it hands back every complete
/// record in stream order and holds on to the remainder.
#[derive(Debug, Default)]
pub struct FeedbackDecoder {
    buf: Vec<u8>,
}

impl FeedbackDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends bytes read from the stream.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Removes and returns every complete record currently buffered.
    pub fn drain_items(&mut self) -> Vec<FeedbackItem> {
        let mut items = Vec::new();
        let mut offset = 0;

        while let Decoded::Item { item, consumed } = decode_feedback_record(&self.buf[offset..]) {
            items.push(item);
            offset += consumed;
        }

        self.buf.drain(..offset);
        items
    }

    /// Bytes of an incomplete record still waiting for more data.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Ends the stream. Fails if a partial record is left over.
    pub fn finish(self) -> Result<(), FeedbackDecodeError> {
        if self.buf.is_empty() {
            return Ok(());
        }

        let needed = match decode_feedback_record(&self.buf) {
            Decoded::NeedMoreData { needed } => needed,
            Decoded::Item { .. } => 0,
        };

        Err(FeedbackDecodeError::TruncatedRecord {
            available: self.buf.len(),
            needed,
        })
    }
}

/// Decodes a complete feedback stream in one go.
///
/// Returns every full record plus the truncation error, if the stream ended
/// mid-record. The partial bytes are discarded.
pub fn decode_feedback_stream(bytes: &[u8]) -> (Vec<FeedbackItem>, Option<FeedbackDecodeError>) {
    let mut decoder = FeedbackDecoder::new();
    decoder.extend(bytes);
    let items = decoder.drain_items();
    (items, decoder.finish().err())
}

// =============================================================================
// Unit Tests
// =============================================================================
