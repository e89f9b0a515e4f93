//! # Domain Types
//!
//! Core domain types used throughout Pushgate.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   TryFrom   ┌─────────────────┐                   │
//! │  │      Job        │ ──────────► │  Notification   │ ──► codec::encode │
//! │  │  ─────────────  │             │  ─────────────  │                   │
//! │  │  token (hex)    │             │  token (bytes)  │                   │
//! │  │  alert/badge    │             │  alert/badge    │                   │
//! │  │  sound          │             │  sound          │                   │
//! │  │  custom (rest)  │             │  custom         │                   │
//! │  └─────────────────┘             └─────────────────┘                   │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐                             │
//! │  │  DeviceToken    │   │  FeedbackItem   │ ◄── codec::decode_feedback  │
//! │  │  ─────────────  │   │  ─────────────  │                             │
//! │  │  raw bytes      │   │  timestamp      │                             │
//! │  │  hex on display │   │  token          │                             │
//! │  └─────────────────┘   └─────────────────┘                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::EncodingError;
use crate::DEFAULT_SOUND;

// =============================================================================
// Device Token
// =============================================================================

/// Binary device identifier.
///
/// Producers hand tokens over as hex strings. Device SDK dumps often look
/// like `<a1b2c3d4 e5f60718 ...>`, so spaces and angle brackets are
/// stripped before decoding.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceToken(Vec<u8>);

impl DeviceToken {
    /// Wraps already-decoded token bytes.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        DeviceToken(bytes.into())
    }

    /// Parses a hex token, case-insensitive.
    pub fn from_hex(s: &str) -> Result<Self, EncodingError> {
        let cleaned: String = s
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '<' && *c != '>')
            .collect();

        if cleaned.is_empty() {
            return Err(EncodingError::InvalidToken {
                reason: "token is empty".to_string(),
            });
        }

        hex::decode(&cleaned)
            .map(DeviceToken)
            .map_err(|e| EncodingError::InvalidToken {
                reason: e.to_string(),
            })
    }

    /// Returns the raw token bytes.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Number of bytes in the token.
    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Lowercase hex form, as producers supply it.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }
}

impl fmt::Display for DeviceToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for DeviceToken {
    type Err = EncodingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DeviceToken::from_hex(s)
    }
}

impl Serialize for DeviceToken {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for DeviceToken {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        DeviceToken::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// Sound
// =============================================================================

/// Sound request on a job: a sound name, or `true` for the default sound.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Sound {
    /// `true` plays [`DEFAULT_SOUND`], `false` plays nothing.
    Flag(bool),
    /// A named sound bundled with the app.
    Named(String),
}

impl Sound {
    /// Returns the sound name to put in the payload, if any.
    pub fn resolve(&self) -> Option<&str> {
        match self {
            Sound::Flag(true) => Some(DEFAULT_SOUND),
            Sound::Flag(false) => None,
            Sound::Named(name) => Some(name.as_str()),
        }
    }
}

impl From<&str> for Sound {
    fn from(name: &str) -> Self {
        Sound::Named(name.to_string())
    }
}

impl From<bool> for Sound {
    fn from(flag: bool) -> Self {
        Sound::Flag(flag)
    }
}

// =============================================================================
// Job
// =============================================================================

/// One outbound job as it sits in the external queue.
///
/// ```json
/// { "token": "a1b2...", "alert": "Hi", "badge": 3, "sound": true, "thread": 42 }
/// ```
///
/// Every key other than the four reserved ones lands in `custom`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Hex-encoded device token.
    pub token: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alert: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub badge: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sound: Option<Sound>,

    /// Application data forwarded verbatim.
    #[serde(flatten)]
    pub custom: Map<String, Value>,
}

impl Job {
    /// Creates a job with only a token.
    pub fn new(token: impl Into<String>) -> Self {
        Job {
            token: token.into(),
            alert: None,
            badge: None,
            sound: None,
            custom: Map::new(),
        }
    }

    pub fn with_alert(mut self, alert: impl Into<String>) -> Self {
        self.alert = Some(alert.into());
        self
    }

    pub fn with_badge(mut self, badge: u32) -> Self {
        self.badge = Some(badge);
        self
    }

    pub fn with_sound(mut self, sound: impl Into<Sound>) -> Self {
        self.sound = Some(sound.into());
        self
    }

    pub fn with_custom(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.custom.insert(key.into(), value.into());
        self
    }

    /// Parses a job from its JSON form.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Serializes the job back to JSON (used when reporting failures).
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

// =============================================================================
// Notification
// =============================================================================

/// A unit of outbound work with its token decoded.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub token: DeviceToken,
    pub alert: Option<String>,
    pub badge: Option<u32>,
    pub sound: Option<Sound>,
    pub custom: Map<String, Value>,
}

impl Notification {
    pub fn new(token: DeviceToken) -> Self {
        Notification {
            token,
            alert: None,
            badge: None,
            sound: None,
            custom: Map::new(),
        }
    }

    pub fn with_alert(mut self, alert: impl Into<String>) -> Self {
        self.alert = Some(alert.into());
        self
    }

    pub fn with_badge(mut self, badge: u32) -> Self {
        self.badge = Some(badge);
        self
    }

    pub fn with_sound(mut self, sound: impl Into<Sound>) -> Self {
        self.sound = Some(sound.into());
        self
    }

    pub fn with_custom(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.custom.insert(key.into(), value.into());
        self
    }
}

impl TryFrom<Job> for Notification {
    type Error = EncodingError;

    fn try_from(job: Job) -> Result<Self, Self::Error> {
        Ok(Notification {
            token: DeviceToken::from_hex(&job.token)?,
            alert: job.alert,
            badge: job.badge,
            sound: job.sound,
            custom: job.custom,
        })
    }
}

// =============================================================================
// Feedback Item
// =============================================================================

/// One expired-token record from the feedback service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackItem {
    /// When the gateway recorded the token as invalid.
    pub timestamp: DateTime<Utc>,

    /// The device token that should no longer receive notifications.
    pub token: DeviceToken,
}

impl FeedbackItem {
    pub fn new(timestamp: DateTime<Utc>, token: DeviceToken) -> Self {
        FeedbackItem { timestamp, token }
    }
}

impl fmt::Display for FeedbackItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.token)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_token_from_hex() {
        let token = DeviceToken::from_hex("ABCD").unwrap();
        assert_eq!(token.as_bytes(), &[0xab, 0xcd]);
        assert_eq!(token.to_string(), "abcd");
    }

    #[test]
    fn test_token_strips_sdk_formatting() {
        let token = DeviceToken::from_hex("<a1b2c3d4 e5f60718>").unwrap();
        assert_eq!(token.len(), 8);
        assert_eq!(token.to_hex(), "a1b2c3d4e5f60718");
    }

    #[test]
    fn test_token_rejects_bad_hex() {
        assert!(matches!(
            DeviceToken::from_hex("xyz1"),
            Err(EncodingError::InvalidToken { .. })
        ));
        assert!(matches!(
            DeviceToken::from_hex("abc"),
            Err(EncodingError::InvalidToken { .. })
        ));
        assert!(matches!(
            DeviceToken::from_hex("  "),
            Err(EncodingError::InvalidToken { .. })
        ));
    }

    #[test]
    fn test_sound_resolution() {
        assert_eq!(Sound::Flag(true).resolve(), Some(DEFAULT_SOUND));
        assert_eq!(Sound::Flag(false).resolve(), None);
        assert_eq!(Sound::from("chime.caf").resolve(), Some("chime.caf"));
    }

    #[test]
    fn test_job_collects_custom_keys() {
        let job = Job::from_json(
            r#"{"token":"abcd","alert":"Hi","badge":3,"sound":true,"thread":42,"meta":{"a":1}}"#,
        )
        .unwrap();

        assert_eq!(job.token, "abcd");
        assert_eq!(job.alert.as_deref(), Some("Hi"));
        assert_eq!(job.badge, Some(3));
        assert_eq!(job.sound, Some(Sound::Flag(true)));
        assert_eq!(job.custom.len(), 2);
        assert_eq!(job.custom["thread"], json!(42));
        assert_eq!(job.custom["meta"], json!({"a": 1}));
    }

    #[test]
    fn test_job_named_sound_and_missing_fields() {
        let job = Job::from_json(r#"{"token":"abcd","sound":"bell.aiff"}"#).unwrap();
        assert_eq!(job.sound, Some(Sound::Named("bell.aiff".into())));
        assert!(job.alert.is_none());
        assert!(job.badge.is_none());
        assert!(job.custom.is_empty());
    }

    #[test]
    fn test_job_rejects_negative_badge() {
        assert!(Job::from_json(r#"{"token":"abcd","badge":-1}"#).is_err());
    }

    #[test]
    fn test_job_json_omits_absent_fields() {
        let json = Job::new("abcd").with_alert("Hi").to_json().unwrap();
        assert_eq!(json, r#"{"token":"abcd","alert":"Hi"}"#);
    }

    #[test]
    fn test_notification_from_job() {
        let job = Job::new("abcd").with_badge(7).with_custom("k", "v");
        let notification = Notification::try_from(job).unwrap();
        assert_eq!(notification.token.as_bytes(), &[0xab, 0xcd]);
        assert_eq!(notification.badge, Some(7));
        assert_eq!(notification.custom["k"], json!("v"));
    }

    #[test]
    fn test_notification_from_job_bad_token() {
        let err = Notification::try_from(Job::new("not-hex")).unwrap_err();
        assert!(matches!(err, EncodingError::InvalidToken { .. }));
    }

    #[test]
    fn test_feedback_item_displays_token() {
        let item = FeedbackItem::new(
            DateTime::from_timestamp(100, 0).unwrap(),
            DeviceToken::from_bytes(vec![0xab, 0xcd]),
        );
        assert_eq!(item.to_string(), "abcd");

        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["token"], json!("abcd"));
    }
}
