//! # Payload Builder
//!
//! Builds the JSON document carried inside a notification frame.
//!
//! ## Layout
//! ```text
//! {
//!   "aps": { "alert": "Hi", "badge": 3, "sound": "default" },   ◄── reserved
//!   "thread": 42                                                 ◄── custom
//! }
//! ```
//!
//! - Reserved fields nest under `"aps"`; absent ones are left out, never `null`.
//! - Custom keys sit beside `"aps"` at the top level.
//! - A custom key that collides with a reserved name is dropped, so
//!   `"aps"` always comes from the reserved fields.
//! - Keys come out sorted, which makes the encoding deterministic.

use serde_json::{Map, Value};

use crate::error::EncodingError;
use crate::types::{Notification, Sound};

/// Top-level key holding the reserved fields.
pub const APS_KEY: &str = "aps";

/// Keys custom data may not use.
pub const RESERVED_KEYS: [&str; 5] = [APS_KEY, "token", "alert", "badge", "sound"];

/// Builds the payload object for a notification.
pub fn build_payload(notification: &Notification) -> Value {
    let mut aps = Map::new();

    if let Some(alert) = &notification.alert {
        aps.insert("alert".to_string(), Value::String(alert.clone()));
    }
    if let Some(badge) = notification.badge {
        aps.insert("badge".to_string(), Value::from(badge));
    }
    if let Some(sound) = notification.sound.as_ref().and_then(Sound::resolve) {
        aps.insert("sound".to_string(), Value::String(sound.to_string()));
    }

    let mut root: Map<String, Value> = notification
        .custom
        .iter()
        .filter(|(key, _)| !RESERVED_KEYS.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    root.insert(APS_KEY.to_string(), Value::Object(aps));
    Value::Object(root)
}

/// Serializes the payload to compact UTF-8 JSON.
pub fn payload_bytes(notification: &Notification) -> Result<Vec<u8>, EncodingError> {
    serde_json::to_vec(&build_payload(notification))
        .map_err(|e| EncodingError::Serialization(e.to_string()))
}
