//! Outbound message types.
//!
//! Control messages are generated by the manager itself; application
//! payloads are anything that serializes to JSON.
//!
//! # Format
//!
//! | Message | JSON |
//! |---------|------|
//! | Subscribe | `{"action": "subscribe", "topic": "stats"}` |
//! | Unsubscribe | `{"action": "unsubscribe", "topic": "stats"}` |
//! | Ping | `{"action": "ping"}` |

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};

use crate::error::Result;

use super::Topic;

// ============================================================================
// ControlMessage
// ============================================================================

/// A manager-originated message.
///
/// Control messages are never buffered; they are rebuilt from manager
/// state on the next open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum ControlMessage {
    /// Ask the server to start pushing a topic.
    Subscribe {
        /// Topic to subscribe to.
        topic: Topic,
    },

    /// Ask the server to stop pushing a topic.
    Unsubscribe {
        /// Topic to unsubscribe from.
        topic: Topic,
    },

    /// Heartbeat.
    Ping,
}

impl ControlMessage {
    /// Creates a subscribe message.
    #[inline]
    #[must_use]
    pub fn subscribe(topic: Topic) -> Self {
        Self::Subscribe { topic }
    }

    /// Creates an unsubscribe message.
    #[inline]
    #[must_use]
    pub fn unsubscribe(topic: Topic) -> Self {
        Self::Unsubscribe { topic }
    }

    /// Serializes to a wire frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`](crate::Error::Json) if serialization fails.
    pub fn to_frame(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Serializes an application payload to a wire frame.
///
/// # Errors
///
/// Returns [`Error::Json`](crate::Error::Json) if the payload cannot be
/// represented as JSON.
pub fn encode_payload<T: Serialize + ?Sized>(payload: &T) -> Result<String> {
    Ok(serde_json::to_string(payload)?)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::{Value, json};

    fn frame_value(message: &ControlMessage) -> Value {
        let frame = message.to_frame().expect("serialize");
        serde_json::from_str(&frame).expect("frame is json")
    }

    #[test]
    fn test_subscribe_shape() {
        let value = frame_value(&ControlMessage::subscribe(Topic::stats()));
        assert_eq!(value, json!({ "action": "subscribe", "topic": "stats" }));
    }

    #[test]
    fn test_unsubscribe_shape() {
        let value = frame_value(&ControlMessage::unsubscribe(Topic::rules()));
        assert_eq!(value, json!({ "action": "unsubscribe", "topic": "rules" }));
    }

    #[test]
    fn test_ping_shape() {
        let value = frame_value(&ControlMessage::Ping);
        assert_eq!(value, json!({ "action": "ping" }));
    }

    #[test]
    fn test_encode_payload() {
        let frame = encode_payload(&json!({ "action": "refresh", "page": 2 })).expect("encode");
        let value: Value = serde_json::from_str(&frame).expect("json");
        assert_eq!(value["page"], 2);
    }

    #[test]
    fn test_encode_payload_rejects_non_string_keys() {
        let mut map = std::collections::BTreeMap::new();
        map.insert(vec![1u8], 1);
        assert!(encode_payload(&map).is_err());
    }
}
