//! Inbound message types.
//!
//! Every frame from the server is a JSON object with a `type` field.
//! A few types are consumed by the manager itself; the rest are routed to
//! topic handlers.
//!
//! # Message Kinds
//!
//! | `type` | Kind | Handling |
//! |--------|------|----------|
//! | `connected` | [`MessageKind::Connected`] | Captures the client ID |
//! | `pong` | [`MessageKind::Pong`] | Dropped |
//! | `error` | [`MessageKind::Error`] | Sent to the notifier |
//! | anything else | [`MessageKind::Routable`] | Dispatched by topic |

// ============================================================================
// Imports
// ============================================================================

use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::identifiers::ClientId;

use super::Topic;

// ============================================================================
// InboundMessage
// ============================================================================

/// A parsed message from the server.
///
/// The full JSON object is kept so handlers can read any field.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    fields: Map<String, Value>,
}

impl InboundMessage {
    /// Parses a text frame.
    ///
    /// # Errors
    ///
    /// - [`Error::Json`] if the frame is not valid JSON
    /// - [`Error::Protocol`] if the JSON is not an object
    pub fn parse(text: &str) -> Result<Self> {
        match serde_json::from_str::<Value>(text)? {
            Value::Object(fields) => Ok(Self { fields }),
            other => Err(Error::protocol(format!(
                "expected JSON object, got {}",
                json_kind(&other)
            ))),
        }
    }

    /// Wraps an already-decoded JSON object.
    #[inline]
    #[must_use]
    pub fn from_fields(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    /// Returns the `type` field.
    #[inline]
    #[must_use]
    pub fn message_type(&self) -> Option<&str> {
        self.fields.get("type").and_then(Value::as_str)
    }

    /// Returns the explicit `topic` field, if present and non-empty.
    #[must_use]
    pub fn explicit_topic(&self) -> Option<Topic> {
        self.fields
            .get("topic")
            .and_then(Value::as_str)
            .filter(|topic| !topic.is_empty())
            .map(Topic::new)
    }

    /// Resolves the routing topic.
    ///
    /// Uses the explicit `topic` field, falling back to inference from
    /// `type`.
    #[must_use]
    pub fn resolve_topic(&self) -> Option<Topic> {
        self.explicit_topic()
            .or_else(|| self.message_type().and_then(Topic::infer_from_type))
    }

    /// Classifies the message for manager-side interception.
    #[must_use]
    pub fn kind(&self) -> MessageKind {
        match self.message_type() {
            Some("connected") => MessageKind::Connected {
                client_id: self.get_str("client_id").map(ClientId::new),
            },
            Some("pong") => MessageKind::Pong,
            Some("error") => MessageKind::Error {
                message: self.get_string("message"),
            },
            _ => MessageKind::Routable,
        }
    }

    /// Returns a field by name.
    #[inline]
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Returns all fields.
    #[inline]
    #[must_use]
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Converts into a JSON value.
    #[inline]
    #[must_use]
    pub fn into_value(self) -> Value {
        Value::Object(self.fields)
    }

    /// Parses the message into a typed topic event.
    #[must_use]
    pub fn parse_event(&self) -> TopicEvent {
        match self.message_type().unwrap_or_default() {
            "stats_update" => TopicEvent::StatsUpdate {
                data: self.get_value("data"),
            },

            "rule_change" => TopicEvent::RuleChange {
                rule_id: self.get_i64("rule_id"),
                action: RuleAction::from(self.get_string("action").as_str()),
                details: self.get_value("details"),
            },

            "system_event" => TopicEvent::SystemEvent {
                event: self.get_string("event"),
                message: self.get_string("message"),
                data: self.get_value("data"),
            },

            "log" => TopicEvent::Log {
                level: self.get_string("level"),
                message: self.get_string("message"),
                module: self.get_str("module").map(str::to_string),
            },

            "alert" => TopicEvent::Alert {
                alert_type: self.get_string("alert_type"),
                title: self.get_string("title"),
                message: self.get_string("message"),
                severity: AlertSeverity::from(self.get_str("severity").unwrap_or("warning")),
            },

            "notification" => TopicEvent::Notification {
                user_id: self.get("user_id").and_then(Value::as_i64),
                title: self.get_string("title"),
                body: self.get_string("body"),
                action_url: self.get_str("action_url").map(str::to_string),
            },

            "batch" => TopicEvent::Batch {
                topic: self.explicit_topic(),
                count: self
                    .get("count")
                    .and_then(Value::as_u64)
                    .map_or(0, |n| usize::try_from(n).unwrap_or(usize::MAX)),
                items: self
                    .get("items")
                    .and_then(Value::as_array)
                    .map(|items| {
                        items
                            .iter()
                            .filter_map(|item| item.as_object().cloned())
                            .map(Self::from_fields)
                            .collect()
                    })
                    .unwrap_or_default(),
            },

            "event" => TopicEvent::Event {
                event: self.get_string("event"),
                data: self.get_value("data"),
            },

            "subscription" => TopicEvent::SubscriptionAck {
                topic: self.explicit_topic(),
                success: self.get_bool("success"),
            },

            "unsubscription" => TopicEvent::UnsubscriptionAck {
                topic: self.explicit_topic(),
                success: self.get_bool("success"),
            },

            _ => TopicEvent::Unknown {
                message_type: self.message_type().map(str::to_string),
            },
        }
    }

    #[inline]
    fn get_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    #[inline]
    fn get_string(&self, key: &str) -> String {
        self.get_str(key).unwrap_or_default().to_string()
    }

    #[inline]
    fn get_value(&self, key: &str) -> Value {
        self.fields.get(key).cloned().unwrap_or(Value::Null)
    }

    #[inline]
    fn get_i64(&self, key: &str) -> i64 {
        self.fields
            .get(key)
            .and_then(Value::as_i64)
            .unwrap_or_default()
    }

    #[inline]
    fn get_bool(&self, key: &str) -> bool {
        self.fields
            .get(key)
            .and_then(Value::as_bool)
            .unwrap_or_default()
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ============================================================================
// MessageKind
// ============================================================================

/// How the manager treats an inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageKind {
    /// Connection acknowledgment carrying the server-assigned identity.
    Connected {
        /// Assigned client ID.
        client_id: Option<ClientId>,
    },

    /// Heartbeat response.
    Pong,

    /// Server-reported error.
    Error {
        /// Error text from the server.
        message: String,
    },

    /// Application message for topic dispatch.
    Routable,
}

// ============================================================================
// TopicEvent
// ============================================================================

/// Typed view of a routable message.
#[derive(Debug, Clone, PartialEq)]
pub enum TopicEvent {
    /// Forwarding statistics changed.
    StatsUpdate {
        /// Statistics payload.
        data: Value,
    },

    /// A forwarding rule was created, updated, deleted or toggled.
    RuleChange {
        /// Rule primary key.
        rule_id: i64,
        /// What happened to the rule.
        action: RuleAction,
        /// Extra details.
        details: Value,
    },

    /// System-level event.
    SystemEvent {
        /// Event name.
        event: String,
        /// Human-readable message.
        message: String,
        /// Extra data.
        data: Value,
    },

    /// Log line.
    Log {
        /// Log level name.
        level: String,
        /// Log message.
        message: String,
        /// Originating module.
        module: Option<String>,
    },

    /// Alert.
    Alert {
        /// Alert category.
        alert_type: String,
        /// Alert title.
        title: String,
        /// Alert body.
        message: String,
        /// Severity.
        severity: AlertSeverity,
    },

    /// User notification. `user_id` of `None` targets everyone.
    Notification {
        /// Target user.
        user_id: Option<i64>,
        /// Title.
        title: String,
        /// Body.
        body: String,
        /// Link to follow.
        action_url: Option<String>,
    },

    /// Messages merged by server-side throttling.
    Batch {
        /// Topic the batch was published on.
        topic: Option<Topic>,
        /// Number of messages merged (may exceed `items.len()`).
        count: usize,
        /// Retained messages, oldest first.
        items: Vec<InboundMessage>,
    },

    /// Event bus bridge message.
    Event {
        /// Event name.
        event: String,
        /// Event payload.
        data: Value,
    },

    /// Server answer to a subscribe request.
    SubscriptionAck {
        /// Topic requested.
        topic: Option<Topic>,
        /// Whether the server accepted it.
        success: bool,
    },

    /// Server answer to an unsubscribe request.
    UnsubscriptionAck {
        /// Topic requested.
        topic: Option<Topic>,
        /// Whether the server accepted it.
        success: bool,
    },

    /// Any other type.
    Unknown {
        /// The unrecognized `type`, if any.
        message_type: Option<String>,
    },
}

// ============================================================================
// RuleAction
// ============================================================================

/// Change applied to a forwarding rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleAction {
    /// Rule created.
    Created,
    /// Rule updated.
    Updated,
    /// Rule deleted.
    Deleted,
    /// Rule enabled or disabled.
    Toggled,
    /// Unrecognized action.
    Other(String),
}

impl From<&str> for RuleAction {
    fn from(action: &str) -> Self {
        match action {
            "created" => Self::Created,
            "updated" => Self::Updated,
            "deleted" => Self::Deleted,
            "toggled" => Self::Toggled,
            other => Self::Other(other.to_string()),
        }
    }
}

// ============================================================================
// AlertSeverity
// ============================================================================

/// Alert severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AlertSeverity {
    /// Informational.
    Info,
    /// Warning (server default).
    Warning,
    /// Error.
    Error,
    /// Critical.
    Critical,
}

impl From<&str> for AlertSeverity {
    fn from(severity: &str) -> Self {
        match severity {
            "info" => Self::Info,
            "error" => Self::Error,
            "critical" => Self::Critical,
            _ => Self::Warning,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rejects_non_object() {
        let err = InboundMessage::parse("[1, 2]").unwrap_err();
        assert!(err.to_string().contains("array"));
        assert!(matches!(
            InboundMessage::parse("{not json").unwrap_err(),
            Error::Json(_)
        ));
    }

    #[test]
    fn test_connected_kind() {
        let msg = InboundMessage::parse(r#"{"type":"connected","client_id":"client_7"}"#)
            .expect("parse");
        assert_eq!(
            msg.kind(),
            MessageKind::Connected {
                client_id: Some(ClientId::new("client_7"))
            }
        );
    }

    #[test]
    fn test_pong_and_error_kinds() {
        let pong = InboundMessage::parse(r#"{"type":"pong"}"#).expect("parse");
        assert_eq!(pong.kind(), MessageKind::Pong);

        let err = InboundMessage::parse(r#"{"type":"error","message":"Unknown action: x"}"#)
            .expect("parse");
        assert_eq!(
            err.kind(),
            MessageKind::Error {
                message: "Unknown action: x".into()
            }
        );
    }

    #[test]
    fn test_explicit_topic_wins_over_inference() {
        let msg = InboundMessage::parse(r#"{"type":"rule_change","topic":"system"}"#)
            .expect("parse");
        assert_eq!(msg.resolve_topic(), Some(Topic::system()));
    }

    #[test]
    fn test_empty_topic_falls_back_to_inference() {
        let msg = InboundMessage::parse(r#"{"type":"log","topic":""}"#).expect("parse");
        assert_eq!(msg.resolve_topic(), Some(Topic::logs()));
    }

    #[test]
    fn test_unknown_type_has_no_topic() {
        let msg = InboundMessage::parse(r#"{"type":"mystery"}"#).expect("parse");
        assert_eq!(msg.resolve_topic(), None);
        assert_eq!(msg.kind(), MessageKind::Routable);
    }

    #[test]
    fn test_rule_change_event() {
        let msg = InboundMessage::parse(
            r#"{"type":"rule_change","rule_id":12,"action":"toggled","details":{"enabled":false}}"#,
        )
        .expect("parse");

        match msg.parse_event() {
            TopicEvent::RuleChange {
                rule_id,
                action,
                details,
            } => {
                assert_eq!(rule_id, 12);
                assert_eq!(action, RuleAction::Toggled);
                assert_eq!(details["enabled"], false);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_alert_severity_defaults_to_warning() {
        let msg = InboundMessage::parse(r#"{"type":"alert","title":"Queue","message":"backlog"}"#)
            .expect("parse");
        match msg.parse_event() {
            TopicEvent::Alert { severity, title, .. } => {
                assert_eq!(severity, AlertSeverity::Warning);
                assert_eq!(title, "Queue");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_batch_event_items() {
        let msg = InboundMessage::parse(
            r#"{"type":"batch","topic":"logs","count":14,"items":[
                {"type":"log","level":"info","message":"a"},
                {"type":"log","level":"warn","message":"b"}
            ]}"#,
        )
        .expect("parse");

        match msg.parse_event() {
            TopicEvent::Batch {
                topic,
                count,
                items,
            } => {
                assert_eq!(topic, Some(Topic::logs()));
                assert_eq!(count, 14);
                assert_eq!(items.len(), 2);
                assert_eq!(items[1].get("message"), Some(&Value::from("b")));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_batch_count_saturates() {
        let huge = InboundMessage::parse(&format!(
            r#"{{"type":"batch","count":{},"items":[]}}"#,
            u64::MAX
        ))
        .expect("parse");
        let negative = InboundMessage::parse(r#"{"type":"batch","count":-3,"items":[]}"#)
            .expect("parse");

        assert!(matches!(
            huge.parse_event(),
            TopicEvent::Batch { count: usize::MAX, .. }
        ));
        assert!(matches!(
            negative.parse_event(),
            TopicEvent::Batch { count: 0, .. }
        ));
    }

    #[test]
    fn test_subscription_ack_event() {
        let msg = InboundMessage::parse(r#"{"type":"subscription","topic":"bogus","success":false}"#)
            .expect("parse");
        assert_eq!(
            msg.parse_event(),
            TopicEvent::SubscriptionAck {
                topic: Some(Topic::new("bogus")),
                success: false
            }
        );
    }

    #[test]
    fn test_notification_broadcast_has_no_user() {
        let msg = InboundMessage::parse(
            r#"{"type":"notification","user_id":null,"title":"t","body":"b"}"#,
        )
        .expect("parse");
        match msg.parse_event() {
            TopicEvent::Notification {
                user_id,
                action_url,
                ..
            } => {
                assert_eq!(user_id, None);
                assert_eq!(action_url, None);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
