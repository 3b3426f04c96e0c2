//! Topic names and type→topic inference.
//!
//! Topics are plain strings chosen by the server. The wildcard topic `*`
//! is local only: handlers registered on it see every routable message.

// ============================================================================
// Imports
// ============================================================================

use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

// ============================================================================
// Constants
// ============================================================================

/// Wildcard topic name.
pub const WILDCARD: &str = "*";

/// Message `type` to topic mapping used when a message has no `topic` field.
const TYPE_TOPICS: &[(&str, &str)] = &[
    ("stats_update", "stats"),
    ("rule_change", "rules"),
    ("system_event", "system"),
    ("log", "logs"),
    ("alert", "alerts"),
    ("notification", "notifications"),
];

// ============================================================================
// Topic
// ============================================================================

/// A routing key for inbound messages.
///
/// Cheap to clone (shared string).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Topic(Arc<str>);

impl Topic {
    /// Creates a topic from a name.
    #[inline]
    #[must_use]
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    /// Returns the wildcard topic `*`.
    #[inline]
    #[must_use]
    pub fn wildcard() -> Self {
        Self::new(WILDCARD)
    }

    /// Statistics updates.
    #[inline]
    #[must_use]
    pub fn stats() -> Self {
        Self::new("stats")
    }

    /// Rule status changes.
    #[inline]
    #[must_use]
    pub fn rules() -> Self {
        Self::new("rules")
    }

    /// System events.
    #[inline]
    #[must_use]
    pub fn system() -> Self {
        Self::new("system")
    }

    /// Log lines.
    #[inline]
    #[must_use]
    pub fn logs() -> Self {
        Self::new("logs")
    }

    /// Alerts.
    #[inline]
    #[must_use]
    pub fn alerts() -> Self {
        Self::new("alerts")
    }

    /// User notifications.
    #[inline]
    #[must_use]
    pub fn notifications() -> Self {
        Self::new("notifications")
    }

    /// Returns the topic name.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` for the wildcard topic.
    #[inline]
    #[must_use]
    pub fn is_wildcard(&self) -> bool {
        &*self.0 == WILDCARD
    }

    /// Infers the topic for a message `type`.
    ///
    /// Returns `None` for types outside the fixed table.
    #[must_use]
    pub fn infer_from_type(message_type: &str) -> Option<Self> {
        TYPE_TOPICS
            .iter()
            .find(|(ty, _)| *ty == message_type)
            .map(|(_, topic)| Self::new(topic))
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Topic {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for Topic {
    fn from(name: String) -> Self {
        Self(Arc::from(name))
    }
}

impl Borrow<str> for Topic {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for Topic {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ============================================================================
// Tests
// ============================================================================
