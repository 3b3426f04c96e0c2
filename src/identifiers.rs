//! Type-safe identifiers for channel entities.
//!
//! Newtype wrappers prevent mixing incompatible IDs at compile time.
//!
//! | Type | Source | Lifetime |
//! |------|--------|----------|
//! | [`ClientId`] | Server `connected` acknowledgment | One open link |
//! | [`SubscriptionId`] | [`ChannelManager::subscribe`](crate::ChannelManager::subscribe) | Until unsubscribed |
//! | [`ConnectionId`] | Manager, one per opened link | One link |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// ClientId
// ============================================================================

/// Opaque client identity assigned by the server on connect.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(String);

impl ClientId {
    /// Wraps a server-assigned identifier.
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// SubscriptionId
// ============================================================================

/// Identifies one handler registration.
///
/// Returned by `subscribe` and accepted by `unsubscribe` to remove a single
/// handler from a topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    /// Generates a new random subscription ID.
    #[inline]
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    #[inline]
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// ConnectionId
// ============================================================================

/// Sequence number of a link opened by the manager.
///
/// Strictly increasing per manager. Events carrying an older ID than the
/// current link are stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a connection ID from a raw value.
    #[inline]
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the next ID in sequence.
    #[inline]
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ============================================================================
// Tests
// ============================================================================
