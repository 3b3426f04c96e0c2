//! Connection states and the status reported to views.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::{Deserialize, Serialize};

// ============================================================================
// ConnectionState
// ============================================================================

/// Lifecycle state of the managed connection.
///
/// ```text
/// Idle ──connect()──► Connecting ──open──► Open ──server close──► Closing
///                        ▲                  │                       │
///                        │               error/close                │
///                  reconnect timer          ▼                       ▼
///                        └──────────────── Closed ◄─────────────────┘
/// ```
///
/// `disconnect()` moves any state to `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// Never connected.
    #[default]
    Idle,
    /// Link opened, handshake in progress.
    Connecting,
    /// Handshake complete; frames flow.
    Open,
    /// Peer started the closing handshake.
    Closing,
    /// No live link.
    Closed,
}

impl ConnectionState {
    /// Returns `true` while a link is being established or is open.
    #[inline]
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Connecting | Self::Open)
    }

    /// Returns `true` when open.
    #[inline]
    #[must_use]
    pub const fn is_open(self) -> bool {
        matches!(self, Self::Open)
    }

    /// Maps the state to the status reported by `status()`.
    #[must_use]
    pub const fn status(self) -> ChannelStatus {
        match self {
            Self::Connecting => ChannelStatus::Connecting,
            Self::Open => ChannelStatus::Connected,
            Self::Closing => ChannelStatus::Closing,
            Self::Idle | Self::Closed => ChannelStatus::Disconnected,
        }
    }
}

// ============================================================================
// ChannelStatus
// ============================================================================

/// Coarse connection status for display.
///
/// Deserializing an unrecognized string yields [`ChannelStatus::Unknown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelStatus {
    /// Connecting.
    Connecting,
    /// Connected.
    Connected,
    /// Closing.
    Closing,
    /// Disconnected.
    Disconnected,
    /// Unrecognized status.
    #[serde(other)]
    Unknown,
}

impl ChannelStatus {
    /// Returns the lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Closing => "closing",
            Self::Disconnected => "disconnected",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ChannelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Tests
// ============================================================================
