//! Channel statistics.

// ============================================================================
// Imports
// ============================================================================

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::protocol::Topic;

use super::ChannelStatus;

// ============================================================================
// ChannelStats
// ============================================================================

/// Counters maintained by the manager.
///
/// Counters only grow; timestamps only move forward.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelStats {
    /// Frames parsed from the server.
    pub messages_received: u64,
    /// Frames handed to the transport (control messages included).
    pub messages_sent: u64,
    /// Reconnect attempts fired.
    pub reconnect_count: u64,
    /// Last successful open.
    pub last_connected_at: Option<DateTime<Utc>>,
    /// Last close.
    pub last_disconnected_at: Option<DateTime<Utc>>,
}

// ============================================================================
// StatsSnapshot
// ============================================================================

/// Point-in-time view returned by `stats()`.
///
/// Serializes to camelCase JSON for the console UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    /// Frames parsed from the server.
    pub messages_received: u64,
    /// Frames handed to the transport.
    pub messages_sent: u64,
    /// Reconnect attempts fired over the manager's lifetime.
    pub reconnect_count: u64,
    /// Last successful open.
    pub last_connected_at: Option<DateTime<Utc>>,
    /// Last close.
    pub last_disconnected_at: Option<DateTime<Utc>>,
    /// Current status.
    pub status: ChannelStatus,
    /// Topics restored on reconnect, in subscription order.
    pub subscribed_topics: Vec<Topic>,
    /// Payloads waiting in the offline buffer.
    pub buffered_messages: usize,
    /// Attempts since the last successful open.
    pub reconnect_attempts: u32,
}

impl StatsSnapshot {
    /// Combines counters with the current manager view.
    #[must_use]
    pub fn new(
        stats: &ChannelStats,
        status: ChannelStatus,
        subscribed_topics: Vec<Topic>,
        buffered_messages: usize,
        reconnect_attempts: u32,
    ) -> Self {
        Self {
            messages_received: stats.messages_received,
            messages_sent: stats.messages_sent,
            reconnect_count: stats.reconnect_count,
            last_connected_at: stats.last_connected_at,
            last_disconnected_at: stats.last_disconnected_at,
            status,
            subscribed_topics,
            buffered_messages,
            reconnect_attempts,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
