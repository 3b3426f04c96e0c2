//! Realtime wire protocol.
//!
//! This module defines the JSON messages exchanged with the console's
//! `/api/ws/realtime` endpoint.
//!
//! # Protocol Overview
//!
//! | Message | Direction | Purpose |
//! |---------|-----------|---------|
//! | [`ControlMessage`] | Client → Server | Subscribe, unsubscribe, ping |
//! | Application payload | Client → Server | Anything passed to `send` |
//! | [`InboundMessage`] | Server → Client | Acks, pongs, errors, topic data |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `inbound` | Inbound parsing, interception kinds, typed events |
//! | `outbound` | Control messages and payload encoding |
//! | `topic` | Topic names and type→topic inference |

// ============================================================================
// Submodules
// ============================================================================

/// Inbound message types.
pub mod inbound;

/// Outbound message types.
pub mod outbound;

/// Topic names.
pub mod topic;

// ============================================================================
// Re-exports
// ============================================================================

pub use inbound::{AlertSeverity, InboundMessage, MessageKind, RuleAction, TopicEvent};
pub use outbound::{ControlMessage, encode_payload};
pub use topic::{Topic, WILDCARD};
