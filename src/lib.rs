//! Realtime channel - Client side of the console's realtime WebSocket.
//!
//! One [`ChannelManager`] per application session owns a single link to
//! the console's `/api/ws/realtime` endpoint and hides its instability
//! from the views that consume it.
//!
//! # Architecture
//!
//! - **Views**: subscribe to topics and send payloads; never see the socket
//! - **Manager**: lifecycle state machine, reconnect, heartbeat, buffering
//! - **Transport**: real WebSocket or an in-process fake behind one trait
//!
//! Key behaviors:
//!
//! - Topic subscriptions survive reconnects and are re-sent on every open
//! - Payloads sent while offline are buffered (up to 100) and flushed in order
//! - Drops reconnect with exponential backoff (1 s doubling, 30 s cap, 10 tries)
//! - A ping every 30 s keeps idle links alive
//!
//! # Quick Start
//!
//! ```no_run
//! use realtime_channel::{ChannelConfig, ChannelManager, Result, TopicEvent};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = ChannelConfig::from_origin("http://localhost:8000")?;
//!     let manager = ChannelManager::with_websocket(config)?;
//!
//!     manager.subscribe("stats", |message| {
//!         if let TopicEvent::StatsUpdate { data } = message.parse_event() {
//!             println!("stats: {data}");
//!         }
//!         Ok(())
//!     });
//!
//!     manager.connect();
//!     tokio::signal::ctrl_c().await?;
//!     manager.disconnect();
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`channel`] | [`ChannelManager`] and its building blocks |
//! | [`config`] | [`ChannelConfig`] and builder |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`notify`] | User-visible notification sink |
//! | [`protocol`] | Wire message types |
//! | [`transport`] | Transport seam, WebSocket and memory transports |

// ============================================================================
// Modules
// ============================================================================

/// Channel manager and its building blocks.
///
/// - [`ChannelManager`] - Connection lifecycle, topics, buffering
/// - [`ReconnectPolicy`] - Backoff schedule
/// - [`TopicRouter`] - Topic → handler routing
pub mod channel;

/// Configuration.
///
/// Use [`ChannelConfig::builder()`] or [`ChannelConfig::from_origin()`].
pub mod config;

/// Error types and result aliases.
///
/// Fallible constructors return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers.
///
/// Newtype wrappers keep client, subscription and connection IDs apart.
pub mod identifiers;

/// User-visible notifications.
pub mod notify;

/// Wire message types.
///
/// Inbound JSON messages, outbound control messages, topics.
pub mod protocol;

/// Transport layer.
///
/// The [`Transport`] trait with WebSocket and in-memory implementations.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Channel types
pub use channel::{
    ChannelManager, ChannelStats, ChannelStatus, ConnectionState, HandlerError, HandlerResult,
    MessageHandler, ReconnectPolicy, StatsSnapshot, TopicRouter,
};

// Configuration types
pub use config::{ChannelConfig, ChannelConfigBuilder};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{ClientId, ConnectionId, SubscriptionId};

// Notification types
pub use notify::{Notifier, TracingNotifier};

// Protocol types
pub use protocol::{
    AlertSeverity, ControlMessage, InboundMessage, MessageKind, RuleAction, Topic, TopicEvent,
};

// Transport types
pub use transport::{
    CloseInfo, Link, MemoryPeer, MemoryTransport, OpenedLink, Transport, TransportEvent,
    WebSocketTransport,
};
