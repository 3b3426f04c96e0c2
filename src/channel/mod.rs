//! Realtime channel management.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `backoff` | Reconnect delay policy |
//! | `buffer` | Offline outbound buffer |
//! | `manager` | [`ChannelManager`] state machine |
//! | `router` | Topic → handler routing |
//! | `state` | Lifecycle state and public status |
//! | `stats` | Counters and snapshots |
//! | `timer` | Cancellable tokio timers |

// ============================================================================
// Submodules
// ============================================================================

/// Reconnect backoff.
pub mod backoff;

/// Offline buffer.
pub mod buffer;

/// Channel manager.
pub mod manager;

/// Topic routing.
pub mod router;

/// Lifecycle state.
pub mod state;

/// Statistics.
pub mod stats;

/// Timers.
pub mod timer;

// ============================================================================
// Re-exports
// ============================================================================

pub use backoff::ReconnectPolicy;
pub use buffer::{BufferOutcome, OutboundBuffer};
pub use manager::{ChannelManager, ConnectCallback, DisconnectCallback, ErrorCallback};
pub use router::{
    DispatchReport, DispatchTargets, HandlerError, HandlerResult, MessageHandler, RemoveOutcome,
    TopicRouter, dispatch,
};
pub use state::{ChannelStatus, ConnectionState};
pub use stats::{ChannelStats, StatsSnapshot};
pub use timer::TimerHandle;
