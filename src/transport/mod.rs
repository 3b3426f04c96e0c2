//! Transport layer.
//!
//! The manager talks to the server through the [`Transport`] seam so the
//! state machine can run against a real WebSocket or an in-process fake.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐   open()    ┌──────────────┐  WebSocket  ┌────────────┐
//! │  ChannelManager  │────────────►│  Transport   │◄───────────►│  Console   │
//! │                  │◄── events ──│  (Link)      │             │  server    │
//! └──────────────────┘  send/close └──────────────┘             └────────────┘
//! ```
//!
//! # Link Lifecycle
//!
//! 1. [`Transport::open`] returns immediately with a [`Link`] and its event
//!    receiver, or fails synchronously
//! 2. The receiver yields [`TransportEvent::Open`] once the handshake is done
//! 3. [`TransportEvent::Message`] for every text frame, in arrival order
//! 4. Optionally [`TransportEvent::Error`] and [`TransportEvent::Closing`]
//! 5. Exactly one final [`TransportEvent::Closed`]; nothing follows it
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `memory` | In-process transport for tests and demos |
//! | `websocket` | tokio-tungstenite client transport |

// ============================================================================
// Imports
// ============================================================================

use tokio::sync::mpsc;
use url::Url;

use crate::error::Result;

// ============================================================================
// Submodules
// ============================================================================

/// In-process transport.
pub mod memory;

/// WebSocket client transport.
pub mod websocket;

// ============================================================================
// Re-exports
// ============================================================================

pub use memory::{MemoryPeer, MemoryTransport};
pub use websocket::WebSocketTransport;

// ============================================================================
// Constants
// ============================================================================

/// Normal closure.
pub const CLOSE_NORMAL: u16 = 1000;

/// Closed without a close frame.
pub const CLOSE_ABNORMAL: u16 = 1006;

// ============================================================================
// Types
// ============================================================================

/// Receiver for one link's events.
pub type LinkEvents = mpsc::UnboundedReceiver<TransportEvent>;

/// Code and reason of a closed link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseInfo {
    /// WebSocket close code.
    pub code: u16,
    /// Close reason text.
    pub reason: String,
}

impl CloseInfo {
    /// Creates close info.
    #[inline]
    #[must_use]
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    /// Close without a close frame (network failure).
    #[inline]
    #[must_use]
    pub fn abnormal() -> Self {
        Self::new(CLOSE_ABNORMAL, "")
    }

    /// Returns `true` for a normal closure.
    #[inline]
    #[must_use]
    pub fn is_normal(&self) -> bool {
        self.code == CLOSE_NORMAL
    }
}

/// Event emitted by a link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Handshake complete.
    Open,
    /// Text frame received.
    Message(String),
    /// Transport error; a `Closed` event follows.
    Error(String),
    /// Peer started the closing handshake.
    Closing,
    /// Link closed. Final event.
    Closed(CloseInfo),
}

// ============================================================================
// Traits
// ============================================================================

/// Write half of an opened link.
pub trait Link: Send + Sync {
    /// Queues a text frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`](crate::Error::ConnectionClosed)
    /// if the link is gone.
    fn send(&self, frame: String) -> Result<()>;

    /// Starts the closing handshake.
    fn close(&self, code: u16, reason: &str);
}

/// An opened link and its events.
pub struct OpenedLink {
    /// Write half.
    pub link: Box<dyn Link>,
    /// Events, in order.
    pub events: LinkEvents,
}

/// Factory for links.
pub trait Transport: Send + Sync {
    /// Starts opening a link to `endpoint`.
    ///
    /// Returns before the handshake completes.
    ///
    /// # Errors
    ///
    /// Returns an error if the link cannot even be started. The manager
    /// treats this like an unexpected close.
    fn open(&self, endpoint: &Url) -> Result<OpenedLink>;
}
