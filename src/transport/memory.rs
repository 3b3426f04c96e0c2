//! In-process transport.
//!
//! [`MemoryTransport`] hands out links whose far end is a [`MemoryPeer`]
//! controlled by the caller. Tests drive the server side through the peer:
//! accept the handshake, push frames, drop the connection, and inspect
//! what the client wrote.
//!
//! # Example
//!
//! ```ignore
//! let transport = MemoryTransport::new();
//! let manager = ChannelManager::new(config, Arc::new(transport.clone()), notifier)?;
//!
//! manager.connect();
//! let peer = transport.last_peer().expect("opened");
//! peer.accept();
//! peer.deliver_json(json!({ "type": "stats_update", "data": {} }));
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::trace;
use url::Url;

use crate::error::{Error, Result};

use super::{CloseInfo, Link, OpenedLink, Transport, TransportEvent};

// ============================================================================
// MemoryTransport
// ============================================================================

/// Transport whose links stay inside the process.
///
/// Cloning shares the underlying peer list.
#[derive(Clone, Default)]
pub struct MemoryTransport {
    inner: Arc<Mutex<TransportInner>>,
}

#[derive(Default)]
struct TransportInner {
    peers: Vec<MemoryPeer>,
    open_attempts: usize,
    refuse_opens: bool,
    failing_opens: usize,
}

impl MemoryTransport {
    /// Creates an empty transport.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `open` calls, including refused ones.
    #[inline]
    #[must_use]
    pub fn open_attempts(&self) -> usize {
        self.inner.lock().open_attempts
    }

    /// Number of links successfully started.
    #[inline]
    #[must_use]
    pub fn open_count(&self) -> usize {
        self.inner.lock().peers.len()
    }

    /// Returns the peer of the `index`-th started link.
    #[must_use]
    pub fn peer(&self, index: usize) -> Option<MemoryPeer> {
        self.inner.lock().peers.get(index).cloned()
    }

    /// Returns the peer of the most recent link.
    #[must_use]
    pub fn last_peer(&self) -> Option<MemoryPeer> {
        self.inner.lock().peers.last().cloned()
    }

    /// Makes every `open` call fail synchronously until turned off.
    pub fn refuse_opens(&self, refuse: bool) {
        self.inner.lock().refuse_opens = refuse;
    }

    /// Makes the next `count` `open` calls fail synchronously.
    pub fn fail_next_opens(&self, count: usize) {
        self.inner.lock().failing_opens = count;
    }
}

impl Transport for MemoryTransport {
    fn open(&self, endpoint: &Url) -> Result<OpenedLink> {
        let mut inner = self.inner.lock();
        inner.open_attempts += 1;

        if inner.refuse_opens {
            return Err(Error::connection("connection refused"));
        }
        if inner.failing_opens > 0 {
            inner.failing_opens -= 1;
            return Err(Error::connection("connection refused"));
        }

        let (event_tx, events) = mpsc::unbounded_channel();
        let peer = MemoryPeer {
            inner: Arc::new(PeerInner {
                endpoint: endpoint.clone(),
                event_tx,
                sent: Mutex::new(Vec::new()),
                closed_by_client: Mutex::new(None),
                closed: AtomicBool::new(false),
            }),
        };
        inner.peers.push(peer.clone());

        trace!(%endpoint, link = inner.peers.len(), "Memory link opened");

        Ok(OpenedLink {
            link: Box::new(MemoryLink { peer }),
            events,
        })
    }
}

// ============================================================================
// MemoryPeer
// ============================================================================

/// Server side of a memory link.
#[derive(Clone)]
pub struct MemoryPeer {
    inner: Arc<PeerInner>,
}

struct PeerInner {
    endpoint: Url,
    event_tx: mpsc::UnboundedSender<TransportEvent>,
    sent: Mutex<Vec<String>>,
    closed_by_client: Mutex<Option<CloseInfo>>,
    closed: AtomicBool,
}

impl MemoryPeer {
    /// Endpoint the client opened.
    #[inline]
    #[must_use]
    pub fn endpoint(&self) -> &Url {
        &self.inner.endpoint
    }

    /// Completes the handshake.
    pub fn accept(&self) {
        self.emit(TransportEvent::Open);
    }

    /// Pushes a text frame to the client.
    pub fn deliver(&self, text: impl Into<String>) {
        self.emit(TransportEvent::Message(text.into()));
    }

    /// Pushes a JSON frame to the client.
    pub fn deliver_json(&self, value: &Value) {
        self.deliver(value.to_string());
    }

    /// Drops the connection without a close frame.
    pub fn fail(&self, reason: impl Into<String>) {
        self.emit(TransportEvent::Error(reason.into()));
        self.finish(CloseInfo::abnormal());
    }

    /// Closes from the server side with a close frame.
    pub fn close(&self, code: u16, reason: impl Into<String>) {
        self.emit(TransportEvent::Closing);
        self.finish(CloseInfo::new(code, reason));
    }

    /// Frames written by the client, in order.
    #[must_use]
    pub fn sent_frames(&self) -> Vec<String> {
        self.inner.sent.lock().clone()
    }

    /// Frames written by the client, parsed as JSON. Non-JSON frames are skipped.
    #[must_use]
    pub fn sent_json(&self) -> Vec<Value> {
        self.inner
            .sent
            .lock()
            .iter()
            .filter_map(|frame| serde_json::from_str(frame).ok())
            .collect()
    }

    /// Takes the frames written so far.
    pub fn take_sent(&self) -> Vec<String> {
        std::mem::take(&mut *self.inner.sent.lock())
    }

    /// Close code and reason if the client closed the link.
    #[must_use]
    pub fn closed_by_client(&self) -> Option<CloseInfo> {
        self.inner.closed_by_client.lock().clone()
    }

    /// Returns `true` once either side closed the link.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    fn emit(&self, event: TransportEvent) {
        if self.is_closed() {
            return;
        }
        let _ = self.inner.event_tx.send(event);
    }

    fn finish(&self, info: CloseInfo) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let _ = self.inner.event_tx.send(TransportEvent::Closed(info));
    }
}

// ============================================================================
// MemoryLink
// ============================================================================

/// Client side of a memory link.
struct MemoryLink {
    peer: MemoryPeer,
}

impl Link for MemoryLink {
    fn send(&self, frame: String) -> Result<()> {
        if self.peer.is_closed() {
            return Err(Error::ConnectionClosed);
        }
        self.peer.inner.sent.lock().push(frame);
        Ok(())
    }

    fn close(&self, code: u16, reason: &str) {
        let info = CloseInfo::new(code, reason);
        *self.peer.inner.closed_by_client.lock() = Some(info.clone());
        self.peer.finish(info);
    }
}

// ============================================================================
// Tests
// ============================================================================
