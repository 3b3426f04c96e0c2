//! Channel manager.
//!
//! [`ChannelManager`] owns the single realtime link of an application
//! session. It keeps the link alive across drops, restores topic
//! subscriptions after each reconnect, buffers outbound payloads while
//! offline, and routes inbound messages to topic handlers.
//!
//! # State Machine
//!
//! | From | Event | To | Effects |
//! |------|-------|----|---------|
//! | Idle/Closed/Closing | `connect()` | Connecting | open link, start pump |
//! | Connecting | handshake | Open | reset attempts, heartbeat, resubscribe, flush, callbacks |
//! | Open | peer close frame | Closing | stop heartbeat |
//! | any live | close/error | Closed | stop heartbeat, callbacks, schedule reconnect |
//! | Closed | reconnect timer | Connecting | attempts += 1 |
//! | any | `disconnect()` | Closed | cancel timers, close 1000 |
//!
//! Every link is tagged with a [`ConnectionId`]. Events from a link the
//! manager has already abandoned are dropped.
//!
//! # Locking
//!
//! State lives behind one `parking_lot::Mutex`. It is released before any
//! user code runs (handlers, callbacks, the notifier), so user code may
//! call back into the manager.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::ops::ControlFlow;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Weak};

use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use crate::config::ChannelConfig;
use crate::error::{Error, Result};
use crate::identifiers::{ClientId, ConnectionId, SubscriptionId};
use crate::notify::{Notifier, TracingNotifier};
use crate::protocol::{ControlMessage, InboundMessage, MessageKind, Topic, TopicEvent, encode_payload};
use crate::transport::{
    CLOSE_NORMAL, CloseInfo, Link, LinkEvents, OpenedLink, Transport, TransportEvent,
    WebSocketTransport,
};

use super::buffer::{BufferOutcome, OutboundBuffer};
use super::router::{HandlerResult, RemoveOutcome, TopicRouter, dispatch, panic_message};
use super::state::{ChannelStatus, ConnectionState};
use super::stats::{ChannelStats, StatsSnapshot};
use super::timer::TimerHandle;

// ============================================================================
// Types
// ============================================================================

/// Callback run after each successful open.
pub type ConnectCallback = Arc<dyn Fn() + Send + Sync>;

/// Callback run after each close.
pub type DisconnectCallback = Arc<dyn Fn(&CloseInfo) + Send + Sync>;

/// Callback run on transport errors.
pub type ErrorCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Notification shown when reconnecting gives up.
const RECONNECT_EXHAUSTED_MESSAGE: &str =
    "Realtime connection lost. Refresh the page or reconnect manually.";

#[derive(Default)]
struct Callbacks {
    connect: Vec<ConnectCallback>,
    disconnect: Vec<DisconnectCallback>,
    error: Vec<ErrorCallback>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReconnectOutcome {
    Scheduled,
    Exhausted,
}

// ============================================================================
// ManagerState
// ============================================================================

/// Mutable manager state. Only touched under the lock.
struct ManagerState {
    state: ConnectionState,
    connection_id: ConnectionId,
    link: Option<Box<dyn Link>>,
    pump: Option<JoinHandle<()>>,
    heartbeat: Option<TimerHandle>,
    reconnect_timer: Option<TimerHandle>,
    reconnect_seq: u64,
    reconnect_attempts: u32,
    manual_close: bool,
    client_id: Option<ClientId>,
    router: TopicRouter,
    /// Topics restored on every open, in subscription order.
    subscribed: Vec<Topic>,
    buffer: OutboundBuffer,
    stats: ChannelStats,
    callbacks: Callbacks,
}

impl ManagerState {
    fn new(buffer_capacity: usize) -> Self {
        Self {
            state: ConnectionState::Idle,
            connection_id: ConnectionId::default(),
            link: None,
            pump: None,
            heartbeat: None,
            reconnect_timer: None,
            reconnect_seq: 0,
            reconnect_attempts: 0,
            manual_close: false,
            client_id: None,
            router: TopicRouter::new(),
            subscribed: Vec::new(),
            buffer: OutboundBuffer::new(buffer_capacity),
            stats: ChannelStats::default(),
            callbacks: Callbacks::default(),
        }
    }

    /// Event belongs to the link the manager currently holds.
    #[inline]
    fn is_current(&self, id: ConnectionId) -> bool {
        self.connection_id == id && self.link.is_some()
    }

    fn transmit(&mut self, frame: String) -> Result<()> {
        let link = self.link.as_ref().ok_or(Error::ConnectionClosed)?;
        link.send(frame)?;
        self.stats.messages_sent += 1;
        Ok(())
    }

    fn transmit_control(&mut self, message: &ControlMessage) -> Result<()> {
        let frame = message.to_frame()?;
        self.transmit(frame)
    }

    fn cancel_heartbeat(&mut self) {
        if let Some(timer) = self.heartbeat.take() {
            timer.cancel();
        }
    }

    fn cancel_reconnect(&mut self) {
        self.reconnect_seq += 1;
        if let Some(timer) = self.reconnect_timer.take() {
            timer.cancel();
        }
    }

    fn abort_pump(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
    }
}

impl Drop for ManagerState {
    fn drop(&mut self) {
        self.abort_pump();
    }
}

// ============================================================================
// Shared
// ============================================================================

struct Shared {
    config: ChannelConfig,
    transport: Arc<dyn Transport>,
    notifier: Arc<dyn Notifier>,
    state: Mutex<ManagerState>,
}

// ============================================================================
// ChannelManager
// ============================================================================

/// Client-side manager for the realtime channel.
///
/// Cheap to clone; all clones share one link.
///
/// Public operations never fail. Problems are logged, reported through
/// `on_error` callbacks, or sent to the [`Notifier`].
///
/// # Example
///
/// ```ignore
/// let config = ChannelConfig::from_origin("https://console.example.com")?;
/// let manager = ChannelManager::with_websocket(config)?;
///
/// manager.subscribe("stats", |msg| {
///     println!("{:?}", msg.parse_event());
///     Ok(())
/// });
/// manager.connect();
/// ```
#[derive(Clone)]
pub struct ChannelManager {
    shared: Arc<Shared>,
}

impl fmt::Debug for ChannelManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("ChannelManager")
            .field("endpoint", &self.shared.config.endpoint.as_str())
            .field("state", &state.state)
            .field("connection_id", &state.connection_id)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// ChannelManager - Construction
// ============================================================================

impl ChannelManager {
    /// Creates a manager over any transport.
    ///
    /// Nothing is opened until [`connect`](Self::connect).
    ///
    /// # Errors
    ///
    /// Any error from [`ChannelConfig::validate`].
    pub fn new(
        config: ChannelConfig,
        transport: Arc<dyn Transport>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self> {
        config.validate()?;

        let state = ManagerState::new(config.buffer_capacity);
        Ok(Self {
            shared: Arc::new(Shared {
                config,
                transport,
                notifier,
                state: Mutex::new(state),
            }),
        })
    }

    /// Creates a manager over real WebSockets that logs notifications.
    ///
    /// # Errors
    ///
    /// Any error from [`ChannelConfig::validate`].
    pub fn with_websocket(config: ChannelConfig) -> Result<Self> {
        Self::new(
            config,
            Arc::new(WebSocketTransport::new()),
            Arc::new(TracingNotifier),
        )
    }
}

// ============================================================================
// ChannelManager - Lifecycle
// ============================================================================

impl ChannelManager {
    /// Opens the link.
    ///
    /// No-op while connecting or open. Cancels a pending reconnect timer.
    /// Must be called inside a tokio runtime.
    pub fn connect(&self) {
        self.shared.connect(None);
    }

    /// Closes the link with a normal closure and stops reconnecting.
    ///
    /// Disconnect callbacks run before this returns if a link was live.
    pub fn disconnect(&self) {
        self.shared.disconnect();
    }
}

// ============================================================================
// ChannelManager - Topics
// ============================================================================

impl ChannelManager {
    /// Registers a handler for a topic.
    ///
    /// The topic is remembered and subscribed again on every open. When
    /// open, a `subscribe` message is sent right away. The wildcard `*`
    /// receives every routable message and is never sent to the server.
    pub fn subscribe<F>(&self, topic: impl Into<Topic>, handler: F) -> SubscriptionId
    where
        F: Fn(&InboundMessage) -> HandlerResult + Send + Sync + 'static,
    {
        let topic = topic.into();
        let mut state = self.shared.state.lock();
        let id = state.router.add(topic.clone(), Arc::new(handler));

        if topic.is_wildcard() {
            debug!(subscription = %id, "Wildcard handler registered");
            return id;
        }

        if !state.subscribed.contains(&topic) {
            state.subscribed.push(topic.clone());
        }

        if state.state.is_open()
            && let Err(e) = state.transmit_control(&ControlMessage::subscribe(topic.clone()))
        {
            warn!(topic = %topic, error = %e, "Failed to send subscribe");
        }

        debug!(topic = %topic, subscription = %id, "Subscribed");
        id
    }

    /// Removes one handler, or every handler when `id` is `None`.
    ///
    /// Either way the topic stops being restored on reconnect and, when
    /// open, an `unsubscribe` message is sent. Handlers still registered
    /// keep receiving whatever arrives for the topic.
    pub fn unsubscribe(&self, topic: impl Into<Topic>, id: Option<SubscriptionId>) {
        let topic = topic.into();
        let mut state = self.shared.state.lock();

        match id {
            Some(id) => {
                if state.router.remove(&topic, id) == RemoveOutcome::NotFound {
                    debug!(topic = %topic, subscription = %id, "No such handler");
                }
            }
            None => {
                let removed = state.router.clear(&topic);
                trace!(topic = %topic, removed, "Handlers cleared");
            }
        }

        if topic.is_wildcard() {
            return;
        }

        state.subscribed.retain(|t| t != &topic);

        if state.state.is_open()
            && let Err(e) = state.transmit_control(&ControlMessage::unsubscribe(topic.clone()))
        {
            warn!(topic = %topic, error = %e, "Failed to send unsubscribe");
        }

        debug!(topic = %topic, "Unsubscribed");
    }

    /// Number of handlers registered for a topic.
    #[must_use]
    pub fn handler_count(&self, topic: &Topic) -> usize {
        self.shared.state.lock().router.handler_count(topic)
    }
}

// ============================================================================
// ChannelManager - Send
// ============================================================================

impl ChannelManager {
    /// Sends an application payload.
    ///
    /// Returns `true` only if the frame was handed to an open link. While
    /// not open the payload is buffered (or dropped when the buffer is
    /// full) and `false` is returned; buffered payloads go out in order on
    /// the next open.
    pub fn send<T: Serialize + ?Sized>(&self, payload: &T) -> bool {
        let frame = match encode_payload(payload) {
            Ok(frame) => frame,
            Err(e) => {
                error!(error = %e, "Failed to serialize message");
                return false;
            }
        };

        let mut state = self.shared.state.lock();

        if !state.state.is_open() {
            match state.buffer.push(frame) {
                BufferOutcome::Buffered => {
                    debug!(buffered = state.buffer.len(), "Message buffered (offline)");
                }
                BufferOutcome::Full => {
                    warn!(
                        capacity = state.buffer.capacity(),
                        "Message buffer full, dropping message"
                    );
                }
            }
            return false;
        }

        match state.transmit(frame) {
            Ok(()) => true,
            Err(e) => {
                error!(error = %e, "Failed to send message");
                false
            }
        }
    }
}

// ============================================================================
// ChannelManager - Queries
// ============================================================================

impl ChannelManager {
    /// Returns `true` when the link is open.
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state().is_open()
    }

    /// Returns the public connection status.
    #[inline]
    #[must_use]
    pub fn status(&self) -> ChannelStatus {
        self.state().status()
    }

    /// Returns the raw lifecycle state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.shared.state.lock().state
    }

    /// Returns the client ID assigned by the server for the current link.
    #[must_use]
    pub fn client_id(&self) -> Option<ClientId> {
        self.shared.state.lock().client_id.clone()
    }

    /// Returns a statistics snapshot.
    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        let state = self.shared.state.lock();
        StatsSnapshot::new(
            &state.stats,
            state.state.status(),
            state.subscribed.clone(),
            state.buffer.len(),
            state.reconnect_attempts,
        )
    }

    /// Returns the configuration.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &ChannelConfig {
        &self.shared.config
    }
}

// ============================================================================
// ChannelManager - Callbacks
// ============================================================================

impl ChannelManager {
    /// Registers a callback run after each open, once the buffer is flushed.
    pub fn on_connect<F>(&self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.shared
            .state
            .lock()
            .callbacks
            .connect
            .push(Arc::new(callback));
    }

    /// Registers a callback run after each close.
    pub fn on_disconnect<F>(&self, callback: F)
    where
        F: Fn(&CloseInfo) + Send + Sync + 'static,
    {
        self.shared
            .state
            .lock()
            .callbacks
            .disconnect
            .push(Arc::new(callback));
    }

    /// Registers a callback run on transport errors.
    pub fn on_error<F>(&self, callback: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.shared
            .state
            .lock()
            .callbacks
            .error
            .push(Arc::new(callback));
    }
}

// ============================================================================
// Shared - Transitions
// ============================================================================

impl Shared {
    /// Opens a new link. `reconnect` carries the sequence number of the
    /// reconnect timer that fired, if any; that attempt is counted and the
    /// link opened under one lock so a racing `disconnect()` wins.
    fn connect(self: &Arc<Self>, reconnect: Option<u64>) {
        if Handle::try_current().is_err() {
            error!("connect() called outside a tokio runtime");
            return;
        }

        let outcome = {
            let mut state = self.state.lock();

            if let Some(seq) = reconnect {
                if state.reconnect_seq != seq || state.manual_close {
                    trace!(seq, "Ignoring cancelled reconnect");
                    return;
                }
                let Some(timer) = state.reconnect_timer.take() else {
                    return;
                };
                timer.detach();

                state.reconnect_attempts += 1;
                state.stats.reconnect_count += 1;
                debug!(attempt = state.reconnect_attempts, "Reconnect timer fired");
            }

            if state.state.is_active() {
                debug!(state = ?state.state, "Already connecting or connected");
                return;
            }

            state.cancel_reconnect();
            state.abort_pump();
            state.link = None;
            state.manual_close = false;

            let id = state.connection_id.next();
            state.connection_id = id;
            state.state = ConnectionState::Connecting;

            debug!(connection_id = %id, endpoint = %self.config.endpoint, "Connecting");

            match self.transport.open(&self.config.endpoint) {
                Ok(OpenedLink { link, events }) => {
                    state.link = Some(link);
                    state.pump = Some(tokio::spawn(pump(Arc::downgrade(self), id, events)));
                    None
                }
                Err(e) => {
                    error!(connection_id = %id, error = %e, "Failed to open connection");
                    state.state = ConnectionState::Closed;
                    Some(self.schedule_reconnect(&mut state))
                }
            }
        };

        if outcome == Some(ReconnectOutcome::Exhausted) {
            self.notifier.error(RECONNECT_EXHAUSTED_MESSAGE);
        }
    }

    fn disconnect(&self) {
        let (callbacks, info) = {
            let mut state = self.state.lock();

            state.manual_close = true;
            state.cancel_heartbeat();
            state.cancel_reconnect();
            state.abort_pump();

            let Some(link) = state.link.take() else {
                if state.state != ConnectionState::Idle {
                    state.state = ConnectionState::Closed;
                }
                debug!("No active connection");
                return;
            };

            link.close(CLOSE_NORMAL, &self.config.close_reason);

            state.state = ConnectionState::Closed;
            state.client_id = None;
            state.stats.last_disconnected_at = Some(Utc::now());

            info!(connection_id = %state.connection_id, "Disconnected");

            (
                state.callbacks.disconnect.clone(),
                CloseInfo::new(CLOSE_NORMAL, self.config.close_reason.as_str()),
            )
        };

        for callback in callbacks {
            run_callback("disconnect", || callback(&info));
        }
    }

    fn handle_event(self: &Arc<Self>, id: ConnectionId, event: TransportEvent) {
        match event {
            TransportEvent::Open => self.handle_open(id),
            TransportEvent::Message(text) => self.handle_message(id, &text),
            TransportEvent::Error(message) => self.handle_error(id, &message),
            TransportEvent::Closing => self.handle_closing(id),
            TransportEvent::Closed(info) => self.handle_close(id, &info),
        }
    }

    fn handle_open(self: &Arc<Self>, id: ConnectionId) {
        let callbacks = {
            let mut state = self.state.lock();

            if !state.is_current(id) || state.state != ConnectionState::Connecting {
                trace!(connection_id = %id, "Ignoring stale open");
                return;
            }

            state.state = ConnectionState::Open;
            state.reconnect_attempts = 0;
            state.client_id = None;
            state.stats.last_connected_at = Some(Utc::now());

            info!(connection_id = %id, endpoint = %self.config.endpoint, "Connected");

            self.start_heartbeat(&mut state, id);

            for topic in state.subscribed.clone() {
                if let Err(e) = state.transmit_control(&ControlMessage::subscribe(topic.clone())) {
                    warn!(topic = %topic, error = %e, "Failed to resubscribe");
                }
            }

            if !flush_buffer(&mut state) {
                // The link is gone; hold later sends behind the unsent
                // frames until the close arrives.
                state.state = ConnectionState::Closing;
                state.cancel_heartbeat();
            }

            state.callbacks.connect.clone()
        };

        for callback in callbacks {
            run_callback("connect", || callback());
        }
    }

    fn handle_message(&self, id: ConnectionId, text: &str) {
        let message = match InboundMessage::parse(text) {
            Ok(message) => message,
            Err(e) => {
                warn!(connection_id = %id, error = %e, "Failed to parse message");
                return;
            }
        };

        let targets = {
            let mut state = self.state.lock();

            if !state.is_current(id) {
                trace!(connection_id = %id, "Ignoring stale message");
                return;
            }

            state.stats.messages_received += 1;

            match message.kind() {
                MessageKind::Connected { client_id } => {
                    debug!(client_id = ?client_id, "Client ID assigned");
                    state.client_id = client_id;
                    return;
                }
                MessageKind::Pong => {
                    trace!("Pong received");
                    return;
                }
                MessageKind::Error { message } => {
                    drop(state);
                    warn!(message = %message, "Server error");
                    self.notifier.error(&format!("WebSocket: {message}"));
                    return;
                }
                MessageKind::Routable => {}
            }

            if message.message_type() == Some("subscription")
                && let TopicEvent::SubscriptionAck {
                    topic,
                    success: false,
                } = message.parse_event()
            {
                warn!(topic = ?topic.as_ref().map(Topic::as_str), "Subscription rejected");
            }

            state.router.targets(message.resolve_topic().as_ref())
        };

        if targets.is_empty() {
            trace!(message_type = ?message.message_type(), "No handlers");
            return;
        }

        let report = dispatch(&targets, &message);
        trace!(
            delivered = report.delivered,
            failed = report.failures.len(),
            "Message dispatched"
        );
    }

    fn handle_error(&self, id: ConnectionId, message: &str) {
        let callbacks = {
            let state = self.state.lock();
            if !state.is_current(id) {
                return;
            }
            error!(connection_id = %id, error = %message, "Transport error");
            state.callbacks.error.clone()
        };

        for callback in callbacks {
            run_callback("error", || callback(message));
        }
    }

    fn handle_closing(&self, id: ConnectionId) {
        let mut state = self.state.lock();
        if !state.is_current(id) || !state.state.is_open() {
            return;
        }
        debug!(connection_id = %id, "Server closing connection");
        state.state = ConnectionState::Closing;
        state.cancel_heartbeat();
    }

    fn handle_close(self: &Arc<Self>, id: ConnectionId, info: &CloseInfo) {
        let (callbacks, outcome) = {
            let mut state = self.state.lock();

            if !state.is_current(id) {
                trace!(connection_id = %id, "Ignoring stale close");
                return;
            }

            state.link = None;
            // Runs on the pump itself; detach rather than abort.
            drop(state.pump.take());

            state.state = ConnectionState::Closed;
            state.client_id = None;
            state.stats.last_disconnected_at = Some(Utc::now());
            state.cancel_heartbeat();

            info!(
                connection_id = %id,
                code = info.code,
                reason = %info.reason,
                "Connection closed"
            );

            let outcome = if state.manual_close {
                None
            } else {
                Some(self.schedule_reconnect(&mut state))
            };

            (state.callbacks.disconnect.clone(), outcome)
        };

        for callback in callbacks {
            run_callback("disconnect", || callback(info));
        }

        if outcome == Some(ReconnectOutcome::Exhausted) {
            self.notifier.error(RECONNECT_EXHAUSTED_MESSAGE);
        }
    }
}

// ============================================================================
// Shared - Timers
// ============================================================================

impl Shared {
    fn start_heartbeat(self: &Arc<Self>, state: &mut ManagerState, id: ConnectionId) {
        let weak = Arc::downgrade(self);
        let timer = TimerHandle::repeating(self.config.heartbeat_interval, move || {
            weak.upgrade()
                .map_or(ControlFlow::Break(()), |shared| shared.heartbeat_tick(id))
        });

        if let Some(previous) = state.heartbeat.replace(timer) {
            previous.cancel();
        }
    }

    fn heartbeat_tick(&self, id: ConnectionId) -> ControlFlow<()> {
        let mut state = self.state.lock();

        if !state.is_current(id) || !state.state.is_open() {
            return ControlFlow::Break(());
        }

        match state.transmit_control(&ControlMessage::Ping) {
            Ok(()) => trace!(connection_id = %id, "Ping sent"),
            Err(e) => warn!(connection_id = %id, error = %e, "Failed to send ping"),
        }

        ControlFlow::Continue(())
    }

    /// Arms the reconnect timer, or reports exhaustion. The caller notifies
    /// after releasing the lock.
    fn schedule_reconnect(self: &Arc<Self>, state: &mut ManagerState) -> ReconnectOutcome {
        let policy = self.config.reconnect;
        let attempts = state.reconnect_attempts;

        if !policy.allows(attempts) {
            error!(attempts, "Max reconnect attempts reached");
            return ReconnectOutcome::Exhausted;
        }

        let delay = policy.delay_for_attempt(attempts);
        info!(
            attempt = attempts + 1,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "Reconnecting"
        );

        state.reconnect_seq += 1;
        let seq = state.reconnect_seq;
        let weak = Arc::downgrade(self);

        let timer = TimerHandle::once(delay, move || {
            if let Some(shared) = weak.upgrade() {
                shared.connect(Some(seq));
            }
        });

        if let Some(previous) = state.reconnect_timer.replace(timer) {
            previous.cancel();
        }

        ReconnectOutcome::Scheduled
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Forwards one link's events into the manager, in order.
async fn pump(shared: Weak<Shared>, id: ConnectionId, mut events: LinkEvents) {
    while let Some(event) = events.recv().await {
        let Some(shared) = shared.upgrade() else {
            return;
        };

        let closed = matches!(event, TransportEvent::Closed(_));
        shared.handle_event(id, event);
        if closed {
            return;
        }
    }

    // Event source vanished without a close.
    if let Some(shared) = shared.upgrade() {
        shared.handle_close(id, &CloseInfo::abnormal());
    }
}

/// Writes buffered payloads in order. On a write failure the rest goes back
/// into the buffer and `false` is returned.
fn flush_buffer(state: &mut ManagerState) -> bool {
    let frames = state.buffer.drain();
    if frames.is_empty() {
        return true;
    }

    let total = frames.len();
    let mut frames = frames.into_iter();

    while let Some(frame) = frames.next() {
        if let Err(e) = state.transmit(frame.clone()) {
            warn!(error = %e, "Flush interrupted");
            state.buffer.push(frame);
            for rest in frames {
                state.buffer.push(rest);
            }
            return false;
        }
    }

    debug!(count = total, "Flushed buffered messages");
    true
}

/// Runs a user callback, logging a panic instead of unwinding.
fn run_callback(kind: &'static str, callback: impl FnOnce()) {
    if let Err(payload) = catch_unwind(AssertUnwindSafe(callback)) {
        error!(callback = kind, panic = %panic_message(&*payload), "Callback panicked");
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use serde_json::json;
    use url::Url;

    use crate::transport::MemoryTransport;

    fn config() -> ChannelConfig {
        ChannelConfig::new(Url::parse("ws://console.local/api/ws/realtime").expect("url"))
    }

    fn manager(transport: &MemoryTransport) -> ChannelManager {
        ChannelManager::new(
            config(),
            Arc::new(transport.clone()),
            Arc::new(TracingNotifier),
        )
        .expect("valid config")
    }

    async fn settle() {
        for _ in 0..16 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_and_open() {
        let transport = MemoryTransport::new();
        let manager = manager(&transport);
        assert_eq!(manager.status(), ChannelStatus::Disconnected);

        manager.connect();
        assert_eq!(manager.state(), ConnectionState::Connecting);

        transport.last_peer().expect("peer").accept();
        settle().await;

        assert!(manager.is_connected());
        assert_eq!(manager.status(), ChannelStatus::Connected);
        assert!(manager.stats().last_connected_at.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_is_noop_while_active() {
        let transport = MemoryTransport::new();
        let manager = manager(&transport);

        manager.connect();
        manager.connect();
        assert_eq!(transport.open_count(), 1);

        transport.last_peer().expect("peer").accept();
        settle().await;
        manager.connect();
        assert_eq!(transport.open_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connected_message_sets_client_id() {
        let transport = MemoryTransport::new();
        let manager = manager(&transport);
        manager.connect();

        let peer = transport.last_peer().expect("peer");
        peer.accept();
        peer.deliver_json(&json!({ "type": "connected", "client_id": "abc" }));
        settle().await;

        assert_eq!(manager.client_id(), Some(ClientId::new("abc")));
        assert_eq!(manager.stats().messages_received, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_events_ignored() {
        let transport = MemoryTransport::new();
        let manager = manager(&transport);

        manager.connect();
        transport.last_peer().expect("peer").accept();
        settle().await;
        let old_id = manager.shared.state.lock().connection_id;

        manager.disconnect();
        manager.connect();
        transport.last_peer().expect("peer").accept();
        settle().await;

        // Late events from the abandoned link
        manager.shared.handle_message(old_id, r#"{"type":"connected","client_id":"old"}"#);
        manager.shared.handle_close(old_id, &CloseInfo::abnormal());

        assert!(manager.is_connected());
        assert_eq!(manager.client_id(), None);
        assert_eq!(manager.stats().reconnect_attempts, 0);
        assert_eq!(transport.open_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_callback_panic_is_isolated() {
        let transport = MemoryTransport::new();
        let manager = manager(&transport);
        let calls = Arc::new(AtomicUsize::new(0));

        manager.on_connect(|| panic!("boom"));
        let counter = Arc::clone(&calls);
        manager.on_connect(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        manager.connect();
        transport.last_peer().expect("peer").accept();
        settle().await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(manager.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_sends_normal_close() {
        let transport = MemoryTransport::new();
        let manager = manager(&transport);
        let closes = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&closes);
        manager.on_disconnect(move |info| sink.lock().push(info.clone()));

        manager.connect();
        let peer = transport.last_peer().expect("peer");
        peer.accept();
        settle().await;

        manager.disconnect();

        let expected = CloseInfo::new(1000, "Client disconnect");
        assert_eq!(peer.closed_by_client(), Some(expected.clone()));
        assert_eq!(*closes.lock(), vec![expected]);
        assert_eq!(manager.state(), ConnectionState::Closed);

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(transport.open_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_close_frame_enters_closing() {
        let transport = MemoryTransport::new();
        let manager = manager(&transport);
        manager.connect();

        let peer = transport.last_peer().expect("peer");
        peer.accept();
        settle().await;

        // Closing arrives ahead of the close itself
        let id = manager.shared.state.lock().connection_id;
        manager.shared.handle_closing(id);
        assert_eq!(manager.status(), ChannelStatus::Closing);

        peer.close(1001, "going away");
        settle().await;
        assert_eq!(manager.state(), ConnectionState::Closed);
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let mut zero_heartbeat = config();
        zero_heartbeat.heartbeat_interval = Duration::ZERO;
        let mut zero_capacity = config();
        zero_capacity.buffer_capacity = 0;

        for config in [zero_heartbeat, zero_capacity] {
            let err = ChannelManager::new(
                config,
                Arc::new(MemoryTransport::new()),
                Arc::new(TracingNotifier),
            )
            .unwrap_err();
            assert!(err.is_config_error());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_firing_after_disconnect_does_not_open() {
        let transport = MemoryTransport::new();
        let manager = manager(&transport);
        manager.connect();
        let peer = transport.last_peer().expect("peer");
        peer.accept();
        settle().await;

        peer.fail("reset");
        settle().await;
        let seq = manager.shared.state.lock().reconnect_seq;

        // The timer task is already past its sleep when disconnect() lands
        manager.disconnect();
        manager.shared.connect(Some(seq));

        assert_eq!(transport.open_attempts(), 1);
        assert_eq!(manager.state(), ConnectionState::Closed);
        assert_eq!(manager.stats().reconnect_attempts, 0);
        assert_eq!(manager.stats().reconnect_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_counts_attempt_with_open() {
        let transport = MemoryTransport::new();
        let manager = manager(&transport);
        manager.connect();
        let peer = transport.last_peer().expect("peer");
        peer.accept();
        settle().await;

        peer.fail("reset");
        settle().await;
        let seq = manager.shared.state.lock().reconnect_seq;

        manager.shared.connect(Some(seq));
        assert_eq!(transport.open_attempts(), 2);
        assert_eq!(manager.state(), ConnectionState::Connecting);
        assert_eq!(manager.stats().reconnect_attempts, 1);

        // The same timer cannot fire twice
        manager.shared.connect(Some(seq));
        assert_eq!(transport.open_attempts(), 2);
        assert_eq!(manager.stats().reconnect_count, 1);
    }

    #[test]
    fn test_connect_outside_runtime_is_noop() {
        let transport = MemoryTransport::new();
        let manager = manager(&transport);
        manager.connect();
        assert_eq!(manager.state(), ConnectionState::Idle);
        assert_eq!(transport.open_attempts(), 0);
    }

    #[test]
    fn test_send_while_idle_buffers() {
        let transport = MemoryTransport::new();
        let manager = manager(&transport);

        assert!(!manager.send(&json!({ "action": "refresh" })));
        assert_eq!(manager.stats().buffered_messages, 1);
        assert_eq!(manager.stats().messages_sent, 0);
    }
}
