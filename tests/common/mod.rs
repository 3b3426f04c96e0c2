//! Shared utilities for integration tests.
//!
//! Provides:
//! - A manager wired to a [`MemoryTransport`] and a recording notifier
//! - Logging initialization
//! - Helpers for inspecting control frames

#![allow(dead_code)]

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use realtime_channel::{ChannelConfig, ChannelManager, MemoryPeer, MemoryTransport};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

// ============================================================================
// Harness
// ============================================================================

/// Manager under test plus the fake server behind it.
pub struct Harness {
    pub manager: ChannelManager,
    pub transport: MemoryTransport,
    pub notifications: Arc<Mutex<Vec<String>>>,
}

impl Harness {
    /// Harness with default settings.
    pub fn new() -> Self {
        Self::with_config(config())
    }

    /// Harness with a custom configuration.
    pub fn with_config(config: ChannelConfig) -> Self {
        init_logging();

        let transport = MemoryTransport::new();
        let notifications = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&notifications);
        let manager = ChannelManager::new(
            config,
            Arc::new(transport.clone()),
            Arc::new(move |message: &str| sink.lock().push(message.to_string())),
        )
        .expect("valid config");

        Self {
            manager,
            transport,
            notifications,
        }
    }

    /// Connects and completes the handshake.
    pub async fn open(&self) -> MemoryPeer {
        self.manager.connect();
        let peer = self.transport.last_peer().expect("link opened");
        peer.accept();
        settle().await;
        peer
    }

    /// Notifications shown so far.
    pub fn notifications(&self) -> Vec<String> {
        self.notifications.lock().clone()
    }
}

// ============================================================================
// Functions
// ============================================================================

/// Default test configuration.
pub fn config() -> ChannelConfig {
    ChannelConfig::builder()
        .endpoint("ws://console.local/api/ws/realtime")
        .build()
        .expect("valid config")
}

/// Initialize tracing for tests. `RUST_LOG` controls verbosity.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Lets spawned tasks drain their queues without moving the clock.
pub async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

/// Moves the paused clock forward, then settles.
pub async fn advance(duration: Duration) {
    tokio::time::sleep(duration).await;
    settle().await;
}

/// `(action, topic)` pairs of the control frames a peer received.
pub fn control_frames(peer: &MemoryPeer) -> Vec<(String, Option<String>)> {
    peer.sent_json()
        .iter()
        .filter_map(|frame| {
            let action = frame.get("action")?.as_str()?;
            matches!(action, "subscribe" | "unsubscribe" | "ping").then(|| {
                (
                    action.to_string(),
                    frame.get("topic").and_then(Value::as_str).map(str::to_string),
                )
            })
        })
        .collect()
}

/// Number of pings a peer received.
pub fn ping_count(peer: &MemoryPeer) -> usize {
    control_frames(peer)
        .iter()
        .filter(|(action, _)| action == "ping")
        .count()
}

/// Topics a peer was asked to subscribe to, in order.
pub fn subscribed_topics(peer: &MemoryPeer) -> Vec<String> {
    control_frames(peer)
        .into_iter()
        .filter(|(action, _)| action == "subscribe")
        .filter_map(|(_, topic)| topic)
        .collect()
}

/// Shared recorder for handler deliveries.
pub fn recorder() -> Arc<Mutex<Vec<Value>>> {
    Arc::new(Mutex::new(Vec::new()))
}
