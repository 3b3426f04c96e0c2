//! Channel configuration.
//!
//! Provides [`ChannelConfig`] and a fluent [`ChannelConfigBuilder`].
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use realtime_channel::ChannelConfig;
//!
//! # fn example() -> realtime_channel::Result<()> {
//! // Same-origin endpoint, as the console page would derive it
//! let config = ChannelConfig::from_origin("https://console.example.com")?;
//! assert_eq!(config.endpoint.as_str(), "wss://console.example.com/api/ws/realtime");
//!
//! // Explicit endpoint with a faster heartbeat
//! let config = ChannelConfig::builder()
//!     .endpoint("ws://127.0.0.1:8000/api/ws/realtime")
//!     .heartbeat_interval(Duration::from_secs(10))
//!     .build()?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::channel::ReconnectPolicy;
use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Path of the realtime endpoint relative to the console origin.
pub const ENDPOINT_PATH: &str = "/api/ws/realtime";

/// Default heartbeat interval (30s).
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Default offline buffer capacity.
pub const DEFAULT_BUFFER_CAPACITY: usize = 100;

/// Close reason sent on caller-initiated disconnect.
pub const DEFAULT_CLOSE_REASON: &str = "Client disconnect";

// ============================================================================
// ChannelConfig
// ============================================================================

/// Configuration for a [`ChannelManager`](crate::ChannelManager).
///
/// Deserializing runs [`validate`](Self::validate); fields set by hand are
/// checked again when the manager is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawChannelConfig")]
pub struct ChannelConfig {
    /// WebSocket endpoint (`ws://` or `wss://`).
    pub endpoint: Url,

    /// Interval between heartbeat pings while open.
    #[serde(serialize_with = "serde_millis::serialize")]
    pub heartbeat_interval: Duration,

    /// Maximum number of payloads buffered while disconnected.
    pub buffer_capacity: usize,

    /// Reconnect backoff policy.
    pub reconnect: ReconnectPolicy,

    /// Reason string sent with the normal-closure frame.
    pub close_reason: String,
}

/// Wire form of [`ChannelConfig`], before validation.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawChannelConfig {
    endpoint: Url,
    #[serde(default = "default_heartbeat_interval", with = "serde_millis")]
    heartbeat_interval: Duration,
    #[serde(default = "default_buffer_capacity")]
    buffer_capacity: usize,
    #[serde(default)]
    reconnect: ReconnectPolicy,
    #[serde(default = "default_close_reason")]
    close_reason: String,
}

impl TryFrom<RawChannelConfig> for ChannelConfig {
    type Error = Error;

    fn try_from(raw: RawChannelConfig) -> Result<Self> {
        let config = Self {
            endpoint: raw.endpoint,
            heartbeat_interval: raw.heartbeat_interval,
            buffer_capacity: raw.buffer_capacity,
            reconnect: raw.reconnect,
            close_reason: raw.close_reason,
        };
        config.validate()?;
        Ok(config)
    }
}

impl ChannelConfig {
    /// Creates a configuration with default settings for an endpoint.
    #[must_use]
    pub fn new(endpoint: Url) -> Self {
        Self {
            endpoint,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            reconnect: ReconnectPolicy::default(),
            close_reason: DEFAULT_CLOSE_REASON.to_string(),
        }
    }

    /// Creates a new configuration builder.
    #[inline]
    #[must_use]
    pub fn builder() -> ChannelConfigBuilder {
        ChannelConfigBuilder::new()
    }

    /// Derives the configuration from the console page origin.
    ///
    /// `https` origins map to `wss`, everything else to `ws`. Any path on
    /// the origin is replaced by [`ENDPOINT_PATH`].
    ///
    /// # Errors
    ///
    /// - [`Error::Url`] if the origin does not parse
    /// - [`Error::InvalidEndpoint`] if the origin has no host
    pub fn from_origin(origin: &str) -> Result<Self> {
        Ok(Self::new(endpoint_from_origin(origin)?))
    }

    /// Checks that every setting is usable.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidEndpoint`] for a non-WebSocket scheme
    /// - [`Error::Config`] for zero intervals, zero capacity or an
    ///   inverted backoff range
    pub fn validate(&self) -> Result<()> {
        if !matches!(self.endpoint.scheme(), "ws" | "wss") {
            return Err(Error::invalid_endpoint(self.endpoint.as_str()));
        }

        if self.heartbeat_interval.is_zero() {
            return Err(Error::config("heartbeat interval must be greater than zero"));
        }

        if self.buffer_capacity == 0 {
            return Err(Error::config("buffer capacity must be greater than zero"));
        }

        if self.reconnect.base_delay > self.reconnect.max_delay {
            return Err(Error::config(format!(
                "reconnect base delay ({}ms) exceeds max delay ({}ms)",
                self.reconnect.base_delay.as_millis(),
                self.reconnect.max_delay.as_millis()
            )));
        }

        Ok(())
    }
}

/// Builds the realtime endpoint URL for a page origin.
///
/// # Errors
///
/// - [`Error::Url`] if the origin does not parse
/// - [`Error::InvalidEndpoint`] if the origin has no host
pub fn endpoint_from_origin(origin: &str) -> Result<Url> {
    let page = Url::parse(origin)?;
    let host = page
        .host_str()
        .ok_or_else(|| Error::invalid_endpoint(origin))?;

    let scheme = if page.scheme() == "https" { "wss" } else { "ws" };
    let authority = match page.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    };

    Ok(Url::parse(&format!("{scheme}://{authority}{ENDPOINT_PATH}"))?)
}

fn default_heartbeat_interval() -> Duration {
    DEFAULT_HEARTBEAT_INTERVAL
}

fn default_buffer_capacity() -> usize {
    DEFAULT_BUFFER_CAPACITY
}

fn default_close_reason() -> String {
    DEFAULT_CLOSE_REASON.to_string()
}

// ============================================================================
// ChannelConfigBuilder
// ============================================================================

/// Builder for [`ChannelConfig`].
///
/// Use [`ChannelConfig::builder()`] to create a new builder.
#[derive(Debug, Default, Clone)]
pub struct ChannelConfigBuilder {
    endpoint: Option<String>,
    origin: Option<String>,
    heartbeat_interval: Option<Duration>,
    buffer_capacity: Option<usize>,
    reconnect: Option<ReconnectPolicy>,
    close_reason: Option<String>,
}

impl ChannelConfigBuilder {
    /// Creates a builder with no configuration.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the WebSocket endpoint explicitly.
    #[inline]
    #[must_use]
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Derives the endpoint from the console page origin.
    ///
    /// Ignored when [`endpoint`](Self::endpoint) is also set.
    #[inline]
    #[must_use]
    pub fn origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    /// Sets the heartbeat interval.
    #[inline]
    #[must_use]
    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = Some(interval);
        self
    }

    /// Sets the offline buffer capacity.
    #[inline]
    #[must_use]
    pub fn buffer_capacity(mut self, capacity: usize) -> Self {
        self.buffer_capacity = Some(capacity);
        self
    }

    /// Sets the reconnect policy.
    #[inline]
    #[must_use]
    pub fn reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = Some(policy);
        self
    }

    /// Sets the close reason sent on disconnect.
    #[inline]
    #[must_use]
    pub fn close_reason(mut self, reason: impl Into<String>) -> Self {
        self.close_reason = Some(reason.into());
        self
    }

    /// Builds the configuration with validation.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if neither endpoint nor origin is set
    /// - [`Error::Url`] / [`Error::InvalidEndpoint`] for a bad endpoint
    /// - any error from [`ChannelConfig::validate`]
    pub fn build(self) -> Result<ChannelConfig> {
        let endpoint = self.resolve_endpoint()?;

        let mut config = ChannelConfig::new(endpoint);
        if let Some(interval) = self.heartbeat_interval {
            config.heartbeat_interval = interval;
        }
        if let Some(capacity) = self.buffer_capacity {
            config.buffer_capacity = capacity;
        }
        if let Some(policy) = self.reconnect {
            config.reconnect = policy;
        }
        if let Some(reason) = self.close_reason {
            config.close_reason = reason;
        }

        config.validate()?;
        Ok(config)
    }

    fn resolve_endpoint(&self) -> Result<Url> {
        match (&self.endpoint, &self.origin) {
            (Some(endpoint), _) => Ok(Url::parse(endpoint)?),
            (None, Some(origin)) => endpoint_from_origin(origin),
            (None, None) => Err(Error::config(
                "Endpoint is required. Use .endpoint() or .origin() to set it.\n\
                 Example: ChannelConfig::builder().origin(\"https://console.example.com\")",
            )),
        }
    }
}

// ============================================================================
// Duration (de)serialization
// ============================================================================

/// Serializes a [`Duration`] as integer milliseconds.
pub(crate) mod serde_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

// ============================================================================
// Tests
// ============================================================================
