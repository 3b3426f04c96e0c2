//! Error types for the realtime channel.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! Configuration and transport setup return [`Result<T>`] which uses [`Error`].
//! The public channel operations (`send`, `subscribe`, `unsubscribe`) never
//! return these errors to the caller; failures there are logged, reported as
//! `false`, or surfaced through the [`Notifier`](crate::notify::Notifier).
//!
//! ```ignore
//! use realtime_channel::{ChannelConfig, Result};
//!
//! fn config() -> Result<ChannelConfig> {
//!     ChannelConfig::from_origin("https://console.example.com")
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`], [`Error::InvalidEndpoint`] |
//! | Connection | [`Error::Connection`], [`Error::ConnectionClosed`] |
//! | Protocol | [`Error::Protocol`], [`Error::Handler`] |
//! | External | [`Error::Json`], [`Error::WebSocket`], [`Error::Url`], [`Error::Io`] |

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;

use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::protocol::Topic;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when channel configuration is invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// Endpoint is not a usable WebSocket URL.
    #[error("Invalid endpoint: {endpoint}")]
    InvalidEndpoint {
        /// The rejected endpoint.
        endpoint: String,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// WebSocket connection failed.
    ///
    /// Returned when the link cannot be opened or written to.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// Link closed before the operation could complete.
    #[error("Connection closed")]
    ConnectionClosed,

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// Malformed or unexpected message.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    /// A topic handler failed while processing a message.
    #[error("Handler for topic {topic} failed: {message}")]
    Handler {
        /// Topic the failing handler was registered on.
        topic: Topic,
        /// Failure description (error text or panic payload).
        message: String,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),

    /// URL parse error.
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates an invalid endpoint error.
    #[inline]
    pub fn invalid_endpoint(endpoint: impl Into<String>) -> Self {
        Self::InvalidEndpoint {
            endpoint: endpoint.into(),
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates a handler error.
    #[inline]
    pub fn handler(topic: Topic, message: impl Into<String>) -> Self {
        Self::Handler {
            topic,
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. } | Self::ConnectionClosed | Self::WebSocket(_)
        )
    }

    /// Returns `true` if this is a configuration error.
    #[inline]
    #[must_use]
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::Config { .. } | Self::InvalidEndpoint { .. } | Self::Url(_)
        )
    }

    /// Returns `true` if a later reconnect may succeed.
    ///
    /// Configuration errors are permanent; connection errors are not.
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        self.is_connection_error()
    }
}

// ============================================================================
// Tests
// ============================================================================
