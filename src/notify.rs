//! User-facing notifications.
//!
//! The manager never returns errors from its public operations. Conditions
//! the user must see (a server `error` message, reconnect attempts
//! exhausted) go to a [`Notifier`] supplied by the application instead.

// ============================================================================
// Imports
// ============================================================================

use tracing::error;

// ============================================================================
// Notifier
// ============================================================================

/// Sink for user-visible notifications (toast, banner, status bar).
pub trait Notifier: Send + Sync {
    /// Shows an error notification.
    fn error(&self, message: &str);
}

/// Notifier that only logs.
///
/// Default when the application does not supply one.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn error(&self, message: &str) {
        error!(notification = %message, "User notification");
    }
}

impl<F> Notifier for F
where
    F: Fn(&str) + Send + Sync,
{
    fn error(&self, message: &str) {
        self(message);
    }
}

// ============================================================================
// Tests
// ============================================================================
