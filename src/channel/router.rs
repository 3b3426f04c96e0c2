//! Topic handler registry and dispatch.
//!
//! Handlers are kept per topic in registration order. Dispatch collects the
//! handlers for a message first and invokes them afterwards, so the caller
//! can release its lock before any user code runs.

// ============================================================================
// Imports
// ============================================================================

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use rustc_hash::FxHashMap;
use tracing::error;

use crate::error::{Error, Result};
use crate::identifiers::SubscriptionId;
use crate::protocol::{InboundMessage, Topic};

// ============================================================================
// Types
// ============================================================================

/// Error type handlers may return.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Return type of a message handler.
pub type HandlerResult = std::result::Result<(), HandlerError>;

/// Message handler callback.
///
/// Called for each routable message on the topic it is registered under.
pub type MessageHandler = Arc<dyn Fn(&InboundMessage) -> HandlerResult + Send + Sync>;

/// Handlers selected for one message, in invocation order.
pub type DispatchTargets = Vec<(Topic, MessageHandler)>;

struct Registration {
    id: SubscriptionId,
    handler: MessageHandler,
}

// ============================================================================
// RemoveOutcome
// ============================================================================

/// Result of removing a single handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    /// Handler removed; `topic_emptied` is set when it was the last one.
    Removed {
        /// The topic has no handlers left.
        topic_emptied: bool,
    },
    /// No handler with that ID on that topic.
    NotFound,
}

// ============================================================================
// DispatchReport
// ============================================================================

/// Outcome of invoking the handlers for one message.
#[derive(Debug, Default)]
pub struct DispatchReport {
    /// Handlers that returned `Ok`.
    pub delivered: usize,
    /// Handlers that returned an error or panicked.
    pub failures: Vec<Error>,
}

// ============================================================================
// TopicRouter
// ============================================================================

/// Topic → handlers map.
#[derive(Default)]
pub struct TopicRouter {
    handlers: FxHashMap<Topic, Vec<Registration>>,
}

impl TopicRouter {
    /// Creates an empty router.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler and returns its ID.
    pub fn add(&mut self, topic: Topic, handler: MessageHandler) -> SubscriptionId {
        let id = SubscriptionId::generate();
        self.handlers
            .entry(topic)
            .or_default()
            .push(Registration { id, handler });
        id
    }

    /// Removes one handler. Drops the topic once its list is empty.
    pub fn remove(&mut self, topic: &Topic, id: SubscriptionId) -> RemoveOutcome {
        let Some(registrations) = self.handlers.get_mut(topic) else {
            return RemoveOutcome::NotFound;
        };

        let Some(index) = registrations.iter().position(|r| r.id == id) else {
            return RemoveOutcome::NotFound;
        };

        registrations.remove(index);
        let topic_emptied = registrations.is_empty();
        if topic_emptied {
            self.handlers.remove(topic);
        }

        RemoveOutcome::Removed { topic_emptied }
    }

    /// Removes every handler for a topic. Returns how many were removed.
    pub fn clear(&mut self, topic: &Topic) -> usize {
        self.handlers.remove(topic).map_or(0, |r| r.len())
    }

    /// Number of handlers on a topic.
    #[must_use]
    pub fn handler_count(&self, topic: &Topic) -> usize {
        self.handlers.get(topic).map_or(0, Vec::len)
    }

    /// Returns `true` if any handler is registered on the topic.
    #[inline]
    #[must_use]
    pub fn contains(&self, topic: &Topic) -> bool {
        self.handlers.contains_key(topic)
    }

    /// Selects the handlers for a message.
    ///
    /// Handlers on `topic` come first, then wildcard handlers. A message
    /// explicitly addressed to the wildcard reaches each wildcard handler
    /// once.
    #[must_use]
    pub fn targets(&self, topic: Option<&Topic>) -> DispatchTargets {
        let mut targets = Vec::new();

        if let Some(topic) = topic.filter(|t| !t.is_wildcard()) {
            self.collect(topic, &mut targets);
        }

        self.collect(&Topic::wildcard(), &mut targets);
        targets
    }

    fn collect(&self, topic: &Topic, targets: &mut DispatchTargets) {
        if let Some(registrations) = self.handlers.get(topic) {
            targets.extend(
                registrations
                    .iter()
                    .map(|r| (topic.clone(), Arc::clone(&r.handler))),
            );
        }
    }
}

// ============================================================================
// Dispatch
// ============================================================================

/// Invokes every target with the message.
///
/// A failing handler (error or panic) is logged and does not stop the
/// remaining handlers.
pub fn dispatch(targets: &DispatchTargets, message: &InboundMessage) -> DispatchReport {
    let mut report = DispatchReport::default();

    for (topic, handler) in targets {
        match invoke(topic, handler, message) {
            Ok(()) => report.delivered += 1,
            Err(e) => {
                error!(topic = %topic, error = %e, "Handler error");
                report.failures.push(e);
            }
        }
    }

    report
}

/// Invokes one handler, converting errors and panics into [`Error::Handler`].
///
/// # Errors
///
/// Returns [`Error::Handler`] if the handler fails.
pub fn invoke(topic: &Topic, handler: &MessageHandler, message: &InboundMessage) -> Result<()> {
    match catch_unwind(AssertUnwindSafe(|| handler(message))) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(Error::handler(topic.clone(), e.to_string())),
        Err(payload) => Err(Error::handler(topic.clone(), panic_message(&*payload))),
    }
}

/// Extracts a readable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("panicked: {message}")
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("panicked: {message}")
    } else {
        "panicked".to_string()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use parking_lot::Mutex;

    fn message(json: &str) -> InboundMessage {
        InboundMessage::parse(json).expect("valid message")
    }

    fn recorder(log: &Arc<Mutex<Vec<&'static str>>>, name: &'static str) -> MessageHandler {
        let log = Arc::clone(log);
        Arc::new(move |_msg: &InboundMessage| -> HandlerResult {
            log.lock().push(name);
            Ok(())
        })
    }

    #[test]
    fn test_registration_order_then_wildcard() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut router = TopicRouter::new();
        router.add(Topic::wildcard(), recorder(&log, "any"));
        router.add(Topic::rules(), recorder(&log, "first"));
        router.add(Topic::rules(), recorder(&log, "second"));
        router.add(Topic::stats(), recorder(&log, "stats"));

        let msg = message(r#"{"type":"rule_change"}"#);
        let targets = router.targets(msg.resolve_topic().as_ref());
        let report = dispatch(&targets, &msg);

        assert_eq!(report.delivered, 3);
        assert_eq!(*log.lock(), vec!["first", "second", "any"]);
    }

    #[test]
    fn test_failing_handlers_are_isolated() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut router = TopicRouter::new();
        router.add(
            Topic::logs(),
            Arc::new(|_msg: &InboundMessage| -> HandlerResult { Err("bad payload".into()) }),
        );
        router.add(
            Topic::logs(),
            Arc::new(|_msg: &InboundMessage| -> HandlerResult { panic!("handler exploded") }),
        );
        router.add(Topic::logs(), recorder(&log, "survivor"));

        let msg = message(r#"{"type":"log","message":"hi"}"#);
        let report = dispatch(&router.targets(msg.resolve_topic().as_ref()), &msg);

        assert_eq!(report.delivered, 1);
        assert_eq!(report.failures.len(), 2);
        assert!(report.failures[1].to_string().contains("handler exploded"));
        assert_eq!(*log.lock(), vec!["survivor"]);
    }

    #[test]
    fn test_unroutable_message_reaches_only_wildcard() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut router = TopicRouter::new();
        router.add(Topic::wildcard(), recorder(&log, "any"));
        router.add(Topic::stats(), recorder(&log, "stats"));

        let msg = message(r#"{"type":"mystery"}"#);
        dispatch(&router.targets(msg.resolve_topic().as_ref()), &msg);
        assert_eq!(*log.lock(), vec!["any"]);
    }

    #[test]
    fn test_wildcard_addressed_message_not_duplicated() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut router = TopicRouter::new();
        router.add(Topic::wildcard(), recorder(&log, "any"));

        let msg = message(r#"{"type":"custom","topic":"*"}"#);
        dispatch(&router.targets(msg.resolve_topic().as_ref()), &msg);
        assert_eq!(*log.lock(), vec!["any"]);
    }

    #[test]
    fn test_remove_single_handler() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut router = TopicRouter::new();
        let first = router.add(Topic::alerts(), recorder(&log, "first"));
        let second = router.add(Topic::alerts(), recorder(&log, "second"));

        assert_eq!(
            router.remove(&Topic::alerts(), first),
            RemoveOutcome::Removed {
                topic_emptied: false
            }
        );
        assert_eq!(router.handler_count(&Topic::alerts()), 1);
        assert_eq!(
            router.remove(&Topic::alerts(), first),
            RemoveOutcome::NotFound
        );
        assert_eq!(
            router.remove(&Topic::alerts(), second),
            RemoveOutcome::Removed {
                topic_emptied: true
            }
        );
        assert!(!router.contains(&Topic::alerts()));
    }

    #[test]
    fn test_remove_from_wrong_topic() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut router = TopicRouter::new();
        let id = router.add(Topic::alerts(), recorder(&log, "a"));
        assert_eq!(router.remove(&Topic::logs(), id), RemoveOutcome::NotFound);
        assert_eq!(router.handler_count(&Topic::alerts()), 1);
    }

    #[test]
    fn test_clear_topic() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut router = TopicRouter::new();
        router.add(Topic::system(), recorder(&log, "a"));
        router.add(Topic::system(), recorder(&log, "b"));
        assert_eq!(router.clear(&Topic::system()), 2);
        assert_eq!(router.clear(&Topic::system()), 0);
    }
}
