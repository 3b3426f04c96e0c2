//! Cancellable timers.
//!
//! A [`TimerHandle`] owns a spawned tokio task. Cancelling or dropping the
//! handle aborts the task, so a timer never outlives the state that owns it.

// ============================================================================
// Imports
// ============================================================================

use std::ops::ControlFlow;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at, sleep};

// ============================================================================
// TimerHandle
// ============================================================================

/// Handle to a scheduled callback.
///
/// Must be created inside a tokio runtime.
#[derive(Debug)]
pub struct TimerHandle {
    task: Option<JoinHandle<()>>,
}

impl TimerHandle {
    /// Runs `callback` once after `delay`.
    pub fn once<F>(delay: Duration, callback: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let task = tokio::spawn(async move {
            sleep(delay).await;
            callback();
        });

        Self { task: Some(task) }
    }

    /// Runs `tick` every `period`, first after one full period.
    ///
    /// Stops when `tick` returns [`ControlFlow::Break`].
    pub fn repeating<F>(period: Duration, mut tick: F) -> Self
    where
        F: FnMut() -> ControlFlow<()> + Send + 'static,
    {
        let task = tokio::spawn(async move {
            let mut interval = interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                interval.tick().await;
                if tick().is_break() {
                    break;
                }
            }
        });

        Self { task: Some(task) }
    }

    /// Aborts the timer.
    pub fn cancel(mut self) {
        self.abort();
    }

    /// Releases the handle without aborting.
    ///
    /// Used by a callback that is clearing its own handle.
    pub fn detach(mut self) {
        self.task.take();
    }

    /// Returns `true` once the task has completed or been aborted.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(JoinHandle::is_finished)
    }

    fn abort(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.abort();
    }
}

// ============================================================================
// Tests
// ============================================================================
