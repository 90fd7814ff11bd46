//! # Event
//!
//! A manual-reset event: once [`Event::set`] is called, every current and
//! future waiter returns until [`Event::reset`] clears it again. Used as the
//! per-request completion signal of a queued transition and as the per-node
//! drain signal of an operation tracker.
//!
//! The event's own lock is a leaf lock. It may be taken while the driver lock
//! is held (to signal), but a waiter never holds the driver lock while
//! blocked on an event.

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// A manual-reset signal.
#[derive(Debug, Default)]
pub(crate) struct Event {
    signaled: Mutex<bool>,
    cv: Condvar,
}

impl Event {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Signal the event and wake every waiter.
    pub(crate) fn set(&self) {
        let mut signaled = self.signaled.lock();
        *signaled = true;
        self.cv.notify_all();
    }

    /// Clear the event so the next wait blocks.
    pub(crate) fn reset(&self) {
        *self.signaled.lock() = false;
    }

    #[cfg(test)]
    pub(crate) fn is_set(&self) -> bool {
        *self.signaled.lock()
    }

    /// Block until the event is signaled.
    pub(crate) fn wait(&self) {
        let mut signaled = self.signaled.lock();
        while !*signaled {
            self.cv.wait(&mut signaled);
        }
    }

    /// Block until the event is signaled or `timeout` elapses.
    ///
    /// Returns `true` if the event was signaled.
    pub(crate) fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut signaled = self.signaled.lock();
        while !*signaled {
            if self.cv.wait_until(&mut signaled, deadline).timed_out() {
                return *signaled;
            }
        }
        true
    }
}
