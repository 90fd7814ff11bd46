//! # Transition Tracker
//!
//! Per-node record of the single active transition plus a FIFO queue of
//! pending requests.
//!
//! ## States
//!
//! ```text
//! Idle ──start()/trigger_one()──▶ Active ──stop()──▶ Idle
//!
//! request while Active: Queued ──trigger_one()──▶ Active
//!                              └──abort_one()───▶ Aborted
//! ```
//!
//! Every method runs under the driver lock. The only blocking call is
//! [`PendingTransition::wait`], which the caller makes after releasing it.
//! Calling `stop()` while idle or `start()` while active is a protocol
//! violation and panics.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use thiserror::Error;

use dsc_core::{Blocker, DscError};

use crate::event::Event;
use crate::watchdog::{Diagnostics, Watchdog};

/// The tracker already has an active transition.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("a transition is already active")]
pub(crate) struct Busy;

impl From<Busy> for DscError {
    fn from(_: Busy) -> Self {
        DscError::Again(Blocker::OwnTransition)
    }
}

/// A transition request waiting for its node to become eligible.
///
/// Shared between the waiting caller and the queue that links it. The
/// queue drops its link when the request is triggered or aborted.
#[derive(Debug)]
pub(crate) struct PendingTransition {
    label: &'static str,
    aborted: AtomicBool,
    completion: Event,
    queued_at: Instant,
}

impl PendingTransition {
    fn new(label: &'static str) -> Self {
        Self {
            label,
            aborted: AtomicBool::new(false),
            completion: Event::new(),
            queued_at: Instant::now(),
        }
    }

    /// Block until the request is triggered (`Ok`) or aborted.
    ///
    /// With diagnostics enabled, a wait longer than `wait_timeout` is
    /// escalated as a probable deadlock and the wait then continues.
    pub(crate) fn wait(&self, node: &str, diagnostics: Option<&Diagnostics>) -> Result<(), DscError> {
        match diagnostics {
            Some(diag) => {
                while !self.completion.wait_timeout(diag.wait_timeout) {
                    let what = format!("{node} queued transition '{}'", self.label);
                    diag.escalation.expired(&what, self.queued_at.elapsed());
                }
            }
            None => self.completion.wait(),
        }

        if self.aborted.load(Ordering::Acquire) {
            Err(DscError::Aborted)
        } else {
            Ok(())
        }
    }
}

#[derive(Debug)]
struct ActiveTransition {
    label: &'static str,
    started_at: DateTime<Utc>,
    _watchdog: Option<Watchdog>,
}

/// Active transition plus FIFO queue for one node.
#[derive(Debug)]
pub(crate) struct TransitionTracker {
    node: String,
    active: Option<ActiveTransition>,
    queue: VecDeque<Arc<PendingTransition>>,
    diagnostics: Option<Diagnostics>,
}

impl TransitionTracker {
    pub(crate) fn new(node: String, diagnostics: Option<Diagnostics>) -> Self {
        Self {
            node,
            active: None,
            queue: VecDeque::new(),
            diagnostics,
        }
    }

    /// Make `label` the active transition. Never blocks.
    pub(crate) fn start(&mut self, label: &'static str) -> Result<(), Busy> {
        if self.active.is_some() {
            return Err(Busy);
        }

        let watchdog = self.diagnostics.as_ref().map(|diag| {
            diag.timer.arm(
                format!("{} transition '{label}'", self.node),
                diag.transition_timeout,
            )
        });
        self.active = Some(ActiveTransition {
            label,
            started_at: Utc::now(),
            _watchdog: watchdog,
        });
        tracing::debug!(node = %self.node, desc = label, "transition started");
        Ok(())
    }

    /// Append a request to the tail of the queue.
    pub(crate) fn enqueue(&mut self, label: &'static str) -> Arc<PendingTransition> {
        let pending = Arc::new(PendingTransition::new(label));
        self.queue.push_back(Arc::clone(&pending));
        tracing::debug!(
            node = %self.node,
            desc = label,
            depth = self.queue.len(),
            "transition queued"
        );
        pending
    }

    /// Clear the active transition.
    ///
    /// # Panics
    ///
    /// Panics if no transition is active.
    pub(crate) fn stop(&mut self) {
        let Some(active) = self.active.take() else {
            panic!("{}: transition stop without an active transition", self.node);
        };
        tracing::debug!(node = %self.node, desc = active.label, "transition stopped");
    }

    /// Dequeue the head request, mark it aborted and wake its waiter.
    pub(crate) fn abort_one(&mut self) -> bool {
        let Some(pending) = self.queue.pop_front() else {
            return false;
        };
        tracing::debug!(node = %self.node, desc = pending.label, "queued transition aborted");
        pending.aborted.store(true, Ordering::Release);
        pending.completion.set();
        true
    }

    /// Dequeue the head request, make it active and wake its waiter.
    ///
    /// # Panics
    ///
    /// Panics if a transition is already active; callers check eligibility.
    pub(crate) fn trigger_one(&mut self) -> bool {
        let Some(pending) = self.queue.pop_front() else {
            return false;
        };
        if self.start(pending.label).is_err() {
            panic!(
                "{}: triggered '{}' while another transition is active",
                self.node, pending.label
            );
        }
        tracing::debug!(node = %self.node, desc = pending.label, "queued transition triggered");
        pending.completion.set();
        true
    }

    pub(crate) fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub(crate) fn is_queued(&self) -> bool {
        !self.queue.is_empty()
    }

    pub(crate) fn is_active_or_queued(&self) -> bool {
        self.is_active() || self.is_queued()
    }

    pub(crate) fn active_label(&self) -> Option<&'static str> {
        self.active.as_ref().map(|a| a.label)
    }

    pub(crate) fn active_since(&self) -> Option<DateTime<Utc>> {
        self.active.as_ref().map(|a| a.started_at)
    }

    pub(crate) fn queued_labels(&self) -> Vec<&'static str> {
        self.queue.iter().map(|p| p.label).collect()
    }

    /// Abort every queued request ahead of destruction.
    ///
    /// # Panics
    ///
    /// Panics if a transition is still active; its owner must stop it first.
    pub(crate) fn teardown(&mut self) -> usize {
        if let Some(active) = &self.active {
            panic!(
                "{}: destroyed while transition '{}' is active",
                self.node, active.label
            );
        }
        let mut aborted = 0;
        while self.abort_one() {
            aborted += 1;
        }
        aborted
    }
}
