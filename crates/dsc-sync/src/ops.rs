//! # Operation Tracker
//!
//! Per-node count of in-flight operations and the drain signal that
//! `wait_for_ops` blocks on.
//!
//! With diagnostics enabled, every operation also gets an
//! [`OperationRecord`] naming its caller, thread and start time, guarded by
//! a deadline on the tree's watchdog timer. The invariant
//! `count == records.len()` holds whenever records are kept.

use std::panic::Location;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use dsc_core::DscError;

use crate::event::Event;
use crate::watchdog::{Diagnostics, Watchdog};

/// Diagnostic record of one in-flight operation.
#[derive(Debug)]
pub(crate) struct OperationRecord {
    pub(crate) id: u64,
    pub(crate) caller: &'static Location<'static>,
    pub(crate) thread: String,
    pub(crate) started_at: DateTime<Utc>,
    _watchdog: Watchdog,
}

#[derive(Debug)]
pub(crate) struct OperationTracker {
    node: String,
    count: usize,
    drain: Arc<Event>,
    records: Option<Vec<OperationRecord>>,
    diagnostics: Option<Diagnostics>,
}

impl OperationTracker {
    pub(crate) fn new(node: String, diagnostics: Option<Diagnostics>) -> Self {
        Self {
            node,
            count: 0,
            drain: Arc::new(Event::new()),
            records: diagnostics.as_ref().map(|_| Vec::new()),
            diagnostics,
        }
    }

    /// Count a new operation. Fails only if its record cannot be allocated.
    pub(crate) fn start(
        &mut self,
        id: u64,
        caller: &'static Location<'static>,
    ) -> Result<(), DscError> {
        if let (Some(records), Some(diag)) = (self.records.as_mut(), self.diagnostics.as_ref()) {
            records.try_reserve(1).map_err(|_| DscError::OutOfMemory)?;

            let thread = std::thread::current();
            let thread = match thread.name() {
                Some(name) => format!("{name} ({:?})", thread.id()),
                None => format!("{:?}", thread.id()),
            };
            records.push(OperationRecord {
                id,
                caller,
                thread,
                started_at: Utc::now(),
                _watchdog: diag.timer.arm(
                    format!("{} operation from {caller}", self.node),
                    diag.op_timeout,
                ),
            });
        }

        self.count += 1;
        tracing::trace!(node = %self.node, %caller, count = self.count, "operation started");
        Ok(())
    }

    /// Uncount an operation, signaling the drain event at zero.
    ///
    /// # Panics
    ///
    /// Panics if no operation is in flight, or if diagnostics are enabled and
    /// no record matches `id`.
    pub(crate) fn stop(&mut self, id: u64, caller: &'static Location<'static>) {
        if self.count == 0 {
            panic!("{}: operation stop from {caller} without a matching start", self.node);
        }
        if let Some(records) = self.records.as_mut() {
            let Some(pos) = records.iter().position(|r| r.id == id) else {
                panic!("{}: no in-flight operation record for {caller}", self.node);
            };
            records.remove(pos);
        }

        self.count -= 1;
        tracing::trace!(node = %self.node, %caller, count = self.count, "operation stopped");
        if self.count == 0 {
            self.drain.set();
        }
    }

    /// Arm the drain signal if operations are in flight.
    ///
    /// Returns the event to wait on after the driver lock is released, or
    /// `None` when the node is already drained.
    pub(crate) fn prepare_drain(&self) -> Option<Arc<Event>> {
        if self.count == 0 {
            return None;
        }
        self.drain.reset();
        Some(Arc::clone(&self.drain))
    }

    pub(crate) fn count(&self) -> usize {
        self.count
    }

    pub(crate) fn records(&self) -> &[OperationRecord] {
        self.records.as_deref().unwrap_or(&[])
    }

    /// # Panics
    ///
    /// Panics if operations are still in flight.
    pub(crate) fn assert_drained(&self) {
        if self.count != 0 {
            panic!(
                "{}: destroyed with {} operation(s) in flight",
                self.node, self.count
            );
        }
    }
}
