//! # Operation Guards
//!
//! An [`OpGuard`] is the token returned by `op_start`. It pairs the start
//! with exactly one stop: it cannot be cloned, and stopping consumes it.
//! Dropping a guard stops its operation too, so an early return or a panic
//! in the operation body cannot leak an in-flight count.

use std::panic::Location;

use crate::node::NodeHandle;
use crate::tree::NodePath;

/// An in-flight operation on one node.
#[must_use = "dropping the guard stops the operation immediately"]
#[derive(Debug)]
pub struct OpGuard {
    node: NodeHandle,
    id: u64,
    caller: &'static Location<'static>,
}

impl OpGuard {
    pub(crate) fn new(node: NodeHandle, id: u64, caller: &'static Location<'static>) -> Self {
        Self { node, id, caller }
    }

    /// The node the operation runs on.
    pub fn path(&self) -> NodePath {
        self.node.path
    }

    /// Where the operation was started.
    pub fn caller(&self) -> &'static Location<'static> {
        self.caller
    }

    /// Stop the operation.
    pub fn stop(self) {
        drop(self);
    }

    pub(crate) fn belongs_to(&self, node: &NodeHandle) -> bool {
        self.node.same_node(node)
    }
}

impl Drop for OpGuard {
    fn drop(&mut self) {
        // Never panic while already unwinding.
        if std::thread::panicking() && self.node.is_destroyed() {
            return;
        }
        self.node.op_stop_raw(self.id, self.caller);
    }
}
