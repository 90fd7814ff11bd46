//! # Node Handle
//!
//! The level-independent half of every node handle: resolves a
//! [`NodePath`] against the shared tree, runs the admission policy, and
//! delegates to the node's trackers. [`Driver`](crate::Driver),
//! [`Psoc`](crate::Psoc) and [`Vdev`](crate::Vdev) wrap one of these and
//! expose it through [`node_api!`].
//!
//! ## Locking
//!
//! Every method takes the driver lock for its bookkeeping only. The two
//! blocking calls, `trans_start_wait` and `wait_for_ops`, prepare what they
//! wait on under the lock, release it, and only then block.

use std::panic::Location;
use std::sync::Arc;

use dsc_core::{DscError, Rejection};

use crate::cascade;
use crate::guard::OpGuard;
use crate::policy;
use crate::tree::{NodePath, Shared, SyncNode};

const DESTROYED: DscError = DscError::Invalid(Rejection::Destroyed);

#[derive(Debug, Clone)]
pub(crate) struct NodeHandle {
    pub(crate) shared: Arc<Shared>,
    pub(crate) path: NodePath,
}

impl NodeHandle {
    pub(crate) fn new(shared: Arc<Shared>, path: NodePath) -> Self {
        Self { shared, path }
    }

    fn with_node<R>(&self, f: impl FnOnce(&SyncNode) -> R) -> Option<R> {
        let tree = self.shared.tree.lock();
        tree.node(self.path).map(f)
    }

    pub(crate) fn same_node(&self, other: &NodeHandle) -> bool {
        self.path == other.path && Arc::ptr_eq(&self.shared, &other.shared)
    }

    pub(crate) fn is_destroyed(&self) -> bool {
        self.with_node(|_| ()).is_none()
    }

    // ── Transitions ─────────────────────────────────────────────────

    pub(crate) fn trans_start(&self, label: &'static str) -> Result<(), DscError> {
        let mut tree = self.shared.tree.lock();
        if let Err(err) = policy::can_trans(&tree, self.path, &self.shared.status) {
            self.rejected(label, &err);
            return Err(err);
        }
        let node = tree.node_mut(self.path).ok_or(DESTROYED)?;
        node.trans.start(label)?;
        Ok(())
    }

    pub(crate) fn trans_start_wait(&self, label: &'static str) -> Result<(), DscError> {
        let pending = {
            let mut tree = self.shared.tree.lock();
            match policy::can_trans(&tree, self.path, &self.shared.status) {
                Ok(()) => {
                    let node = tree.node_mut(self.path).ok_or(DESTROYED)?;
                    node.trans.start(label)?;
                    return Ok(());
                }
                Err(DscError::Again(blocker)) => {
                    tracing::debug!(
                        driver = %self.shared.id,
                        node = %self.path,
                        desc = label,
                        %blocker,
                        "transition must wait"
                    );
                    let node = tree.node_mut(self.path).ok_or(DESTROYED)?;
                    node.trans.enqueue(label)
                }
                Err(err) => {
                    self.rejected(label, &err);
                    return Err(err);
                }
            }
        };

        let result = pending.wait(&self.path.to_string(), self.shared.diagnostics.as_ref());
        tracing::debug!(
            driver = %self.shared.id,
            node = %self.path,
            desc = label,
            ?result,
            "transition wait finished"
        );
        result
    }

    pub(crate) fn trans_stop(&self) {
        let mut tree = self.shared.tree.lock();
        let Some(node) = tree.node_mut(self.path) else {
            panic!("{}: transition stop on a destroyed node", self.path);
        };
        node.trans.stop();
        if let Some(next) = cascade::trigger(&mut tree) {
            tracing::debug!(
                driver = %self.shared.id,
                stopped = %self.path,
                triggered = %next,
                "cascade triggered queued transition"
            );
        }
    }

    // ── Operations ──────────────────────────────────────────────────

    pub(crate) fn op_start(&self, caller: &'static Location<'static>) -> Result<OpGuard, DscError> {
        let id = self.shared.next_op_id();
        {
            let mut tree = self.shared.tree.lock();
            if let Err(err) = policy::can_op(&tree, self.path) {
                tracing::debug!(
                    driver = %self.shared.id,
                    node = %self.path,
                    %caller,
                    %err,
                    "operation rejected"
                );
                return Err(err);
            }
            let node = tree.node_mut(self.path).ok_or(DESTROYED)?;
            node.ops.start(id, caller)?;
        }
        Ok(OpGuard::new(self.clone(), id, caller))
    }

    pub(crate) fn op_stop_raw(&self, id: u64, caller: &'static Location<'static>) {
        let mut tree = self.shared.tree.lock();
        let Some(node) = tree.node_mut(self.path) else {
            panic!("{}: operation stop from {caller} on a destroyed node", self.path);
        };
        node.ops.stop(id, caller);
    }

    pub(crate) fn wait_for_ops(&self) {
        let drain = {
            let tree = self.shared.tree.lock();
            let Some(node) = tree.node(self.path) else {
                return;
            };
            if self.shared.debug_tracking() {
                assert!(
                    policy::can_op(&tree, self.path).is_err(),
                    "{}: waiting for operations while new ones can still start",
                    self.path
                );
            }
            node.ops.prepare_drain()
        };

        if let Some(drain) = drain {
            tracing::debug!(driver = %self.shared.id, node = %self.path, "waiting for operations to drain");
            drain.wait();
        }
    }

    pub(crate) fn assert_trans_protected(&self) {
        if !self.shared.debug_tracking() {
            return;
        }
        let tree = self.shared.tree.lock();
        assert!(
            policy::is_protected(&tree, self.path),
            "{}: not protected by an active transition",
            self.path
        );
    }

    // ── Queries ─────────────────────────────────────────────────────

    pub(crate) fn is_trans_active(&self) -> bool {
        self.with_node(|n| n.trans.is_active()).unwrap_or(false)
    }

    pub(crate) fn is_trans_queued(&self) -> bool {
        self.with_node(|n| n.trans.is_queued()).unwrap_or(false)
    }

    pub(crate) fn is_trans_active_or_queued(&self) -> bool {
        self.with_node(|n| n.trans.is_active_or_queued()).unwrap_or(false)
    }

    pub(crate) fn active_transition(&self) -> Option<&'static str> {
        self.with_node(|n| n.trans.active_label()).flatten()
    }

    pub(crate) fn queued_transitions(&self) -> Vec<&'static str> {
        self.with_node(|n| n.trans.queued_labels()).unwrap_or_default()
    }

    pub(crate) fn op_count(&self) -> usize {
        self.with_node(|n| n.ops.count()).unwrap_or(0)
    }

    fn rejected(&self, label: &'static str, err: &DscError) {
        tracing::debug!(
            driver = %self.shared.id,
            node = %self.path,
            desc = label,
            %err,
            "transition rejected"
        );
    }
}

/// The API shared by every node handle, for code that works on any level.
///
/// Each handle also exposes these as inherent methods, so the trait only
/// needs importing for generic or `dyn` use.
pub trait Node: Send + Sync + std::fmt::Debug {
    fn path(&self) -> NodePath;
    fn trans_start(&self, desc: &'static str) -> Result<(), DscError>;
    fn trans_start_wait(&self, desc: &'static str) -> Result<(), DscError>;
    fn trans_stop(&self);
    #[track_caller]
    fn op_start(&self) -> Result<OpGuard, DscError>;
    fn op_stop(&self, guard: OpGuard);
    fn wait_for_ops(&self);
    fn assert_trans_protected(&self);
    fn is_trans_active(&self) -> bool;
    fn is_trans_queued(&self) -> bool;
    fn is_trans_active_or_queued(&self) -> bool;
    fn active_transition(&self) -> Option<&'static str>;
    fn op_count(&self) -> usize;
    fn is_destroyed(&self) -> bool;
}

/// Generate the public API shared by every node handle type.
///
/// The handle must have a `node: NodeHandle` field.
macro_rules! node_api {
    ($handle:ident) => {
        impl $handle {
            /// Where this node sits in its driver tree.
            pub fn path(&self) -> $crate::NodePath {
                self.node.path
            }

            /// Start a transition without blocking.
            ///
            /// # Errors
            ///
            /// `Again` if the node itself or a descendant blocks it, `Invalid`
            /// if an ancestor does or the node has been destroyed.
            pub fn trans_start(&self, desc: &'static str) -> Result<(), dsc_core::DscError> {
                self.node.trans_start(desc)
            }

            /// Start a transition, queueing behind the current holder if the
            /// node is only temporarily blocked.
            ///
            /// Blocks until the queued request is triggered (`Ok`, the
            /// transition is now active) or flushed by teardown (`Aborted`).
            /// Hard rejections return immediately.
            pub fn trans_start_wait(&self, desc: &'static str) -> Result<(), dsc_core::DscError> {
                self.node.trans_start_wait(desc)
            }

            /// Stop the active transition and trigger the next eligible
            /// queued one anywhere in the tree.
            ///
            /// # Panics
            ///
            /// Panics if no transition is active or the node was destroyed.
            pub fn trans_stop(&self) {
                self.node.trans_stop()
            }

            /// Start an operation on behalf of the calling location.
            ///
            /// The returned guard stops the operation when handed to
            /// [`Self::op_stop`], stopped explicitly, or dropped.
            #[track_caller]
            pub fn op_start(&self) -> Result<$crate::OpGuard, dsc_core::DscError> {
                self.node.op_start(std::panic::Location::caller())
            }

            /// Stop an operation started on this node.
            ///
            /// # Panics
            ///
            /// Panics if `guard` belongs to a different node.
            pub fn op_stop(&self, guard: $crate::OpGuard) {
                assert!(
                    guard.belongs_to(&self.node),
                    "{}: operation guard from {} handed to the wrong node",
                    self.node.path,
                    guard.path()
                );
                guard.stop();
            }

            /// Block until no operation is in flight on this node.
            ///
            /// The caller must already prevent new operations, normally by
            /// holding a transition on this node or an ancestor.
            pub fn wait_for_ops(&self) {
                self.node.wait_for_ops()
            }

            /// Assert that this node or an ancestor holds an active
            /// transition. Only checked with debug tracking enabled.
            pub fn assert_trans_protected(&self) {
                self.node.assert_trans_protected()
            }

            pub fn is_trans_active(&self) -> bool {
                self.node.is_trans_active()
            }

            pub fn is_trans_queued(&self) -> bool {
                self.node.is_trans_queued()
            }

            pub fn is_trans_active_or_queued(&self) -> bool {
                self.node.is_trans_active_or_queued()
            }

            /// Description of the active transition, if any.
            pub fn active_transition(&self) -> Option<&'static str> {
                self.node.active_transition()
            }

            /// Descriptions of queued requests, head first.
            pub fn queued_transitions(&self) -> Vec<&'static str> {
                self.node.queued_transitions()
            }

            /// Number of operations in flight.
            pub fn op_count(&self) -> usize {
                self.node.op_count()
            }

            /// Whether this node has been destroyed through any handle.
            pub fn is_destroyed(&self) -> bool {
                self.node.is_destroyed()
            }
        }

        impl $crate::Node for $handle {
            fn path(&self) -> $crate::NodePath {
                $handle::path(self)
            }

            fn trans_start(&self, desc: &'static str) -> Result<(), dsc_core::DscError> {
                $handle::trans_start(self, desc)
            }

            fn trans_start_wait(&self, desc: &'static str) -> Result<(), dsc_core::DscError> {
                $handle::trans_start_wait(self, desc)
            }

            fn trans_stop(&self) {
                $handle::trans_stop(self)
            }

            #[track_caller]
            fn op_start(&self) -> Result<$crate::OpGuard, dsc_core::DscError> {
                self.node.op_start(std::panic::Location::caller())
            }

            fn op_stop(&self, guard: $crate::OpGuard) {
                $handle::op_stop(self, guard)
            }

            fn wait_for_ops(&self) {
                $handle::wait_for_ops(self)
            }

            fn assert_trans_protected(&self) {
                $handle::assert_trans_protected(self)
            }

            fn is_trans_active(&self) -> bool {
                $handle::is_trans_active(self)
            }

            fn is_trans_queued(&self) -> bool {
                $handle::is_trans_queued(self)
            }

            fn is_trans_active_or_queued(&self) -> bool {
                $handle::is_trans_active_or_queued(self)
            }

            fn active_transition(&self) -> Option<&'static str> {
                $handle::active_transition(self)
            }

            fn op_count(&self) -> usize {
                $handle::op_count(self)
            }

            fn is_destroyed(&self) -> bool {
                $handle::is_destroyed(self)
            }
        }
    };
}

pub(crate) use node_api;
