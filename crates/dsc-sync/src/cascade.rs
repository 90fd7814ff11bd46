//! # Cascade Trigger
//!
//! After any transition stops, walk the tree top-down and trigger at most one
//! queued transition, in structural order: the driver, then each psoc in
//! creation order, then the vdevs of that psoc in creation order.
//!
//! - A queued driver request wins outright once nothing in the tree is
//!   active. While anything is active it stays queued and nothing else is
//!   triggered, so activity elsewhere drains towards it.
//! - A node with an active transition is skipped along with its subtree.
//! - A psoc with a queued request and an active vdev is skipped along with
//!   its vdevs, which defer to the psoc request.

use crate::tree::{NodePath, Tree};

/// Trigger the next eligible queued transition, if any.
pub(crate) fn trigger(tree: &mut Tree) -> Option<NodePath> {
    if tree.destroyed || tree.driver.trans.is_active() {
        return None;
    }

    if tree.driver.trans.is_queued() {
        if tree.any_descendant_active() {
            return None;
        }
        return tree.driver.trans.trigger_one().then_some(NodePath::Driver);
    }

    for psoc in &mut tree.psocs {
        if psoc.sync.trans.is_active() {
            continue;
        }

        if psoc.sync.trans.is_queued() {
            if !psoc.any_vdev_active() && psoc.sync.trans.trigger_one() {
                return Some(NodePath::Psoc(psoc.id));
            }
            continue;
        }

        for vdev in &mut psoc.vdevs {
            if !vdev.sync.trans.is_active() && vdev.sync.trans.trigger_one() {
                return Some(NodePath::Vdev(psoc.id, vdev.id));
            }
        }
    }

    None
}
