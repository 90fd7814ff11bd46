//! # Vdev Handle
//!
//! The leaf level. Besides the common node API a vdev carries a single-slot
//! register for one north-bound command that arrived while a transition
//! (typically recovery) held the vdev, so it can be replayed afterwards.
//!
//! The slot is not a queue: caching a second command before replay
//! discards the first.

use std::sync::Arc;

use dsc_core::{CommandId, DscError, PsocId, Rejection, VdevId};

use crate::node::{node_api, NodeHandle};
use crate::psoc::Psoc;
use crate::tree::NodePath;

/// Handle to a vdev node.
#[derive(Debug, Clone)]
pub struct Vdev {
    pub(crate) node: NodeHandle,
    psoc: PsocId,
    id: VdevId,
}

node_api!(Vdev);

impl Vdev {
    /// Attach a new vdev to `psoc`, after any existing vdevs.
    ///
    /// # Errors
    ///
    /// `Invalid(Destroyed)` if the psoc is gone, `OutOfMemory` if the vdev
    /// list cannot grow.
    pub fn create(psoc: &Psoc) -> Result<Self, DscError> {
        let shared = Arc::clone(&psoc.node.shared);
        let psoc_id = psoc.id();
        let id = {
            let mut tree = shared.tree.lock();
            if tree.destroyed {
                return Err(DscError::Invalid(Rejection::Destroyed));
            }
            let id = VdevId::from_raw(shared.next_node_id());
            let vdev = shared.new_vdev(psoc_id, id);
            let parent = tree
                .psoc_mut(psoc_id)
                .ok_or(DscError::Invalid(Rejection::Destroyed))?;
            parent.vdevs.try_reserve(1).map_err(|_| DscError::OutOfMemory)?;
            parent.vdevs.push(vdev);
            id
        };

        tracing::info!(driver = %shared.id, psoc = %psoc_id, vdev = %id, "vdev created");
        Ok(Self {
            node: NodeHandle::new(shared, NodePath::Vdev(psoc_id, id)),
            psoc: psoc_id,
            id,
        })
    }

    pub fn id(&self) -> VdevId {
        self.id
    }

    pub fn psoc_id(&self) -> PsocId {
        self.psoc
    }

    /// The cached command, left in place.
    pub fn get_cached_cmd(&self) -> Option<CommandId> {
        let tree = self.node.shared.tree.lock();
        tree.psoc(self.psoc)?.vdev(self.id)?.cached_cmd
    }

    /// Remember `cmd` for later replay, replacing any earlier one.
    pub fn cache_command(&self, cmd: CommandId) {
        let mut tree = self.node.shared.tree.lock();
        let Some(vdev) = tree.vdev_mut(self.psoc, self.id) else {
            tracing::warn!(vdev = %self.id, %cmd, "command cached on a destroyed vdev");
            return;
        };
        if let Some(discarded) = vdev.cached_cmd.replace(cmd) {
            tracing::debug!(vdev = %self.id, %cmd, %discarded, "cached command overwritten");
        }
    }

    /// The cached command, clearing the slot.
    pub fn take_cached_cmd(&self) -> Option<CommandId> {
        let mut tree = self.node.shared.tree.lock();
        tree.vdev_mut(self.psoc, self.id)?.cached_cmd.take()
    }

    /// Detach and destroy the vdev, aborting every queued transition request.
    ///
    /// # Panics
    ///
    /// Panics if operations are in flight, a transition is active, or the
    /// vdev was already destroyed.
    pub fn destroy(self) {
        let shared = &self.node.shared;
        let mut tree = shared.tree.lock();
        let path = self.node.path;
        let Some(psoc) = tree.psoc_mut(self.psoc) else {
            panic!("{path}: destroyed twice");
        };
        let Some(pos) = psoc.vdevs.iter().position(|v| v.id == self.id) else {
            panic!("{path}: destroyed twice");
        };
        let vdev = &mut psoc.vdevs[pos];
        vdev.sync.ops.assert_drained();
        let aborted = vdev.sync.trans.teardown();
        psoc.vdevs.remove(pos);
        drop(tree);

        tracing::info!(driver = %shared.id, node = %path, aborted, "vdev destroyed");
    }
}
