//! # Psoc Handle
//!
//! A psoc sits directly under its driver and owns a list of vdevs. Its
//! transitions are hard-rejected while the driver is mid-transition and
//! deferred while one of its vdevs is.

use std::sync::Arc;

use dsc_core::{DriverId, DscError, PsocId, Rejection};

use crate::driver::Driver;
use crate::node::{node_api, NodeHandle};
use crate::tree::NodePath;

/// Handle to a psoc node.
#[derive(Debug, Clone)]
pub struct Psoc {
    pub(crate) node: NodeHandle,
    id: PsocId,
}

node_api!(Psoc);

impl Psoc {
    /// Attach a new psoc to `driver`, after any existing psocs.
    ///
    /// # Errors
    ///
    /// `Invalid(Destroyed)` if the driver is gone, `OutOfMemory` if the psoc
    /// list cannot grow.
    pub fn create(driver: &Driver) -> Result<Self, DscError> {
        let shared = Arc::clone(&driver.node.shared);
        let id = {
            let mut tree = shared.tree.lock();
            if tree.destroyed {
                return Err(DscError::Invalid(Rejection::Destroyed));
            }
            tree.psocs.try_reserve(1).map_err(|_| DscError::OutOfMemory)?;
            let id = PsocId::from_raw(shared.next_node_id());
            tree.psocs.push(shared.new_psoc(id));
            id
        };

        tracing::info!(driver = %shared.id, psoc = %id, "psoc created");
        Ok(Self {
            node: NodeHandle::new(shared, NodePath::Psoc(id)),
            id,
        })
    }

    pub fn id(&self) -> PsocId {
        self.id
    }

    pub fn driver_id(&self) -> DriverId {
        self.node.shared.id
    }

    /// Number of live vdevs under this psoc.
    pub fn vdev_count(&self) -> usize {
        let tree = self.node.shared.tree.lock();
        tree.psoc(self.id).map_or(0, |p| p.vdevs.len())
    }

    /// Detach and destroy the psoc, aborting every queued transition request.
    ///
    /// # Panics
    ///
    /// Panics if vdevs are still attached, operations are in flight, a
    /// transition is active, or the psoc was already destroyed.
    pub fn destroy(self) {
        let shared = &self.node.shared;
        let mut tree = shared.tree.lock();
        let Some(psoc) = tree.psoc_mut(self.id) else {
            panic!("{}: destroyed twice", self.id);
        };
        if !psoc.vdevs.is_empty() {
            panic!("{}: destroyed with {} live vdev(s)", self.id, psoc.vdevs.len());
        }
        psoc.sync.ops.assert_drained();
        let aborted = psoc.sync.trans.teardown();
        tree.psocs.retain(|p| p.id != self.id);
        drop(tree);

        tracing::info!(driver = %shared.id, psoc = %self.id, aborted, "psoc destroyed");
    }
}
