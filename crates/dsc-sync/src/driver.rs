//! # Driver Handle
//!
//! The root of a synchronization tree. Creating a driver creates the tree
//! and its lock; every psoc and vdev created beneath it shares both.

use std::sync::Arc;

use dsc_core::{ConfigError, DriverId, DscConfig, DscError, Rejection, SystemStatus};

use crate::node::{node_api, NodeHandle};
use crate::snapshot::DriverSnapshot;
use crate::tree::{NodePath, Shared};

/// Handle to a driver node.
///
/// Clones refer to the same driver. [`Driver::destroy`] through any clone
/// destroys it for all of them.
#[derive(Debug, Clone)]
pub struct Driver {
    pub(crate) node: NodeHandle,
}

node_api!(Driver);

impl Driver {
    /// Create a driver and its (empty) tree.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] if `config` has a zero timeout.
    pub fn create(status: Arc<SystemStatus>, config: DscConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let shared = Arc::new(Shared::new(status, config));
        tracing::info!(
            driver = %shared.id,
            debug_tracking = shared.debug_tracking(),
            "driver created"
        );
        Ok(Self {
            node: NodeHandle::new(shared, NodePath::Driver),
        })
    }

    pub fn id(&self) -> DriverId {
        self.node.shared.id
    }

    pub fn config(&self) -> &DscConfig {
        &self.node.shared.config
    }

    /// The system-wide status flags this driver consults.
    pub fn status(&self) -> &Arc<SystemStatus> {
        &self.node.shared.status
    }

    /// Number of live psocs.
    pub fn psoc_count(&self) -> usize {
        let tree = self.node.shared.tree.lock();
        if tree.destroyed {
            0
        } else {
            tree.psocs.len()
        }
    }

    /// Timeouts escalated so far by this tree's watchdogs and queued waits.
    ///
    /// Always zero without debug tracking. Nonzero only when escalation did
    /// not abort: firmware was down or `fatal_timeouts` is off.
    pub fn watchdog_expiries(&self) -> u64 {
        self.node.shared.watchdog_expiries()
    }

    /// Capture the whole tree under the driver lock.
    ///
    /// # Errors
    ///
    /// `Invalid(Destroyed)` once the driver is destroyed.
    pub fn snapshot(&self) -> Result<DriverSnapshot, DscError> {
        let shared = &self.node.shared;
        let tree = shared.tree.lock();
        if tree.destroyed {
            return Err(DscError::Invalid(Rejection::Destroyed));
        }
        Ok(DriverSnapshot::capture(
            shared.id,
            &tree,
            shared.debug_tracking(),
            shared.watchdog_expiries(),
            &shared.status,
        ))
    }

    /// Destroy the driver, aborting every queued transition request.
    ///
    /// # Panics
    ///
    /// Panics if psocs are still attached, operations are in flight, a
    /// transition is active, or the driver was already destroyed.
    pub fn destroy(self) {
        let shared = &self.node.shared;
        let mut tree = shared.tree.lock();
        if tree.destroyed {
            panic!("driver: destroyed twice");
        }
        if !tree.psocs.is_empty() {
            panic!("driver: destroyed with {} live psoc(s)", tree.psocs.len());
        }
        tree.driver.ops.assert_drained();
        let aborted = tree.driver.trans.teardown();
        tree.destroyed = true;
        drop(tree);

        tracing::info!(driver = %shared.id, aborted, "driver destroyed");
    }
}
