//! # Synchronization Tree
//!
//! All bookkeeping for one driver and every descendant psoc and vdev lives
//! in a single [`Tree`] behind a single lock ([`Shared::tree`]). Cross-level
//! admission needs to observe ancestor and descendant state together, so the
//! lock is deliberately not sharded per node.
//!
//! Ownership runs strictly downwards: the driver's psoc list owns the psocs,
//! each psoc's vdev list owns its vdevs. Upward relations are
//! [`NodePath`]s, plain identifiers resolved against the tree under the
//! lock, never a second owner.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use dsc_core::{CommandId, DriverId, DscConfig, PsocId, SystemStatus, VdevId};

use crate::ops::OperationTracker;
use crate::transition::TransitionTracker;
use crate::watchdog::Diagnostics;

/// Location of a node within its driver tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodePath {
    /// The driver itself.
    Driver,
    /// A psoc directly under the driver.
    Psoc(PsocId),
    /// A vdev under the given psoc.
    Vdev(PsocId, VdevId),
}

impl NodePath {
    /// The enclosing node, `None` for the driver.
    pub fn parent(&self) -> Option<NodePath> {
        match *self {
            Self::Driver => None,
            Self::Psoc(_) => Some(Self::Driver),
            Self::Vdev(psoc, _) => Some(Self::Psoc(psoc)),
        }
    }

    /// Whether `self` is a strict ancestor of `other`.
    pub fn is_ancestor_of(&self, other: &NodePath) -> bool {
        let mut cursor = other.parent();
        while let Some(path) = cursor {
            if path == *self {
                return true;
            }
            cursor = path.parent();
        }
        false
    }

    /// Whether one of the two is an ancestor of the other, or they are equal.
    pub fn is_related_to(&self, other: &NodePath) -> bool {
        self == other || self.is_ancestor_of(other) || other.is_ancestor_of(self)
    }
}

impl std::fmt::Display for NodePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Driver => f.write_str("driver"),
            Self::Psoc(psoc) => write!(f, "{psoc}"),
            Self::Vdev(psoc, vdev) => write!(f, "{psoc}/{vdev}"),
        }
    }
}

/// The tracker pair embedded in every node.
#[derive(Debug)]
pub(crate) struct SyncNode {
    pub(crate) trans: TransitionTracker,
    pub(crate) ops: OperationTracker,
}

impl SyncNode {
    fn new(name: String, diagnostics: &Option<Diagnostics>) -> Self {
        Self {
            trans: TransitionTracker::new(name.clone(), diagnostics.clone()),
            ops: OperationTracker::new(name, diagnostics.clone()),
        }
    }
}

#[derive(Debug)]
pub(crate) struct PsocNode {
    pub(crate) id: PsocId,
    pub(crate) sync: SyncNode,
    pub(crate) vdevs: Vec<VdevNode>,
}

impl PsocNode {
    pub(crate) fn any_vdev_active(&self) -> bool {
        self.vdevs.iter().any(|v| v.sync.trans.is_active())
    }

    pub(crate) fn vdev(&self, id: VdevId) -> Option<&VdevNode> {
        self.vdevs.iter().find(|v| v.id == id)
    }
}

#[derive(Debug)]
pub(crate) struct VdevNode {
    pub(crate) id: VdevId,
    pub(crate) sync: SyncNode,
    pub(crate) cached_cmd: Option<CommandId>,
}

/// Every piece of bookkeeping for one driver tree.
#[derive(Debug)]
pub(crate) struct Tree {
    pub(crate) driver: SyncNode,
    pub(crate) psocs: Vec<PsocNode>,
    pub(crate) destroyed: bool,
}

impl Tree {
    pub(crate) fn psoc(&self, id: PsocId) -> Option<&PsocNode> {
        self.psocs.iter().find(|p| p.id == id)
    }

    pub(crate) fn psoc_mut(&mut self, id: PsocId) -> Option<&mut PsocNode> {
        self.psocs.iter_mut().find(|p| p.id == id)
    }

    pub(crate) fn vdev_mut(&mut self, psoc: PsocId, vdev: VdevId) -> Option<&mut VdevNode> {
        self.psoc_mut(psoc)?.vdevs.iter_mut().find(|v| v.id == vdev)
    }

    /// Whether any psoc or vdev has an active transition.
    pub(crate) fn any_descendant_active(&self) -> bool {
        self.psocs
            .iter()
            .any(|p| p.sync.trans.is_active() || p.any_vdev_active())
    }

    /// Resolve a path to its tracker pair. `None` once the node is destroyed.
    pub(crate) fn node(&self, path: NodePath) -> Option<&SyncNode> {
        if self.destroyed {
            return None;
        }
        match path {
            NodePath::Driver => Some(&self.driver),
            NodePath::Psoc(psoc) => self.psoc(psoc).map(|p| &p.sync),
            NodePath::Vdev(psoc, vdev) => self.psoc(psoc)?.vdev(vdev).map(|v| &v.sync),
        }
    }

    pub(crate) fn node_mut(&mut self, path: NodePath) -> Option<&mut SyncNode> {
        if self.destroyed {
            return None;
        }
        match path {
            NodePath::Driver => Some(&mut self.driver),
            NodePath::Psoc(psoc) => self.psoc_mut(psoc).map(|p| &mut p.sync),
            NodePath::Vdev(psoc, vdev) => self.vdev_mut(psoc, vdev).map(|v| &mut v.sync),
        }
    }
}

/// State shared by every handle into one driver tree.
#[derive(Debug)]
pub(crate) struct Shared {
    pub(crate) id: DriverId,
    pub(crate) status: Arc<SystemStatus>,
    pub(crate) config: DscConfig,
    pub(crate) diagnostics: Option<Diagnostics>,
    pub(crate) tree: Mutex<Tree>,
    next_node: AtomicU32,
    next_op: AtomicU64,
}

impl Shared {
    pub(crate) fn new(status: Arc<SystemStatus>, config: DscConfig) -> Self {
        let diagnostics = Diagnostics::from_config(&config, &status);
        let tree = Tree {
            driver: SyncNode::new("driver".to_string(), &diagnostics),
            psocs: Vec::new(),
            destroyed: false,
        };
        Self {
            id: DriverId::new(),
            status,
            config,
            diagnostics,
            tree: Mutex::new(tree),
            next_node: AtomicU32::new(0),
            next_op: AtomicU64::new(0),
        }
    }

    pub(crate) fn debug_tracking(&self) -> bool {
        self.diagnostics.is_some()
    }

    /// Watchdog and queued-wait expiries escalated in this tree.
    pub(crate) fn watchdog_expiries(&self) -> u64 {
        self.diagnostics
            .as_ref()
            .map_or(0, |diag| diag.escalation.expiries())
    }

    pub(crate) fn next_node_id(&self) -> u32 {
        self.next_node.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn next_op_id(&self) -> u64 {
        self.next_op.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn new_psoc(&self, id: PsocId) -> PsocNode {
        PsocNode {
            id,
            sync: SyncNode::new(NodePath::Psoc(id).to_string(), &self.diagnostics),
            vdevs: Vec::new(),
        }
    }

    pub(crate) fn new_vdev(&self, psoc: PsocId, id: VdevId) -> VdevNode {
        VdevNode {
            id,
            sync: SyncNode::new(NodePath::Vdev(psoc, id).to_string(), &self.diagnostics),
            cached_cmd: None,
        }
    }
}

#[cfg(test)]
impl Shared {
    /// A release-mode tree with `psocs` psocs of `vdevs` vdevs each.
    pub(crate) fn with_shape(psocs: u32, vdevs: u32) -> Self {
        let shared = Self::new(Arc::new(SystemStatus::new()), DscConfig::release());
        {
            let mut tree = shared.tree.lock();
            for _ in 0..psocs {
                let pid = PsocId::from_raw(shared.next_node_id());
                let mut psoc = shared.new_psoc(pid);
                for _ in 0..vdevs {
                    let vid = VdevId::from_raw(shared.next_node_id());
                    psoc.vdevs.push(shared.new_vdev(pid, vid));
                }
                tree.psocs.push(psoc);
            }
        }
        shared
    }
}
