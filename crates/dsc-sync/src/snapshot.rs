//! # Tree Snapshots
//!
//! A point-in-time, serializable view of one driver tree, taken atomically
//! under the driver lock. This is what an administrative debug surface
//! prints: which transitions hold which nodes, who is queued behind them,
//! and (with debug tracking) who has operations in flight and since when.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use dsc_core::{CommandId, DriverId, PsocId, SystemStatus, VdevId};

use crate::ops::OperationRecord;
use crate::tree::{NodePath, SyncNode, Tree};

/// Snapshot of a whole driver tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverSnapshot {
    pub id: DriverId,
    pub taken_at: DateTime<Utc>,
    pub debug_tracking: bool,
    /// Timeouts escalated without aborting, since the driver was created.
    pub watchdog_expiries: u64,
    pub recovering: bool,
    pub unloading: bool,
    pub firmware_down: bool,
    pub node: NodeSnapshot,
    pub psocs: Vec<PsocSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PsocSnapshot {
    pub id: PsocId,
    pub node: NodeSnapshot,
    pub vdevs: Vec<VdevSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VdevSnapshot {
    pub id: VdevId,
    pub node: NodeSnapshot,
    pub cached_command: Option<CommandId>,
}

/// Tracker state of a single node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub active_transition: Option<String>,
    pub active_since: Option<DateTime<Utc>>,
    /// Queued transition descriptions, head first.
    pub queued_transitions: Vec<String>,
    pub op_count: usize,
    /// Empty unless debug tracking is enabled.
    pub operations: Vec<OperationSnapshot>,
}

/// One in-flight operation, as recorded by debug tracking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationSnapshot {
    pub id: u64,
    /// `file:line:column` of the `op_start` call.
    pub caller: String,
    pub thread: String,
    pub started_at: DateTime<Utc>,
}

impl NodeSnapshot {
    /// Whether the node is idle: nothing active, queued or in flight.
    pub fn is_idle(&self) -> bool {
        self.active_transition.is_none() && self.queued_transitions.is_empty() && self.op_count == 0
    }

    fn capture(node: &SyncNode) -> Self {
        Self {
            active_transition: node.trans.active_label().map(str::to_string),
            active_since: node.trans.active_since(),
            queued_transitions: node
                .trans
                .queued_labels()
                .into_iter()
                .map(str::to_string)
                .collect(),
            op_count: node.ops.count(),
            operations: node.ops.records().iter().map(OperationSnapshot::from).collect(),
        }
    }
}

impl From<&OperationRecord> for OperationSnapshot {
    fn from(record: &OperationRecord) -> Self {
        Self {
            id: record.id,
            caller: record.caller.to_string(),
            thread: record.thread.clone(),
            started_at: record.started_at,
        }
    }
}

impl DriverSnapshot {
    pub(crate) fn capture(
        id: DriverId,
        tree: &Tree,
        debug_tracking: bool,
        watchdog_expiries: u64,
        status: &SystemStatus,
    ) -> Self {
        let psocs = tree
            .psocs
            .iter()
            .map(|psoc| PsocSnapshot {
                id: psoc.id,
                node: NodeSnapshot::capture(&psoc.sync),
                vdevs: psoc
                    .vdevs
                    .iter()
                    .map(|vdev| VdevSnapshot {
                        id: vdev.id,
                        node: NodeSnapshot::capture(&vdev.sync),
                        cached_command: vdev.cached_cmd,
                    })
                    .collect(),
            })
            .collect();

        Self {
            id,
            taken_at: Utc::now(),
            debug_tracking,
            watchdog_expiries,
            recovering: status.is_recovering(),
            unloading: status.is_unloading(),
            firmware_down: status.is_firmware_down(),
            node: NodeSnapshot::capture(&tree.driver),
            psocs,
        }
    }

    /// Every node in structural order, paired with its path.
    pub fn nodes(&self) -> impl Iterator<Item = (NodePath, &NodeSnapshot)> + '_ {
        std::iter::once((NodePath::Driver, &self.node)).chain(self.psocs.iter().flat_map(
            |psoc| {
                std::iter::once((NodePath::Psoc(psoc.id), &psoc.node)).chain(
                    psoc.vdevs
                        .iter()
                        .map(move |vdev| (NodePath::Vdev(psoc.id, vdev.id), &vdev.node)),
                )
            },
        ))
    }

    /// Paths of every node that currently holds an active transition.
    pub fn active_paths(&self) -> Vec<NodePath> {
        self.nodes()
            .filter(|(_, node)| node.active_transition.is_some())
            .map(|(path, _)| path)
            .collect()
    }
}
