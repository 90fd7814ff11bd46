//! # dsc-sync: Driver Synchronization Core
//!
//! Coordinates two kinds of activity across a driver → psoc → vdev tree:
//!
//! - **Transitions**: exclusive, named mode changes (attach, reset,
//!   recovery). At most one is active per node, later requests queue FIFO.
//! - **Operations**: concurrent, counted units of in-flight work, blocked
//!   only by an active transition on the node or an ancestor.
//!
//! A transition anywhere blocks same-level and ancestor activity and blocks
//! or defers descendant activity. Sibling subtrees stay independent.
//!
//! ## Architecture
//!
//! ```text
//!   Driver / Psoc / Vdev        cloneable handles (node_api!)
//!           │
//!       NodeHandle ──────────── policy (admission table)
//!           │                   cascade (top-down trigger after stop)
//!   Mutex<Tree>  (one per driver)
//!           │
//!   SyncNode = TransitionTracker + OperationTracker
//!                   │                    │
//!            PendingTransition        OperationRecord ── Watchdog
//!                   └───── Event ────────┘
//! ```
//!
//! Only [`Driver::trans_start_wait`] (and its psoc/vdev twins) and
//! `wait_for_ops` block, and neither holds the driver lock while blocked.
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use dsc_core::{DscConfig, DscError, Rejection, SystemStatus};
//! use dsc_sync::{Driver, Psoc, Vdev};
//!
//! let driver = Driver::create(Arc::new(SystemStatus::new()), DscConfig::release()).unwrap();
//! let psoc = Psoc::create(&driver).unwrap();
//! let vdev = Vdev::create(&psoc).unwrap();
//!
//! driver.trans_start("reset").unwrap();
//! assert_eq!(
//!     vdev.op_start().unwrap_err(),
//!     DscError::Invalid(Rejection::DriverTransition)
//! );
//! driver.trans_stop();
//!
//! let op = vdev.op_start().unwrap();
//! op.stop();
//!
//! vdev.destroy();
//! psoc.destroy();
//! driver.destroy();
//! ```

mod cascade;
mod event;
mod node;
mod ops;
mod policy;
mod transition;
mod tree;
mod watchdog;

pub mod driver;
pub mod guard;
pub mod psoc;
pub mod snapshot;
pub mod vdev;

pub use driver::Driver;
pub use guard::OpGuard;
pub use node::Node;
pub use psoc::Psoc;
pub use snapshot::{DriverSnapshot, NodeSnapshot, OperationSnapshot, PsocSnapshot, VdevSnapshot};
pub use tree::NodePath;
pub use vdev::Vdev;
