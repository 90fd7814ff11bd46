//! # dsc-core: Foundational Types for the Driver Synchronization Core
//!
//! This crate is the leaf of the DSC crate DAG. It defines the vocabulary
//! shared by the synchronization engine (`dsc-sync`), the operator CLI, and
//! any bus-glue or administrative layer that consumes the core.
//!
//! ## Key Design Principles
//!
//! 1. **One error type, four status classes.** [`DscError`] carries exactly
//!    the recoverable outcomes a caller can see: `Invalid` (hard reject, do
//!    not retry), `Again` (contention, retry or queue), `Aborted` (a queued
//!    wait was flushed during teardown) and `OutOfMemory`. Protocol
//!    violations are never errors; they panic.
//!
//! 2. **Newtype identifiers.** [`DriverId`], [`PsocId`], [`VdevId`] and
//!    [`CommandId`] are distinct types. A psoc id cannot be passed where a
//!    vdev id is expected.
//!
//! 3. **Explicit system context.** The process-wide "recovering",
//!    "unloading" and "firmware down" flags live in a [`SystemStatus`] that
//!    the caller hands to each driver at creation, rather than in globals.
//!
//! ## Crate Policy
//!
//! - No dependencies on other `dsc-*` crates.
//! - No `unsafe` code.
//! - No `.unwrap()` outside tests.

pub mod config;
pub mod error;
pub mod identity;
pub mod status;
pub mod system;

// Re-export primary types for ergonomic imports.
pub use config::DscConfig;
pub use error::{Blocker, ConfigError, DscError, Rejection};
pub use identity::{CommandId, DriverId, PsocId, VdevId};
pub use status::Status;
pub use system::SystemStatus;
