//! # dsc-cli: Driver Synchronization Core Operator Tool
//!
//! Drives the real synchronization core from the command line, for
//! bring-up checks and for reproducing contention outside the driver.
//!
//! ## Subcommands
//!
//! - `scenario`: Run the literal admission and cascade scenarios
//! - `dump`: Build a tree and print its snapshot as JSON
//! - `stress`: Randomized multi-threaded transitions and operations
//!   checked against an external exclusion model
//!
//! ## Crate Policy
//!
//! - Argument parsing lives in `main.rs`, handlers here.
//! - Handlers return `anyhow::Result<u8>`, the process exit code.
//! - No synchronization logic here: everything goes through `dsc-sync`.

pub mod config;
pub mod dump;
pub mod fixture;
pub mod scenario;
pub mod stress;
