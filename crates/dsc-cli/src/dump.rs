//! # Dump Subcommand
//!
//! Builds a tree of the requested shape, optionally puts one node under a
//! transition and one under an operation, and prints the driver snapshot
//! as pretty JSON. Useful for checking what an administrative debug
//! surface would show for a given state.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;

use dsc_core::{DscConfig, SystemStatus};
use dsc_sync::DriverSnapshot;

use crate::fixture::TreeFixture;

/// Arguments for the `dsc dump` subcommand.
#[derive(Args, Debug)]
pub struct DumpArgs {
    /// Number of psocs under the driver.
    #[arg(long, default_value_t = 1)]
    pub psocs: usize,

    /// Number of vdevs under each psoc.
    #[arg(long, default_value_t = 1)]
    pub vdevs: usize,

    /// Start a transition on this node: `driver`, `psoc:<i>` or `vdev:<i>:<j>`.
    #[arg(long)]
    pub active: Option<String>,

    /// Start an operation on this node, same selector syntax.
    #[arg(long)]
    pub op: Option<String>,
}

/// Execute the dump subcommand.
pub fn run_dump(args: &DumpArgs, config: &DscConfig) -> Result<u8> {
    let snapshot = capture(args, config)?;
    let json = serde_json::to_string_pretty(&snapshot).context("failed to serialize snapshot")?;
    println!("{json}");
    Ok(0)
}

/// Build the tree described by `args` and snapshot it.
pub fn capture(args: &DumpArgs, config: &DscConfig) -> Result<DriverSnapshot> {
    let tree = TreeFixture::build(
        Arc::new(SystemStatus::new()),
        config.clone(),
        args.psocs,
        args.vdevs,
    )?;

    let op = match &args.op {
        Some(selector) => Some(
            tree.select(selector)?
                .op_start()
                .with_context(|| format!("operation on {selector} rejected"))?,
        ),
        None => None,
    };
    let active = match &args.active {
        Some(selector) => {
            let node = tree.select(selector)?;
            node.trans_start("dump")
                .with_context(|| format!("transition on {selector} rejected"))?;
            Some(node)
        }
        None => None,
    };

    let snapshot = tree.driver.snapshot()?;

    if let Some(node) = active {
        node.trans_stop();
    }
    drop(op);
    tree.teardown();
    Ok(snapshot)
}
