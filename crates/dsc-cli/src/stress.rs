//! # Stress Subcommand
//!
//! Hammers one tree from several threads with random transitions (both
//! non-blocking and queued) and random operations, and checks every
//! admission against an external model of who holds what.
//!
//! The model is updated only inside the windows where the core has
//! admitted a holder (after start, before stop). Operations also carry a
//! ticket taken before admission, so a transition that legally started
//! after an operation was admitted is not mistaken for an overlap.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use anyhow::{anyhow, ensure, Result};
use clap::Args;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use dsc_core::{DscConfig, DscError, SystemStatus};
use dsc_sync::{Node, NodePath};

use crate::fixture::TreeFixture;

/// Arguments for the `dsc stress` subcommand.
#[derive(Args, Debug)]
pub struct StressArgs {
    /// Worker threads.
    #[arg(long, default_value_t = 8)]
    pub threads: usize,

    /// Actions per worker thread.
    #[arg(long, default_value_t = 1000)]
    pub iterations: usize,

    /// Number of psocs under the driver.
    #[arg(long, default_value_t = 2)]
    pub psocs: usize,

    /// Number of vdevs under each psoc.
    #[arg(long, default_value_t = 2)]
    pub vdevs: usize,

    /// RNG seed; worker `i` uses `seed + i`. Random when omitted.
    #[arg(long)]
    pub seed: Option<u64>,
}

/// Outcome counts of one stress run.
#[derive(Debug, Default, Serialize)]
pub struct StressReport {
    pub seed: u64,
    pub transitions: u64,
    pub queued_transitions: u64,
    pub operations: u64,
    pub deferred: u64,
    pub rejected: u64,
    pub violations: Vec<String>,
}

#[derive(Debug, Default)]
struct Counters {
    transitions: AtomicU64,
    queued_transitions: AtomicU64,
    operations: AtomicU64,
    deferred: AtomicU64,
    rejected: AtomicU64,
}

impl Counters {
    fn refused(&self, err: DscError) -> Result<()> {
        match err {
            DscError::Again(_) => self.deferred.fetch_add(1, Ordering::Relaxed),
            DscError::Invalid(_) => self.rejected.fetch_add(1, Ordering::Relaxed),
            other => return Err(anyhow!("unexpected refusal: {other}")),
        };
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Hold {
    /// Clock reading when the transition was recorded.
    transition_since: Option<u64>,
    ops: usize,
}

#[derive(Debug, Default)]
struct Holds {
    clock: u64,
    nodes: HashMap<NodePath, Hold>,
}

impl Holds {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }
}

/// External model of admitted transitions and operations.
///
/// Operations take a ticket before asking the core for admission. A
/// transition recorded before that ticket was already held when the
/// operation was admitted, so it must have blocked it.
#[derive(Debug, Default)]
pub struct ExclusionChecker {
    holds: Mutex<Holds>,
    violations: Mutex<Vec<String>>,
}

impl ExclusionChecker {
    pub fn new() -> Self {
        Self::default()
    }

    fn violation(&self, message: String) {
        tracing::error!(%message, "exclusion violation");
        self.violations.lock().push(message);
    }

    /// Record an admitted transition on `path`.
    pub fn transition_started(&self, path: NodePath) {
        let mut holds = self.holds.lock();
        for (other, hold) in &holds.nodes {
            if hold.transition_since.is_some() && other.is_related_to(&path) {
                self.violation(format!("{path}: transition admitted while {other} holds one"));
            }
        }
        let now = holds.tick();
        holds.nodes.entry(path).or_default().transition_since = Some(now);
    }

    /// Check that `path` has no operation in flight after a drain.
    pub fn drained(&self, path: NodePath) {
        let ops = self.holds.lock().nodes.get(&path).map_or(0, |h| h.ops);
        if ops != 0 {
            self.violation(format!("{path}: {ops} operation(s) in flight after drain"));
        }
    }

    pub fn transition_stopping(&self, path: NodePath) {
        self.holds.lock().nodes.entry(path).or_default().transition_since = None;
    }

    /// Take a ticket ahead of an operation admission attempt.
    pub fn ticket(&self) -> u64 {
        self.holds.lock().tick()
    }

    /// Record an operation on `path` admitted after `ticket` was taken.
    pub fn op_started(&self, path: NodePath, ticket: u64) {
        let mut holds = self.holds.lock();
        for (other, hold) in &holds.nodes {
            let blocking = *other == path || other.is_ancestor_of(&path);
            if blocking && hold.transition_since.is_some_and(|since| since < ticket) {
                self.violation(format!(
                    "{path}: operation admitted while {other} holds a transition"
                ));
            }
        }
        holds.nodes.entry(path).or_default().ops += 1;
    }

    pub fn op_stopping(&self, path: NodePath) {
        if let Some(hold) = self.holds.lock().nodes.get_mut(&path) {
            hold.ops = hold.ops.saturating_sub(1);
        }
    }

    pub fn violations(&self) -> Vec<String> {
        self.violations.lock().clone()
    }
}

/// Execute the stress subcommand.
pub fn run_stress(args: &StressArgs, config: &DscConfig) -> Result<u8> {
    let report = stress(args, config)?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    if report.violations.is_empty() {
        Ok(0)
    } else {
        Ok(1)
    }
}

/// Run the stress exercise and tear the tree down afterwards.
pub fn stress(args: &StressArgs, config: &DscConfig) -> Result<StressReport> {
    ensure!(args.threads > 0, "--threads must be at least 1");
    let seed = args.seed.unwrap_or_else(rand::random);
    let tree = TreeFixture::build(
        Arc::new(SystemStatus::new()),
        config.clone(),
        args.psocs,
        args.vdevs,
    )?;
    let nodes = tree.nodes();
    let checker = ExclusionChecker::new();
    let counters = Counters::default();

    tracing::info!(
        seed,
        threads = args.threads,
        iterations = args.iterations,
        nodes = nodes.len(),
        "stress run starting"
    );

    thread::scope(|s| -> Result<()> {
        let workers: Vec<_> = (0..args.threads as u64)
            .map(|i| {
                let mut rng = StdRng::seed_from_u64(seed.wrapping_add(i));
                let (nodes, checker, counters) = (&nodes, &checker, &counters);
                s.spawn(move || -> Result<()> {
                    for _ in 0..args.iterations {
                        let node = nodes[rng.gen_range(0..nodes.len())];
                        match rng.gen_range(0..3) {
                            0 => operation(node, checker, counters)?,
                            1 => transition(node, false, checker, counters)?,
                            _ => transition(node, true, checker, counters)?,
                        }
                    }
                    Ok(())
                })
            })
            .collect();

        for worker in workers {
            worker.join().map_err(|_| anyhow!("stress worker panicked"))??;
        }
        Ok(())
    })?;

    let leftover = tree.active_paths();
    ensure!(leftover.is_empty(), "transitions still active after the run: {leftover:?}");
    drop(nodes);
    tree.teardown();

    let report = StressReport {
        seed,
        transitions: counters.transitions.into_inner(),
        queued_transitions: counters.queued_transitions.into_inner(),
        operations: counters.operations.into_inner(),
        deferred: counters.deferred.into_inner(),
        rejected: counters.rejected.into_inner(),
        violations: checker.violations(),
    };
    tracing::info!(
        transitions = report.transitions,
        operations = report.operations,
        violations = report.violations.len(),
        "stress run finished"
    );
    Ok(report)
}

fn operation(node: &dyn Node, checker: &ExclusionChecker, counters: &Counters) -> Result<()> {
    let ticket = checker.ticket();
    let guard = match node.op_start() {
        Ok(guard) => guard,
        Err(err) => return counters.refused(err),
    };
    checker.op_started(node.path(), ticket);
    thread::yield_now();
    checker.op_stopping(node.path());
    node.op_stop(guard);
    counters.operations.fetch_add(1, Ordering::Relaxed);
    Ok(())
}

fn transition(
    node: &dyn Node,
    queue: bool,
    checker: &ExclusionChecker,
    counters: &Counters,
) -> Result<()> {
    let admitted = if queue {
        node.trans_start_wait("stress-queued")
    } else {
        node.trans_start("stress")
    };
    if let Err(err) = admitted {
        return counters.refused(err);
    }

    let path = node.path();
    checker.transition_started(path);
    node.assert_trans_protected();
    node.wait_for_ops();
    checker.drained(path);
    thread::yield_now();
    checker.transition_stopping(path);
    node.trans_stop();

    let counter = if queue {
        &counters.queued_transitions
    } else {
        &counters.transitions
    };
    counter.fetch_add(1, Ordering::Relaxed);
    Ok(())
}
