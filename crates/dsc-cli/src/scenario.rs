//! # Scenario Subcommand
//!
//! Runs the literal admission and cascade scenarios against the real core
//! and prints one PASS/FAIL line per scenario.
//!
//! - `driver-exclusion`: a driver transition rejects every descendant.
//! - `sibling-independence`: sibling vdevs transition together and defer
//!   their psoc.
//! - `cascade-order`: a driver request queued last is triggered first.
//! - `cached-command`: the vdev command slot keeps the last write.

use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{anyhow, ensure, Context, Result};
use clap::{Args, ValueEnum};
use parking_lot::Mutex;

use dsc_core::{Blocker, CommandId, DscConfig, DscError, Rejection, SystemStatus};
use dsc_sync::Node;

use crate::fixture::TreeFixture;

/// Arguments for the `dsc scenario` subcommand.
#[derive(Args, Debug)]
pub struct ScenarioArgs {
    /// Scenario to run.
    #[arg(value_enum, default_value = "all")]
    pub name: ScenarioName,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScenarioName {
    All,
    DriverExclusion,
    SiblingIndependence,
    CascadeOrder,
    CachedCommand,
}

impl ScenarioName {
    const EACH: [ScenarioName; 4] = [
        Self::DriverExclusion,
        Self::SiblingIndependence,
        Self::CascadeOrder,
        Self::CachedCommand,
    ];

    fn as_str(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::DriverExclusion => "driver-exclusion",
            Self::SiblingIndependence => "sibling-independence",
            Self::CascadeOrder => "cascade-order",
            Self::CachedCommand => "cached-command",
        }
    }

    fn run(&self, config: &DscConfig) -> Result<()> {
        match self {
            Self::All => Err(anyhow!("`all` is not a single scenario")),
            Self::DriverExclusion => driver_exclusion(config),
            Self::SiblingIndependence => sibling_independence(config),
            Self::CascadeOrder => cascade_order(config),
            Self::CachedCommand => cached_command(config),
        }
    }
}

/// Execute the scenario subcommand.
pub fn run_scenario(args: &ScenarioArgs, config: &DscConfig) -> Result<u8> {
    let selected: Vec<ScenarioName> = match args.name {
        ScenarioName::All => ScenarioName::EACH.to_vec(),
        one => vec![one],
    };

    let mut failed = 0;
    for scenario in selected {
        match scenario.run(config) {
            Ok(()) => println!("PASS  {}", scenario.as_str()),
            Err(e) => {
                failed += 1;
                println!("FAIL  {}: {e:#}", scenario.as_str());
            }
        }
    }

    Ok(if failed == 0 { 0 } else { 1 })
}

fn build(config: &DscConfig, psocs: usize, vdevs: usize) -> Result<TreeFixture> {
    TreeFixture::build(Arc::new(SystemStatus::new()), config.clone(), psocs, vdevs)
}

/// 1 driver, 2 psocs, 2 vdevs each. A driver transition is exclusive
/// against the driver itself and hard-rejects everything below it.
pub fn driver_exclusion(config: &DscConfig) -> Result<()> {
    let tree = build(config, 2, 2)?;
    let driver = &tree.driver;

    driver.trans_start("T1").context("first driver transition")?;
    ensure!(
        driver.trans_start("T2") == Err(DscError::Again(Blocker::OwnTransition)),
        "second driver transition was not deferred"
    );

    let rejected = DscError::Invalid(Rejection::DriverTransition);
    for node in tree.nodes().into_iter().skip(1) {
        let path = node.path();
        ensure!(
            node.trans_start("blocked") == Err(rejected),
            "{path}: transition not rejected under a driver transition"
        );
        ensure!(
            node.op_start().err() == Some(rejected),
            "{path}: operation not rejected under a driver transition"
        );
    }

    driver.trans_stop();
    for node in tree.nodes().into_iter().skip(1) {
        let path = node.path();
        node.op_start()
            .with_context(|| format!("{path}: operation after T1 stopped"))?
            .stop();
        node.trans_start("admitted")
            .with_context(|| format!("{path}: transition after T1 stopped"))?;
        node.trans_stop();
    }

    tree.teardown();
    Ok(())
}

/// 1 driver, 1 psoc, 2 vdevs. Sibling vdevs transition concurrently and
/// defer their psoc until both stop.
pub fn sibling_independence(config: &DscConfig) -> Result<()> {
    let tree = build(config, 1, 2)?;
    let psoc = &tree.psocs[0];
    let (v1, v2) = (&tree.vdevs[0][0], &tree.vdevs[0][1]);

    v1.trans_start("vdev-1").context("vdev-1 transition")?;
    v2.trans_start("vdev-2").context("vdev-2 transition")?;

    let deferred = Err(DscError::Again(Blocker::DescendantTransition));
    ensure!(psoc.trans_start("psoc") == deferred, "psoc not deferred by two vdevs");
    v1.trans_stop();
    ensure!(psoc.trans_start("psoc") == deferred, "psoc not deferred by vdev-2");
    v2.trans_stop();

    psoc.trans_start("psoc").context("psoc transition once vdevs stopped")?;
    psoc.trans_stop();

    tree.teardown();
    Ok(())
}

/// Thread A holds operations on the driver, the psoc and the vdev plus a
/// vdev transition. B, C and D then queue transition requests on the vdev,
/// the psoc and the driver, in that order. Once A lets go, the requests
/// run top-down: D first, then C, then B.
pub fn cascade_order(config: &DscConfig) -> Result<()> {
    let tree = build(config, 1, 1)?;
    let order = cascade_order_on(&tree)?;
    ensure!(
        order == ["driver", "psoc", "vdev"],
        "transitions ran in order {order:?}"
    );
    tree.teardown();
    Ok(())
}

/// The order in which the queued driver, psoc and vdev requests ran.
fn cascade_order_on(tree: &TreeFixture) -> Result<Vec<&'static str>> {
    let driver = &tree.driver;
    let psoc = &tree.psocs[0];
    let vdev = &tree.vdevs[0][0];
    let order = Mutex::new(Vec::new());

    thread::scope(|s| -> Result<()> {
        let (ready_tx, ready_rx) = mpsc::channel::<()>();
        let (release_tx, release_rx) = mpsc::channel::<()>();

        let holder = s.spawn(move || -> Result<()> {
            let ops = [driver.op_start()?, psoc.op_start()?, vdev.op_start()?];
            vdev.trans_start("recovery")?;
            ready_tx.send(())?;
            let released = release_rx.recv();
            drop(ops);
            vdev.trans_stop();
            Ok(released?)
        });
        ready_rx.recv().context("holder thread exited early")?;

        let b = s.spawn(queued_transition("vdev", vdev, &order));
        wait_until(|| vdev.is_trans_queued(), "vdev request queued")?;
        let c = s.spawn(queued_transition("psoc", psoc, &order));
        wait_until(|| psoc.is_trans_queued(), "psoc request queued")?;
        let d = s.spawn(queued_transition("driver", driver, &order));
        wait_until(|| driver.is_trans_queued(), "driver request queued")?;

        release_tx.send(())?;
        for handle in [holder, b, c, d] {
            handle
                .join()
                .map_err(|_| anyhow!("scenario thread panicked"))??;
        }
        Ok(())
    })?;

    Ok(order.into_inner())
}

/// Queue a transition on `node`, record when it runs, drain and stop.
fn queued_transition<'a>(
    desc: &'static str,
    node: &'a dyn Node,
    order: &'a Mutex<Vec<&'static str>>,
) -> impl FnOnce() -> Result<()> + Send + 'a {
    move || {
        node.trans_start_wait(desc)?;
        order.lock().push(desc);
        node.wait_for_ops();
        node.trans_stop();
        Ok(())
    }
}

fn wait_until(mut condition: impl FnMut() -> bool, what: &str) -> Result<()> {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        ensure!(Instant::now() < deadline, "timed out waiting for {what}");
        thread::sleep(Duration::from_millis(1));
    }
    Ok(())
}

/// Two commands cached before replay: the slot keeps only the second.
pub fn cached_command(config: &DscConfig) -> Result<()> {
    let tree = build(config, 1, 1)?;
    let vdev = &tree.vdevs[0][0];

    vdev.cache_command(CommandId::new(5));
    vdev.cache_command(CommandId::new(7));
    let cached = vdev.get_cached_cmd();
    ensure!(
        cached == Some(CommandId::new(7)),
        "cached command is {cached:?}, expected cmd-7"
    );

    tree.teardown();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_scenario_passes_in_release_mode() {
        for scenario in ScenarioName::EACH {
            scenario.run(&DscConfig::release()).unwrap();
        }
    }

    #[test]
    fn every_scenario_passes_with_debug_tracking() {
        for scenario in ScenarioName::EACH {
            scenario.run(&DscConfig::debug()).unwrap();
        }
    }

    #[test]
    fn run_scenario_reports_success() {
        let args = ScenarioArgs {
            name: ScenarioName::All,
        };
        assert_eq!(run_scenario(&args, &DscConfig::release()).unwrap(), 0);
    }

    #[test]
    fn all_is_not_runnable_on_its_own() {
        assert!(ScenarioName::All.run(&DscConfig::release()).is_err());
    }
}
