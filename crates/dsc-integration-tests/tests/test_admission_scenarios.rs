//! # Admission Scenarios
//!
//! The four literal scenarios a driver relies on, run against real handles:
//!
//! 1. A driver transition is exclusive and hard-rejects every descendant.
//! 2. Sibling vdevs transition independently and defer their psoc.
//! 3. Queued requests on a vdev, its psoc and the driver run top-down once
//!    the blocking holder lets go, regardless of queueing order.
//! 4. The vdev command slot keeps only the last cached command.

use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use dsc_core::{Blocker, CommandId, DscConfig, DscError, Rejection, SystemStatus};
use dsc_sync::{Driver, Node, Psoc, Vdev};
use parking_lot::Mutex;

fn tree(config: DscConfig, psocs: usize, vdevs: usize) -> (Driver, Vec<Psoc>, Vec<Vec<Vdev>>) {
    let driver = Driver::create(Arc::new(SystemStatus::new()), config).unwrap();
    let mut ps = Vec::new();
    let mut vs = Vec::new();
    for _ in 0..psocs {
        let psoc = Psoc::create(&driver).unwrap();
        vs.push((0..vdevs).map(|_| Vdev::create(&psoc).unwrap()).collect());
        ps.push(psoc);
    }
    (driver, ps, vs)
}

fn teardown(driver: Driver, psocs: Vec<Psoc>, vdevs: Vec<Vec<Vdev>>) {
    for (psoc, children) in psocs.into_iter().zip(vdevs) {
        children.into_iter().for_each(Vdev::destroy);
        psoc.destroy();
    }
    driver.destroy();
}

fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "condition not reached within 5s");
        thread::sleep(Duration::from_millis(1));
    }
}

// ---------------------------------------------------------------------------
// 1. Driver exclusion
// ---------------------------------------------------------------------------

#[test]
fn driver_transition_excludes_the_whole_tree() {
    let (driver, psocs, vdevs) = tree(DscConfig::release(), 2, 2);

    driver.trans_start("T1").unwrap();
    assert_eq!(
        driver.trans_start("T2"),
        Err(DscError::Again(Blocker::OwnTransition))
    );
    assert_eq!(
        driver.op_start().unwrap_err(),
        DscError::Again(Blocker::OwnTransition)
    );

    let rejected = DscError::Invalid(Rejection::DriverTransition);
    for psoc in &psocs {
        assert_eq!(psoc.trans_start("p"), Err(rejected));
        assert_eq!(psoc.trans_start_wait("p"), Err(rejected));
        assert_eq!(psoc.op_start().unwrap_err(), rejected);
    }
    for vdev in vdevs.iter().flatten() {
        assert_eq!(vdev.trans_start("v"), Err(rejected));
        assert_eq!(vdev.trans_start_wait("v"), Err(rejected));
        assert_eq!(vdev.op_start().unwrap_err(), rejected);
    }
    // Hard rejections never leave a queued request behind.
    assert!(psocs.iter().all(|p| !p.is_trans_queued()));
    assert!(vdevs.iter().flatten().all(|v| !v.is_trans_queued()));

    driver.trans_stop();
    for psoc in &psocs {
        psoc.op_start().unwrap().stop();
    }
    for vdev in vdevs.iter().flatten() {
        vdev.trans_start("v").unwrap();
        vdev.trans_stop();
    }

    teardown(driver, psocs, vdevs);
}

#[test]
fn queued_driver_request_hard_rejects_new_descendant_transitions() {
    let (driver, psocs, vdevs) = tree(DscConfig::release(), 1, 1);
    let vdev = &vdevs[0][0];

    vdev.trans_start("busy").unwrap();
    thread::scope(|s| {
        let waiter = s.spawn(|| driver.trans_start_wait("reset"));
        wait_until(|| driver.is_trans_queued());

        assert_eq!(
            psocs[0].trans_start("p"),
            Err(DscError::Invalid(Rejection::DriverTransition))
        );
        // Operations only look at active transitions.
        psocs[0].op_start().unwrap().stop();

        vdev.trans_stop();
        waiter.join().unwrap().unwrap();
        assert_eq!(driver.active_transition(), Some("reset"));
        driver.trans_stop();
    });

    teardown(driver, psocs, vdevs);
}

// ---------------------------------------------------------------------------
// 2. Sibling independence
// ---------------------------------------------------------------------------

#[test]
fn sibling_vdevs_transition_together_and_defer_their_psoc() {
    let (driver, psocs, vdevs) = tree(DscConfig::release(), 1, 2);
    let (v1, v2) = (&vdevs[0][0], &vdevs[0][1]);
    let psoc = &psocs[0];

    v1.trans_start("v1").unwrap();
    v2.trans_start("v2").unwrap();
    // Operations on a sibling's parent are unaffected.
    psoc.op_start().unwrap().stop();

    let deferred = Err(DscError::Again(Blocker::DescendantTransition));
    assert_eq!(psoc.trans_start("P"), deferred);
    v1.trans_stop();
    assert_eq!(psoc.trans_start("P"), deferred);
    assert_eq!(driver.trans_start("D"), deferred);
    v2.trans_stop();

    psoc.trans_start("P").unwrap();
    psoc.trans_stop();

    teardown(driver, psocs, vdevs);
}

#[test]
fn activity_under_one_psoc_leaves_the_other_alone() {
    let (driver, psocs, vdevs) = tree(DscConfig::release(), 2, 1);

    psocs[0].trans_start("reset").unwrap();
    assert_eq!(
        vdevs[0][0].op_start().unwrap_err(),
        DscError::Invalid(Rejection::PsocTransition)
    );

    psocs[1].trans_start("attach").unwrap();
    psocs[1].trans_stop();
    vdevs[1][0].trans_start("attach").unwrap();
    assert_eq!(
        vdevs[1][0].op_start().unwrap_err(),
        DscError::Again(Blocker::OwnTransition)
    );
    vdevs[1][0].trans_stop();
    vdevs[1][0].op_start().unwrap().stop();

    psocs[0].trans_stop();
    teardown(driver, psocs, vdevs);
}

// ---------------------------------------------------------------------------
// 3. Cascade order
// ---------------------------------------------------------------------------

fn cascade_order(config: DscConfig) -> Vec<&'static str> {
    let (driver, psocs, vdevs) = tree(config, 1, 1);
    let order = Mutex::new(Vec::new());

    {
        let nodes: [(&'static str, &dyn Node); 3] = [
            ("vdev", &vdevs[0][0]),
            ("psoc", &psocs[0]),
            ("driver", &driver),
        ];
        let (d, p, v) = (&driver, &psocs[0], &vdevs[0][0]);

        thread::scope(|s| {
            let (ready_tx, ready_rx) = mpsc::channel();
            let (release_tx, release_rx) = mpsc::channel::<()>();

            // Thread A: operations on every level plus a vdev transition.
            let holder = s.spawn(move || {
                let ops = [d.op_start().unwrap(), p.op_start().unwrap(), v.op_start().unwrap()];
                v.trans_start("recovery").unwrap();
                ready_tx.send(()).unwrap();
                release_rx.recv().unwrap();
                drop(ops);
                v.trans_stop();
            });
            ready_rx.recv().unwrap();

            // B, C and D queue on the vdev, the psoc and the driver, in order.
            let mut waiters = Vec::new();
            for (label, node) in nodes {
                let order = &order;
                waiters.push(s.spawn(move || {
                    node.trans_start_wait(label).unwrap();
                    order.lock().push(label);
                    node.wait_for_ops();
                    node.trans_stop();
                }));
                wait_until(|| node.is_trans_queued());
            }

            release_tx.send(()).unwrap();
            holder.join().unwrap();
            for waiter in waiters {
                waiter.join().unwrap();
            }
        });
    }

    teardown(driver, psocs, vdevs);
    order.into_inner()
}

#[test]
fn cascade_runs_queued_requests_top_down() {
    assert_eq!(cascade_order(DscConfig::release()), ["driver", "psoc", "vdev"]);
}

#[test]
fn cascade_order_holds_with_debug_tracking() {
    assert_eq!(cascade_order(DscConfig::debug()), ["driver", "psoc", "vdev"]);
}

#[test]
fn cli_scenarios_agree() {
    for config in [DscConfig::release(), DscConfig::debug()] {
        dsc_cli::scenario::driver_exclusion(&config).unwrap();
        dsc_cli::scenario::sibling_independence(&config).unwrap();
        dsc_cli::scenario::cascade_order(&config).unwrap();
        dsc_cli::scenario::cached_command(&config).unwrap();
    }
}

// ---------------------------------------------------------------------------
// 4. Cached command
// ---------------------------------------------------------------------------

#[test]
fn cached_command_keeps_the_last_write() {
    let (driver, psocs, vdevs) = tree(DscConfig::release(), 1, 1);
    let vdev = &vdevs[0][0];

    assert_eq!(vdev.get_cached_cmd(), None);
    vdev.cache_command(CommandId::new(5));
    vdev.cache_command(CommandId::new(7));
    assert_eq!(vdev.get_cached_cmd(), Some(CommandId::new(7)));
    // Reading does not clear the slot; replay takes it.
    assert_eq!(vdev.get_cached_cmd(), Some(CommandId::new(7)));
    assert_eq!(vdev.take_cached_cmd(), Some(CommandId::new(7)));
    assert_eq!(vdev.get_cached_cmd(), None);

    teardown(driver, psocs, vdevs);
}
