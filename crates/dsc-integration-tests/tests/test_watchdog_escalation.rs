//! # Watchdog Escalation
//!
//! Drives each debug timeout through the node API with millisecond bounds:
//! a stuck transition, a queued wait past its bound and an operation held
//! past its bound. Expiries are non-fatal here (`fatal_timeouts: false`, or
//! firmware down), so they are observed through the driver's expiry count.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use dsc_core::{DscConfig, SystemStatus};
use dsc_sync::{Driver, Psoc, Vdev};

const LONG_MS: u64 = 60_000;

fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "condition not reached within 5s");
        thread::sleep(Duration::from_millis(1));
    }
}

/// Debug config with the given bounds in milliseconds, logging expiries only.
fn bounds(transition_ms: u64, wait_ms: u64, op_ms: u64) -> DscConfig {
    DscConfig {
        debug_tracking: true,
        transition_timeout_ms: transition_ms,
        wait_timeout_ms: wait_ms,
        op_timeout_ms: op_ms,
        fatal_timeouts: false,
    }
}

fn tree(status: Arc<SystemStatus>, config: DscConfig) -> (Driver, Psoc, Vdev) {
    let driver = Driver::create(status, config).unwrap();
    let psoc = Psoc::create(&driver).unwrap();
    let vdev = Vdev::create(&psoc).unwrap();
    (driver, psoc, vdev)
}

fn teardown((driver, psoc, vdev): (Driver, Psoc, Vdev)) {
    vdev.destroy();
    psoc.destroy();
    driver.destroy();
}

// ---------------------------------------------------------------------------
// Queued waits
// ---------------------------------------------------------------------------

#[test]
fn queued_wait_past_its_bound_still_completes() {
    let t = tree(Arc::new(SystemStatus::new()), bounds(LONG_MS, 5, LONG_MS));
    let psoc = &t.1;

    psoc.trans_start("hold").unwrap();
    thread::scope(|s| {
        let waiter = s.spawn(|| psoc.trans_start_wait("late"));
        wait_until(|| psoc.is_trans_queued());

        // Each expired bound is escalated and the wait goes on.
        wait_until(|| t.0.watchdog_expiries() >= 2);
        assert!(!waiter.is_finished());
        assert_eq!(psoc.queued_transitions(), ["late"]);

        psoc.trans_stop();
        assert_eq!(waiter.join().unwrap(), Ok(()));
    });

    assert_eq!(psoc.active_transition(), Some("late"));
    psoc.trans_stop();
    teardown(t);
}

// ---------------------------------------------------------------------------
// Held transitions and operations
// ---------------------------------------------------------------------------

#[test]
fn stuck_transition_expires_once() {
    let t = tree(Arc::new(SystemStatus::new()), bounds(5, LONG_MS, LONG_MS));
    let psoc = &t.1;

    psoc.trans_start("stuck").unwrap();
    wait_until(|| t.0.watchdog_expiries() == 1);
    thread::sleep(Duration::from_millis(30));
    assert_eq!(t.0.watchdog_expiries(), 1);

    // Expiry is diagnostic only; the transition is still held.
    assert_eq!(psoc.active_transition(), Some("stuck"));
    assert_eq!(t.0.snapshot().unwrap().watchdog_expiries, 1);
    psoc.trans_stop();
    teardown(t);
}

#[test]
fn held_operations_expire_individually() {
    let t = tree(Arc::new(SystemStatus::new()), bounds(LONG_MS, LONG_MS, 5));
    let vdev = &t.2;

    let guards = [vdev.op_start().unwrap(), vdev.op_start().unwrap()];
    wait_until(|| t.0.watchdog_expiries() == 2);
    assert_eq!(vdev.op_count(), 2);

    drop(guards);
    assert_eq!(vdev.op_count(), 0);
    assert_eq!(t.0.watchdog_expiries(), 2);
    teardown(t);
}

#[test]
fn operations_stopped_in_time_never_expire() {
    let t = tree(Arc::new(SystemStatus::new()), bounds(LONG_MS, LONG_MS, 200));
    for _ in 0..100 {
        t.2.op_start().unwrap().stop();
    }
    t.1.trans_start("brief").unwrap();
    t.1.trans_stop();

    thread::sleep(Duration::from_millis(300));
    assert_eq!(t.0.watchdog_expiries(), 0);
    teardown(t);
}

// ---------------------------------------------------------------------------
// Firmware down
// ---------------------------------------------------------------------------

#[test]
fn firmware_down_downgrades_fatal_expiries() {
    let status = Arc::new(SystemStatus::new());
    let config = DscConfig {
        fatal_timeouts: true,
        ..bounds(5, LONG_MS, 5)
    };
    let t = tree(Arc::clone(&status), config);
    status.set_firmware_down(true);

    // Aborts the test binary if the downgrade does not apply.
    let op = t.0.op_start().unwrap();
    t.1.trans_start("recovery").unwrap();
    wait_until(|| t.0.watchdog_expiries() == 2);

    let snapshot = t.0.snapshot().unwrap();
    assert!(snapshot.firmware_down);
    assert_eq!(snapshot.watchdog_expiries, 2);

    t.1.trans_stop();
    op.stop();
    teardown(t);
}

#[test]
fn release_config_never_counts_expiries() {
    let config = DscConfig {
        debug_tracking: false,
        ..bounds(1, 1, 1)
    };
    let t = tree(Arc::new(SystemStatus::new()), config);
    let op = t.2.op_start().unwrap();
    t.1.trans_start("unwatched").unwrap();
    thread::sleep(Duration::from_millis(30));

    assert_eq!(t.0.watchdog_expiries(), 0);
    t.1.trans_stop();
    drop(op);
    teardown(t);
}
