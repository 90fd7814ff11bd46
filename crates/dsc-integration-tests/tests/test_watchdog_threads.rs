//! # Watchdog Thread Budget
//!
//! A debug driver runs one timer thread for its whole tree, however many
//! operations and transitions are in flight, and stops it when the tree is
//! dropped. Kept alone in its own test binary so no other test's threads
//! skew the process thread count.

#![cfg(target_os = "linux")]

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use dsc_core::{DscConfig, SystemStatus};
use dsc_sync::{Driver, OpGuard, Psoc, Vdev};

fn process_threads() -> usize {
    let status = std::fs::read_to_string("/proc/self/status").unwrap();
    status
        .lines()
        .find_map(|line| line.strip_prefix("Threads:"))
        .and_then(|count| count.trim().parse().ok())
        .unwrap()
}

#[test]
fn one_timer_thread_per_driver_tree() {
    let before = process_threads();

    let driver = Driver::create(Arc::new(SystemStatus::new()), DscConfig::debug()).unwrap();
    let psoc = Psoc::create(&driver).unwrap();
    let vdevs: Vec<Vdev> = (0..4).map(|_| Vdev::create(&psoc).unwrap()).collect();

    let guards: Vec<OpGuard> = (0..500)
        .map(|i| vdevs[i % vdevs.len()].op_start().unwrap())
        .collect();
    for vdev in &vdevs[1..] {
        vdev.trans_start("reset").unwrap();
    }

    let during = process_threads();
    assert_eq!(during, before + 1, "500 operations and 3 transitions in flight");

    for vdev in &vdevs[1..] {
        vdev.trans_stop();
    }
    drop(guards);
    vdevs.into_iter().for_each(Vdev::destroy);
    psoc.destroy();
    driver.destroy();

    let deadline = Instant::now() + Duration::from_secs(5);
    while process_threads() != before {
        assert!(Instant::now() < deadline, "timer thread outlived its driver");
        thread::sleep(Duration::from_millis(1));
    }
}
