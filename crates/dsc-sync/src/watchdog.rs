//! # Watchdogs and Escalation
//!
//! Debug-only timers that surface stuck synchronization early:
//!
//! - an active transition that outlives `transition_timeout`,
//! - a queued transition that waits longer than `wait_timeout`,
//! - an operation that stays in flight longer than `op_timeout`.
//!
//! An expiry escalates to a process abort, unless firmware is already known
//! to be down, in which case it is only logged: the firmware failure is the
//! root cause and a panic storm would hide it. `fatal_timeouts: false` in the
//! configuration downgrades every expiry to a log line.
//!
//! ## Timer
//!
//! Each driver tree owns one [`WatchdogTimer`] and one timer thread, however
//! many transitions and operations are in flight. Arming a deadline pushes it
//! onto a min-heap and returns a [`Watchdog`] token; dropping the token
//! cancels the deadline. Cancelled heap entries are skipped when they reach
//! the top and compacted away once they outnumber the live ones.
//!
//! If the timer thread cannot be spawned, deadlines are still recorded and
//! an overdue one escalates when its token is dropped.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};

use dsc_core::{DscConfig, SystemStatus};

/// Stale heap entries tolerated before a cancel compacts the heap.
const COMPACT_SLACK: usize = 64;

/// Decides what happens when a watchdog or a bounded wait expires.
#[derive(Debug, Clone)]
pub(crate) struct Escalation {
    status: Arc<SystemStatus>,
    fatal: bool,
    expiries: Arc<AtomicU64>,
}

impl Escalation {
    pub(crate) fn new(status: Arc<SystemStatus>, fatal: bool) -> Self {
        Self {
            status,
            fatal,
            expiries: Arc::new(AtomicU64::new(0)),
        }
    }

    pub(crate) fn expired(&self, what: &str, after: Duration) {
        self.expiries.fetch_add(1, Ordering::Relaxed);
        if self.status.is_firmware_down() {
            tracing::error!(what, ?after, "timed out while firmware is down");
            return;
        }
        tracing::error!(what, ?after, "synchronization timed out");
        if self.fatal {
            std::process::abort();
        }
    }

    /// Expiries escalated so far, fatal or not.
    pub(crate) fn expiries(&self) -> u64 {
        self.expiries.load(Ordering::Relaxed)
    }
}

/// The diagnostic extension shared by every tracker of one driver tree.
///
/// Present only when `debug_tracking` is enabled.
#[derive(Debug, Clone)]
pub(crate) struct Diagnostics {
    pub(crate) transition_timeout: Duration,
    pub(crate) wait_timeout: Duration,
    pub(crate) op_timeout: Duration,
    pub(crate) escalation: Escalation,
    pub(crate) timer: WatchdogTimer,
}

impl Diagnostics {
    pub(crate) fn from_config(config: &DscConfig, status: &Arc<SystemStatus>) -> Option<Self> {
        config.debug_tracking.then(|| {
            let escalation = Escalation::new(Arc::clone(status), config.fatal_timeouts);
            Self {
                transition_timeout: config.transition_timeout(),
                wait_timeout: config.wait_timeout(),
                op_timeout: config.op_timeout(),
                timer: WatchdogTimer::start(escalation.clone()),
                escalation,
            }
        })
    }
}

// ── Timer ────────────────────────────────────────────────────────────

#[derive(Debug)]
struct Armed {
    what: String,
    timeout: Duration,
    deadline: Instant,
}

#[derive(Debug, Default)]
struct Deadlines {
    heap: BinaryHeap<Reverse<(Instant, u64)>>,
    armed: HashMap<u64, Armed>,
    next_id: u64,
    shutdown: bool,
}

#[derive(Debug)]
struct TimerState {
    deadlines: Mutex<Deadlines>,
    wake: Condvar,
    escalation: Escalation,
    running: AtomicBool,
}

/// Stops the timer thread once the last clone of its timer is gone.
#[derive(Debug)]
struct Worker {
    state: Arc<TimerState>,
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.state.deadlines.lock().shutdown = true;
        self.state.wake.notify_one();
    }
}

/// One timer thread serving every watchdog of a driver tree.
#[derive(Debug, Clone)]
pub(crate) struct WatchdogTimer {
    state: Arc<TimerState>,
    _worker: Arc<Worker>,
}

impl WatchdogTimer {
    pub(crate) fn start(escalation: Escalation) -> Self {
        let state = Arc::new(TimerState {
            deadlines: Mutex::new(Deadlines::default()),
            wake: Condvar::new(),
            escalation,
            running: AtomicBool::new(false),
        });

        let worker_state = Arc::clone(&state);
        let spawned = std::thread::Builder::new()
            .name("dsc-watchdog".to_string())
            .spawn(move || run(&worker_state));
        match spawned {
            Ok(_) => state.running.store(true, Ordering::Release),
            Err(e) => {
                tracing::error!(error = %e, "failed to spawn watchdog timer; expiries surface at cancel");
            }
        }

        Self {
            _worker: Arc::new(Worker {
                state: Arc::clone(&state),
            }),
            state,
        }
    }

    /// Arm a deadline `timeout` from now. Dropping the token cancels it.
    pub(crate) fn arm(&self, what: String, timeout: Duration) -> Watchdog {
        let deadline = Instant::now() + timeout;
        let mut deadlines = self.state.deadlines.lock();
        let id = deadlines.next_id;
        deadlines.next_id += 1;
        let earliest = deadlines
            .heap
            .peek()
            .map_or(true, |Reverse((first, _))| deadline < *first);
        deadlines.heap.push(Reverse((deadline, id)));
        deadlines.armed.insert(
            id,
            Armed {
                what,
                timeout,
                deadline,
            },
        );
        drop(deadlines);

        if earliest {
            self.state.wake.notify_one();
        }
        Watchdog {
            id,
            state: Arc::clone(&self.state),
        }
    }

    /// Deadlines armed and not yet cancelled or expired.
    #[cfg(test)]
    pub(crate) fn armed(&self) -> usize {
        self.state.deadlines.lock().armed.len()
    }
}

fn run(state: &TimerState) {
    let mut deadlines = state.deadlines.lock();
    loop {
        if deadlines.shutdown {
            return;
        }
        let next = deadlines.heap.peek().map(|Reverse(entry)| *entry);
        let Some((deadline, id)) = next else {
            state.wake.wait(&mut deadlines);
            continue;
        };
        if Instant::now() < deadline {
            state.wake.wait_until(&mut deadlines, deadline);
            continue;
        }

        deadlines.heap.pop();
        if let Some(armed) = deadlines.armed.remove(&id) {
            MutexGuard::unlocked(&mut deadlines, || {
                state.escalation.expired(&armed.what, armed.timeout);
            });
        }
    }
}

/// A pending deadline on the tree's [`WatchdogTimer`], cancelled on drop.
#[derive(Debug)]
pub(crate) struct Watchdog {
    id: u64,
    state: Arc<TimerState>,
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        let mut deadlines = self.state.deadlines.lock();
        let Some(armed) = deadlines.armed.remove(&self.id) else {
            return;
        };
        if deadlines.heap.len() > 2 * deadlines.armed.len() + COMPACT_SLACK {
            let Deadlines { heap, armed: live, .. } = &mut *deadlines;
            heap.retain(|Reverse((_, id))| live.contains_key(id));
        }
        drop(deadlines);

        if !self.state.running.load(Ordering::Acquire) && Instant::now() >= armed.deadline {
            self.state.escalation.expired(&armed.what, armed.timeout);
        }
    }
}
