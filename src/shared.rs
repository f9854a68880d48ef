//! Cross-thread publication primitives.
//!
//! Every "shared latest-value cell" in the pipeline is a [`Snapshot<T>`]:
//! a mutex-guarded `T` cloned out wholesale by readers so no consumer ever
//! observes a partial write. Quit signalling and periodic scheduling use
//! the same `Arc<AtomicBool>` plus deadline-sleep idiom as the rest of the
//! pipeline's worker threads.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Single-producer / multiple-consumer latest-value cell.
///
/// `publish` is called only by the owning producer thread; `get` may be
/// called by any number of reader threads. Because the whole value is
/// replaced under the lock, a reader never sees a mix of fields from two
/// different publications.
pub struct Snapshot<T: Clone> {
    inner: Mutex<T>,
}

impl<T: Clone> Snapshot<T> {
    pub fn new(initial: T) -> Self {
        Snapshot {
            inner: Mutex::new(initial),
        }
    }

    /// Atomically replace the published value.
    pub fn publish(&self, value: T) {
        let mut guard = self.inner.lock().expect("snapshot mutex poisoned");
        *guard = value;
    }

    /// Clone out the latest published value.
    pub fn get(&self) -> T {
        self.inner.lock().expect("snapshot mutex poisoned").clone()
    }
}

/// Cooperative cancellation flag shared between the sequencer and a worker
/// thread. Checked once per loop iteration; blocking reads are additionally
/// bounded by a short timeout so the flag is observed promptly.
#[derive(Clone)]
pub struct QuitFlag(Arc<AtomicBool>);

impl QuitFlag {
    pub fn new() -> Self {
        QuitFlag(Arc::new(AtomicBool::new(false)))
    }

    pub fn signal(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

impl Default for QuitFlag {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared switch gating the dispatcher's real-vs-zero output.
///
/// Only the mission sequencer writes this (set on Active-window entry and
/// exit); the control thread only reads it. Only Active-window enables
/// the dispatcher output.
#[derive(Clone)]
pub struct ActiveFlag(Arc<AtomicBool>);

impl ActiveFlag {
    pub fn new() -> Self {
        ActiveFlag(Arc::new(AtomicBool::new(false)))
    }

    pub fn set(&self, active: bool) {
        self.0.store(active, Ordering::Relaxed);
    }

    pub fn is_active(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

impl Default for ActiveFlag {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared record of a fatal condition raised by any worker thread.
///
/// No thread propagates an error to another by unwinding; a fatal
/// condition is instead recorded here and examined by the sequencer once
/// per its own tick.
#[derive(Clone)]
pub struct FaultLatch {
    flag: Arc<AtomicBool>,
    reason: Arc<Mutex<Option<String>>>,
}

impl FaultLatch {
    pub fn new() -> Self {
        FaultLatch {
            flag: Arc::new(AtomicBool::new(false)),
            reason: Arc::new(Mutex::new(None)),
        }
    }

    /// Record a fatal condition. The first caller's reason wins.
    pub fn raise(&self, reason: impl std::fmt::Display) {
        let mut guard = self.reason.lock().expect("fault latch mutex poisoned");
        if guard.is_none() {
            *guard = Some(reason.to_string());
        }
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_raised(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    pub fn reason(&self) -> Option<String> {
        self.reason.lock().expect("fault latch mutex poisoned").clone()
    }
}

impl Default for FaultLatch {
    fn default() -> Self {
        Self::new()
    }
}

/// Sleep-until-deadline helper for a fixed-period loop.
///
/// Each `tick()` call sleeps the remainder of the current period and arms
/// the next deadline; if the caller's work since the previous tick already
/// overran the period, `tick()` returns `false` (an informational overrun)
/// and does not sleep at all.
pub struct PeriodicTimer {
    period: Duration,
    next_deadline: Instant,
}

impl PeriodicTimer {
    pub fn new(period: Duration) -> Self {
        PeriodicTimer {
            period,
            next_deadline: Instant::now() + period,
        }
    }

    /// Block until the next deadline, then arm the deadline after that.
    /// Returns `false` if the previous period was already overrun.
    pub fn tick(&mut self) -> bool {
        let now = Instant::now();
        let on_time = now < self.next_deadline;
        if on_time {
            std::thread::sleep(self.next_deadline - now);
        }
        // Always step from the previous deadline, not from `now`, so a
        // single overrun doesn't permanently phase-shift the schedule.
        self.next_deadline += self.period;
        if self.next_deadline < Instant::now() {
            self.next_deadline = Instant::now() + self.period;
        }
        on_time
    }
}
