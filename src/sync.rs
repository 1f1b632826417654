//! # Thread Coordination Helpers
//!
//! Small primitives shared by every background worker:
//!
//! - [`StopSignal`] - a latch that periodic loops sleep on, so a stop request
//!   wakes them immediately instead of waiting out a full interval
//! - [`lock`] - mutex access that recovers from poisoning
//! - [`join_with_timeout`] - bounded wait for a worker thread to exit

use log::{debug, warn};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Lock a mutex, recovering the data if a panicking thread poisoned it.
///
/// None of the guarded state in this crate can be left half-updated by a
/// panic in a way that matters more than keeping the toy running.
pub fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Cooperative stop latch for periodic loops.
///
/// Once [`StopSignal::stop`] is called the signal stays stopped; every
/// current and future [`StopSignal::wait`] returns `false` immediately.
#[derive(Debug, Default)]
pub struct StopSignal {
    stopped: Mutex<bool>,
    wakeup: Condvar,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request every loop sleeping on this signal to exit.
    pub fn stop(&self) {
        let mut stopped = lock(&self.stopped);
        *stopped = true;
        self.wakeup.notify_all();
    }

    pub fn is_stopped(&self) -> bool {
        *lock(&self.stopped)
    }

    /// Sleep for `period` unless a stop is requested first.
    ///
    /// Returns `true` when the full period elapsed and the loop should run
    /// another tick, `false` when the loop should exit.
    ///
    /// A period too long to represent as a deadline waits for the stop alone.
    pub fn wait(&self, period: Duration) -> bool {
        let deadline = Instant::now().checked_add(period);
        let mut stopped = lock(&self.stopped);
        while !*stopped {
            let Some(deadline) = deadline else {
                stopped = self.wakeup.wait(stopped).unwrap_or_else(PoisonError::into_inner);
                continue;
            };
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            stopped = self
                .wakeup
                .wait_timeout(stopped, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        false
    }
}

/// Wait up to `timeout` for `handle` to finish, then join it.
///
/// A thread that does not finish in time is detached with a warning; it is
/// never forcibly terminated. Returns whether the thread was joined.
pub fn join_with_timeout(handle: JoinHandle<()>, timeout: Duration, name: &str) -> bool {
    let deadline = Instant::now() + timeout;
    while !handle.is_finished() {
        if Instant::now() >= deadline {
            warn!("{name} thread did not exit within {timeout:?}, detaching");
            return false;
        }
        thread::sleep(Duration::from_millis(5));
    }
    if handle.join().is_err() {
        warn!("{name} thread panicked before exiting");
    } else {
        debug!("{name} thread exited");
    }
    true
}
