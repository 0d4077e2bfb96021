//! Admission counter: gates new I/O and lets deletion wait for in-flight I/O.
//!
//! # Protocol
//!
//! The counter starts at 1: the device's own "alive" token taken at
//! creation. Every request that is admitted adds one and gives it back when
//! it completes. Deletion sets the closing bit, gives up the creation token
//! and then [`drain`](AdmissionCounter::drain)s until the count reaches zero.
//!
//! The count and the closing flag share one `AtomicU64` (bit 63 is the
//! flag). Admission is a single compare-exchange over the whole word, so once
//! the flag is set no increment can succeed and the count only goes down.
//!
//! # Memory ordering
//!
//! - a successful admission is an `Acquire` exchange;
//! - every release is a `Release` exchange, and the release that reaches zero
//!   issues an `Acquire` fence before waking drainers, so everything any
//!   request did happens-before `drain` returning;
//! - the wake takes the drain mutex before notifying, which closes the window
//!   between a drainer's check and its wait.

use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicU64, Ordering, fence};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const CLOSING: u64 = 1 << 63;
const COUNT_MASK: u64 = CLOSING - 1;

/// Atomic gate tracking in-flight requests.
#[derive(Debug)]
pub struct AdmissionCounter {
    state: AtomicU64,
    drain_lock: Mutex<()>,
    drained: Condvar,
}

impl AdmissionCounter {
    /// New counter holding the creation token (count = 1, not closing).
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: AtomicU64::new(1),
            drain_lock: Mutex::new(()),
            drained: Condvar::new(),
        }
    }

    /// Take one admission if the counter is open and non-zero.
    pub fn try_acquire(&self) -> bool {
        let mut current = self.state.load(Ordering::Relaxed);
        loop {
            let count = current & COUNT_MASK;
            if current & CLOSING != 0 || count == 0 || count == COUNT_MASK {
                return false;
            }
            match self.state.compare_exchange_weak(
                current,
                current + 1,
                Ordering::Acquire,
                Ordering::Relaxed,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    /// Give back one admission. Returns `true` if this brought the count to
    /// zero, in which case drainers are woken.
    ///
    /// Releasing at zero is a caller bug; it is logged and ignored.
    pub fn release(&self) -> bool {
        let mut current = self.state.load(Ordering::Relaxed);
        loop {
            let count = current & COUNT_MASK;
            if count == 0 {
                warn!(target: "sbd::admission", "admission_release_underflow");
                return false;
            }
            match self.state.compare_exchange_weak(
                current,
                current - 1,
                Ordering::Release,
                Ordering::Relaxed,
            ) {
                Ok(_) if count == 1 => break,
                Ok(_) => return false,
                Err(actual) => current = actual,
            }
        }

        fence(Ordering::Acquire);
        let guard = self.drain_lock.lock();
        self.drained.notify_all();
        drop(guard);
        true
    }

    /// RAII form of [`try_acquire`](Self::try_acquire).
    #[must_use]
    pub fn enter(&self) -> Option<Admission<'_>> {
        // Built only after a successful acquire: dropping a guard releases.
        self.try_acquire().then(|| Admission { counter: self })
    }

    /// Stop admitting and give up the creation token.
    ///
    /// Only the first call releases the token; returns whether this call was
    /// the one that closed the counter.
    pub fn close(&self) -> bool {
        let previous = self.state.fetch_or(CLOSING, Ordering::AcqRel);
        if previous & CLOSING != 0 {
            return false;
        }
        debug!(
            target: "sbd::admission",
            in_flight = (previous & COUNT_MASK).saturating_sub(1),
            "admission_closed"
        );
        self.release();
        true
    }

    /// Block until the count reaches zero.
    ///
    /// Only terminates after [`close`](Self::close): an open counter always
    /// holds its creation token.
    pub fn drain(&self) {
        let mut guard = self.drain_lock.lock();
        while !self.is_drained() {
            self.drained.wait(&mut guard);
        }
        drop(guard);
    }

    /// Like [`drain`](Self::drain) but gives up after `timeout`.
    ///
    /// Returns `true` if the count reached zero.
    pub fn drain_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut guard = self.drain_lock.lock();
        while !self.is_drained() {
            if self.drained.wait_until(&mut guard, deadline).timed_out() {
                let drained = self.is_drained();
                drop(guard);
                return drained;
            }
        }
        drop(guard);
        true
    }

    /// Current count, including the creation token while it is held.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.state.load(Ordering::Acquire) & COUNT_MASK
    }

    /// Admitted requests that have not completed yet.
    #[must_use]
    pub fn in_flight(&self) -> u64 {
        let state = self.state.load(Ordering::Acquire);
        let count = state & COUNT_MASK;
        if state & CLOSING == 0 {
            count.saturating_sub(1)
        } else {
            count
        }
    }

    #[must_use]
    pub fn is_closing(&self) -> bool {
        self.state.load(Ordering::Acquire) & CLOSING != 0
    }

    #[must_use]
    pub fn is_drained(&self) -> bool {
        self.count() == 0
    }
}

impl Default for AdmissionCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// One admitted request. Dropping it releases the admission.
#[derive(Debug)]
pub struct Admission<'a> {
    counter: &'a AdmissionCounter,
}

impl Drop for Admission<'_> {
    fn drop(&mut self) {
        self.counter.release();
    }
}
