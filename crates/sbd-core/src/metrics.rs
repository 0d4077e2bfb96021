//! Lock-free request counters.

use sbd_types::Direction;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Pad a value to 64 bytes so counters bumped from different cores do not
/// share a cache line.
#[repr(C, align(64))]
pub struct CacheLinePadded<T>(pub T);

impl<T: std::fmt::Debug> std::fmt::Debug for CacheLinePadded<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(&self.0, f)
    }
}

/// Per-device request counters.
#[repr(C)]
pub struct AtomicMetrics {
    pub requests_total: CacheLinePadded<AtomicU64>,
    pub requests_ok: CacheLinePadded<AtomicU64>,
    pub requests_rejected: CacheLinePadded<AtomicU64>,
    pub requests_failed: CacheLinePadded<AtomicU64>,
    pub sectors_read: CacheLinePadded<AtomicU64>,
    pub sectors_written: CacheLinePadded<AtomicU64>,
    pub segments_clipped: CacheLinePadded<AtomicU64>,
}

impl AtomicMetrics {
    #[must_use]
    pub fn new() -> Self {
        Self {
            requests_total: CacheLinePadded(AtomicU64::new(0)),
            requests_ok: CacheLinePadded(AtomicU64::new(0)),
            requests_rejected: CacheLinePadded(AtomicU64::new(0)),
            requests_failed: CacheLinePadded(AtomicU64::new(0)),
            sectors_read: CacheLinePadded(AtomicU64::new(0)),
            sectors_written: CacheLinePadded(AtomicU64::new(0)),
            segments_clipped: CacheLinePadded(AtomicU64::new(0)),
        }
    }

    pub(crate) fn record_completed(&self, direction: Direction, sectors: u64) {
        self.requests_total.0.fetch_add(1, Ordering::Relaxed);
        self.requests_ok.0.fetch_add(1, Ordering::Relaxed);
        match direction {
            Direction::Read => self.sectors_read.0.fetch_add(sectors, Ordering::Relaxed),
            Direction::Write => self.sectors_written.0.fetch_add(sectors, Ordering::Relaxed),
        };
    }

    pub(crate) fn record_rejected(&self) {
        self.requests_total.0.fetch_add(1, Ordering::Relaxed);
        self.requests_rejected.0.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failed(&self) {
        self.requests_total.0.fetch_add(1, Ordering::Relaxed);
        self.requests_failed.0.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_clipped(&self) {
        self.segments_clipped.0.fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshot of all counters (for diagnostics / reporting).
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requests_total: self.requests_total.0.load(Ordering::Relaxed),
            requests_ok: self.requests_ok.0.load(Ordering::Relaxed),
            requests_rejected: self.requests_rejected.0.load(Ordering::Relaxed),
            requests_failed: self.requests_failed.0.load(Ordering::Relaxed),
            sectors_read: self.sectors_read.0.load(Ordering::Relaxed),
            sectors_written: self.sectors_written.0.load(Ordering::Relaxed),
            segments_clipped: self.segments_clipped.0.load(Ordering::Relaxed),
        }
    }
}

impl Default for AtomicMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for AtomicMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(&self.snapshot(), f)
    }
}

/// Point-in-time snapshot of metrics (all plain `u64`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub requests_total: u64,
    pub requests_ok: u64,
    pub requests_rejected: u64,
    pub requests_failed: u64,
    pub sectors_read: u64,
    pub sectors_written: u64,
    pub segments_clipped: u64,
}
