//! Request dispatcher.
//!
//! A request (`Bio`) walks `received -> admission check -> segment loop ->
//! completed`. Admission is refused once the device starts deleting; the
//! caller gets `RequestRejected` and nothing is copied. An admitted request
//! always runs its segments to the end, in order, each one starting where the
//! previous one stopped. Only the backing store's own guard serializes
//! concurrent requests, one segment copy at a time.

use crate::admission::AdmissionCounter;
use crate::metrics::AtomicMetrics;
use sbd_block::{BackingStore, MemBackingStore, Segment, transfer};
use sbd_error::{Result, SbdError};
use sbd_types::{Capacity, Direction, SectorNumber};
use serde::Serialize;
use tracing::{trace, warn};

/// One I/O request: a direction, a starting sector and ordered segments.
#[derive(Debug)]
pub struct Bio<'a> {
    pub direction: Direction,
    pub sector: SectorNumber,
    pub segments: Vec<Segment<'a>>,
}

impl<'a> Bio<'a> {
    #[must_use]
    pub fn new(direction: Direction, sector: SectorNumber) -> Self {
        Self {
            direction,
            sector,
            segments: Vec::new(),
        }
    }

    /// Single-segment read into `buf`.
    pub fn read(sector: SectorNumber, buf: &'a mut [u8]) -> Result<Self> {
        Ok(Self::new(Direction::Read, sector).with_segment(Segment::new(buf)?))
    }

    /// Single-segment write from `buf`.
    pub fn write(sector: SectorNumber, buf: &'a mut [u8]) -> Result<Self> {
        Ok(Self::new(Direction::Write, sector).with_segment(Segment::new(buf)?))
    }

    #[must_use]
    pub fn with_segment(mut self, segment: Segment<'a>) -> Self {
        self.segments.push(segment);
        self
    }

    /// Sectors requested across all segments.
    #[must_use]
    pub fn sectors(&self) -> u64 {
        self.segments
            .iter()
            .map(Segment::sectors)
            .fold(0, u64::saturating_add)
    }
}

/// Outcome of an admitted request.
///
/// `sectors` may be short of what was requested if the request ran past the
/// end of the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Completion {
    pub start: SectorNumber,
    pub sectors: u64,
}

impl Completion {
    /// First sector after the transferred range.
    #[must_use]
    pub fn end(&self) -> SectorNumber {
        SectorNumber(self.start.0.saturating_add(self.sectors))
    }
}

/// I/O entry point a host routes requests to.
pub trait BioQueue: Send + Sync {
    fn submit_bio(&self, bio: &mut Bio<'_>) -> Result<Completion>;

    fn capacity(&self) -> Capacity;
}

/// A memory-backed block device: fixed capacity, backing store, admission
/// counter and request metrics.
#[derive(Debug)]
pub struct Device<S: BackingStore = MemBackingStore> {
    capacity: Capacity,
    store: S,
    admission: AdmissionCounter,
    metrics: AtomicMetrics,
}

impl<S: BackingStore> Device<S> {
    /// Wrap an allocated store. The admission counter starts open with its
    /// creation token.
    #[must_use]
    pub fn new(capacity: Capacity, store: S) -> Self {
        Self {
            capacity,
            store,
            admission: AdmissionCounter::new(),
            metrics: AtomicMetrics::new(),
        }
    }

    #[must_use]
    pub fn capacity(&self) -> Capacity {
        self.capacity
    }

    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    #[must_use]
    pub fn admission(&self) -> &AdmissionCounter {
        &self.admission
    }

    #[must_use]
    pub fn metrics(&self) -> &AtomicMetrics {
        &self.metrics
    }

    /// Run one request against the device.
    ///
    /// Returns `RequestRejected` if the device is deleting. Otherwise every
    /// segment is transferred in order and the completion reports how many
    /// sectors moved in total. A store that refuses a copy fails the request
    /// with `StoreUnavailable`.
    pub fn submit_bio(&self, bio: &mut Bio<'_>) -> Result<Completion> {
        let Some(admission) = self.admission.enter() else {
            self.metrics.record_rejected();
            warn!(
                target: "sbd::dispatch",
                sector = bio.sector.0,
                direction = %bio.direction,
                "bio_rejected"
            );
            return Err(SbdError::RequestRejected);
        };

        let direction = bio.direction;
        let mut pos = bio.sector;
        let mut transferred = 0_u64;
        for segment in &mut bio.segments {
            let requested = segment.sectors();
            let moved = match transfer(&self.store, self.capacity, segment, pos, direction) {
                Ok(moved) => moved,
                Err(err) => {
                    self.metrics.record_failed();
                    warn!(
                        target: "sbd::dispatch",
                        sector = bio.sector.0,
                        pos = pos.0,
                        %direction,
                        error = %err,
                        "bio_failed"
                    );
                    return Err(err);
                }
            };
            if moved < requested {
                self.metrics.record_clipped();
            }
            // moved <= capacity - pos, so this never saturates in practice.
            pos = SectorNumber(pos.0.saturating_add(moved));
            transferred += moved;
        }

        self.metrics.record_completed(direction, transferred);
        trace!(
            target: "sbd::dispatch",
            sector = bio.sector.0,
            segments = bio.segments.len(),
            transferred,
            %direction,
            "bio_complete"
        );
        drop(admission);

        Ok(Completion {
            start: bio.sector,
            sectors: transferred,
        })
    }
}

impl<S: BackingStore> BioQueue for Device<S> {
    fn submit_bio(&self, bio: &mut Bio<'_>) -> Result<Completion> {
        Device::submit_bio(self, bio)
    }

    fn capacity(&self) -> Capacity {
        self.capacity
    }
}
