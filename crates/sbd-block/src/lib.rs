#![forbid(unsafe_code)]
//! Backing store and sector transfer engine.
//!
//! Provides the `BackingStore` trait, the zero-initialized in-memory store
//! the device is built on, caller-owned request [`Segment`]s, and the
//! bounds-checked [`transfer`] that moves one segment to or from the store.

mod xfer;

pub use xfer::transfer;

use parking_lot::Mutex;
use sbd_error::{Result, SbdError};
use sbd_types::{SECTOR_SIZE, bytes_to_sectors};
use std::ops::Range;
use std::sync::atomic::{AtomicBool, Ordering};

/// Byte-addressed memory the device's sectors live in.
///
/// Copies are all-or-nothing: a range that does not lie entirely inside the
/// store is not touched and the call reports `false`. Implementations
/// serialize their own copies; callers never hold a lock across calls.
pub trait BackingStore: Send + Sync {
    /// Total length in bytes, fixed at construction.
    fn len_bytes(&self) -> u64;

    /// Copy `buf.len()` bytes starting at `offset` into `buf`.
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> bool;

    /// Copy all of `buf` into the store starting at `offset`.
    fn write_at(&self, offset: u64, buf: &[u8]) -> bool;

    /// Free the memory. Returns the number of bytes released, `0` if the
    /// store was already released. Later copies fail.
    fn release(&self) -> u64;

    fn is_released(&self) -> bool;
}

fn byte_range(offset: u64, len: usize) -> Option<Range<usize>> {
    let start = usize::try_from(offset).ok()?;
    let end = start.checked_add(len)?;
    Some(start..end)
}

/// Zero-initialized in-memory backing store.
///
/// The inner mutex is the device's concurrency guard: it is held for exactly
/// one copy and never across anything that can block.
#[derive(Debug)]
pub struct MemBackingStore {
    data: Mutex<Vec<u8>>,
    len: u64,
    released: AtomicBool,
}

impl MemBackingStore {
    /// Allocate `len` zeroed bytes.
    ///
    /// Allocation failure is reported instead of aborting the process.
    pub fn zeroed(len: usize) -> Result<Self> {
        let bytes = u64::try_from(len).unwrap_or(u64::MAX);
        let mut data = Vec::new();
        data.try_reserve_exact(len)
            .map_err(|_| SbdError::AllocationFailure {
                what: "backing store",
                bytes,
            })?;
        data.resize(len, 0);
        Ok(Self {
            data: Mutex::new(data),
            len: bytes,
            released: AtomicBool::new(false),
        })
    }
}

impl BackingStore for MemBackingStore {
    fn len_bytes(&self) -> u64 {
        self.len
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> bool {
        let Some(range) = byte_range(offset, buf.len()) else {
            return false;
        };
        let data = self.data.lock();
        let Some(src) = data.get(range) else {
            return false;
        };
        buf.copy_from_slice(src);
        drop(data);
        true
    }

    fn write_at(&self, offset: u64, buf: &[u8]) -> bool {
        let Some(range) = byte_range(offset, buf.len()) else {
            return false;
        };
        let mut data = self.data.lock();
        let Some(dst) = data.get_mut(range) else {
            return false;
        };
        dst.copy_from_slice(buf);
        drop(data);
        true
    }

    fn release(&self) -> u64 {
        let data = std::mem::take(&mut *self.data.lock());
        self.released.store(true, Ordering::Release);
        let freed = u64::try_from(data.len()).unwrap_or(u64::MAX);
        // Dropped outside the guard.
        drop(data);
        freed
    }

    fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }
}

/// One contiguous, caller-owned buffer of an I/O request.
///
/// Invariant: the buffer length is a whole number of sectors.
#[derive(Debug)]
pub struct Segment<'a> {
    buf: &'a mut [u8],
}

impl<'a> Segment<'a> {
    pub fn new(buf: &'a mut [u8]) -> Result<Self> {
        if buf.len() % SECTOR_SIZE != 0 {
            return Err(SbdError::UnalignedSegment { len: buf.len() });
        }
        Ok(Self { buf })
    }

    /// Length in sectors.
    #[must_use]
    pub fn sectors(&self) -> u64 {
        bytes_to_sectors(self.buf.len())
    }

    #[must_use]
    pub fn len_bytes(&self) -> usize {
        self.buf.len()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &*self.buf
    }

    #[must_use]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut *self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zeroed_store_reads_back_zeros() {
        let store = MemBackingStore::zeroed(4096).expect("store");
        assert_eq!(store.len_bytes(), 4096);
        let mut buf = [0xAA_u8; 512];
        assert!(store.read_at(1024, &mut buf));
        assert_eq!(buf, [0_u8; 512]);
    }

    #[test]
    fn write_then_read_round_trips() {
        let store = MemBackingStore::zeroed(4096).expect("store");
        assert!(store.write_at(512, &[7_u8; 1024]));
        let mut buf = vec![0_u8; 2048];
        assert!(store.read_at(0, &mut buf));
        assert_eq!(&buf[..512], &[0_u8; 512]);
        assert_eq!(&buf[512..1536], &[7_u8; 1024]);
        assert_eq!(&buf[1536..], &[0_u8; 512]);
    }

    #[test]
    fn out_of_range_copy_is_refused() {
        let store = MemBackingStore::zeroed(1024).expect("store");
        assert!(!store.write_at(512, &[1_u8; 1024]));
        assert!(!store.write_at(u64::MAX, &[1_u8; 1]));
        let mut buf = [0xEE_u8; 1024];
        assert!(!store.read_at(1, &mut buf));
        assert_eq!(buf, [0xEE_u8; 1024]);

        let mut all = [0xEE_u8; 1024];
        assert!(store.read_at(0, &mut all));
        assert_eq!(all, [0_u8; 1024]);
    }

    #[test]
    fn impossible_allocation_is_reported() {
        let err = MemBackingStore::zeroed(usize::MAX).unwrap_err();
        assert!(matches!(
            err,
            SbdError::AllocationFailure {
                what: "backing store",
                ..
            }
        ));
    }

    #[test]
    fn release_frees_once() {
        let store = MemBackingStore::zeroed(2048).expect("store");
        assert!(!store.is_released());
        assert_eq!(store.release(), 2048);
        assert!(store.is_released());
        assert_eq!(store.release(), 0);
        assert!(!store.write_at(0, &[1_u8; 512]));
        assert_eq!(store.len_bytes(), 2048);
    }

    #[test]
    fn segment_requires_whole_sectors() {
        let mut ok = vec![0_u8; 1536];
        let seg = Segment::new(&mut ok).expect("aligned");
        assert_eq!(seg.sectors(), 3);
        assert_eq!(seg.len_bytes(), 1536);

        let mut bad = vec![0_u8; 700];
        assert!(matches!(
            Segment::new(&mut bad),
            Err(SbdError::UnalignedSegment { len: 700 })
        ));

        let mut empty: Vec<u8> = Vec::new();
        assert_eq!(Segment::new(&mut empty).expect("empty").sectors(), 0);
    }
}
