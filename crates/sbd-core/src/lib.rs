#![forbid(unsafe_code)]
//! Device core: admission control, request dispatch, host registration and
//! the create/delete lifecycle of a memory-backed block device.
//!
//! ```text
//! host ──submit_bio──▶ DiskTable ──▶ Device::submit_bio
//!                                      ├─ AdmissionCounter::enter
//!                                      └─ sbd_block::transfer (per segment)
//! ```

pub mod admission;
pub mod config;
pub mod dispatch;
pub mod lifecycle;
pub mod metrics;
pub mod registry;

pub use admission::{Admission, AdmissionCounter};
pub use config::{DeviceConfig, MAX_NAME_LEN};
pub use dispatch::{Bio, BioQueue, Completion, Device};
pub use lifecycle::RamDisk;
pub use metrics::{AtomicMetrics, MetricsSnapshot};
pub use registry::{DiskHandle, DiskTable, HostRegistry};

pub use sbd_block::{BackingStore, MemBackingStore, Segment};
pub use sbd_error::{Result, SbdError};
pub use sbd_types::{
    Capacity, DEFAULT_CAPACITY_MIB, DEVICE_NAME, Direction, MIB_SECTORS, SECTOR_SHIFT,
    SECTOR_SIZE, SectorNumber,
};
