#![forbid(unsafe_code)]
//! Error types for the simple block device.
//!
//! # Error Taxonomy
//!
//! | Variant | Raised by | errno |
//! |---------|-----------|-------|
//! | `AllocationFailure` | lifecycle: backing store or disk handle allocation | `ENOMEM` |
//! | `RequestRejected` | dispatcher: admission denied while deleting | `EIO` |
//! | `StoreUnavailable` | transfer engine: copy refused by a freed store | `EIO` |
//! | `UnalignedSegment` | segment construction | `EINVAL` |
//! | `InvalidConfig` | load-parameter parsing and capacity validation | `EINVAL` |
//! | `Exists` | host registry: duplicate disk name | `EEXIST` |
//! | `NoDevice` | host registry: unknown disk name | `ENODEV` |
//! | `Io` | host-side I/O | raw os error, else `EIO` |
//!
//! A transfer clipped at the capacity boundary is not an error. The
//! dispatcher reports how many sectors moved and callers do their own
//! position accounting.
//!
//! `AllocationFailure` is only ever returned from device creation, after any
//! partially built state has been torn down. `RequestRejected` is local to the
//! one request that hit it.

use thiserror::Error;

/// Unified error type for block device operations.
#[derive(Debug, Error)]
pub enum SbdError {
    /// Backing store or disk handle could not be allocated.
    #[error("unable to allocate {what} ({bytes} bytes)")]
    AllocationFailure { what: &'static str, bytes: u64 },

    /// The device is being deleted (or already drained); no new I/O is admitted.
    #[error("request rejected: device is shutting down")]
    RequestRejected,

    /// The backing store refused a copy because its memory was freed.
    #[error("backing store unavailable")]
    StoreUnavailable,

    /// A segment buffer is not a whole number of sectors.
    #[error("segment length {len} is not a multiple of the sector size")]
    UnalignedSegment { len: usize },

    /// A load parameter is malformed or out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A disk with this name is already registered.
    #[error("disk already exists: {0}")]
    Exists(String),

    /// No disk with this name is registered.
    #[error("no such device: {0}")]
    NoDevice(String),

    /// Operating system I/O error (wraps `std::io::Error`).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SbdError {
    /// Convert this error into a POSIX errno for the host's completion status.
    ///
    /// The mapping is exhaustive so a new variant cannot ship without an errno.
    #[must_use]
    pub fn to_errno(&self) -> libc::c_int {
        match self {
            Self::AllocationFailure { .. } => libc::ENOMEM,
            Self::RequestRejected | Self::StoreUnavailable => libc::EIO,
            Self::UnalignedSegment { .. } | Self::InvalidConfig(_) => libc::EINVAL,
            Self::Exists(_) => libc::EEXIST,
            Self::NoDevice(_) => libc::ENODEV,
            Self::Io(err) => err.raw_os_error().unwrap_or(libc::EIO),
        }
    }
}

/// Result alias using `SbdError`.
pub type Result<T> = std::result::Result<T, SbdError>;
