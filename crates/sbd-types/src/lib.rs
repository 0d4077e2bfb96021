#![forbid(unsafe_code)]
//! Sector geometry shared by every layer of the simple block device.
//!
//! The device is addressed in fixed 512-byte sectors. Capacity is chosen
//! once, at creation, from a size in MiB and never changes afterwards; the
//! [`Capacity`] descriptor carries that value and owns the clipping rule the
//! transfer path relies on.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub const SECTOR_SHIFT: u32 = 9;
pub const SECTOR_SIZE: usize = 1 << SECTOR_SHIFT;
pub const MIB_SECTORS: u64 = 1 << (20 - SECTOR_SHIFT);

/// Name the device is published under.
pub const DEVICE_NAME: &str = "sbdd";

/// Capacity used when no load parameter overrides it.
pub const DEFAULT_CAPACITY_MIB: u64 = 100;

/// Sector index on the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SectorNumber(pub u64);

impl SectorNumber {
    pub const ZERO: Self = Self(0);

    /// Advance by `sectors`, returning `None` on overflow.
    #[must_use]
    pub fn checked_add(self, sectors: u64) -> Option<Self> {
        self.0.checked_add(sectors).map(Self)
    }

    /// Byte offset of this sector, `None` if it does not fit `u64`.
    #[must_use]
    pub fn byte_offset(self) -> Option<u64> {
        self.0.checked_mul(SECTOR_SIZE as u64)
    }
}

impl fmt::Display for SectorNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Data direction of an I/O request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Backing store -> request buffer.
    Read,
    /// Request buffer -> backing store.
    Write,
}

impl Direction {
    #[must_use]
    pub const fn is_write(self) -> bool {
        matches!(self, Self::Write)
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Read => "read",
            Self::Write => "write",
        })
    }
}

/// Number of whole sectors covered by `len` bytes (truncating).
#[must_use]
pub const fn bytes_to_sectors(len: usize) -> u64 {
    (len >> SECTOR_SHIFT) as u64
}

/// Byte length of `sectors` sectors, `None` on overflow.
#[must_use]
pub fn sectors_to_bytes(sectors: u64) -> Option<u64> {
    sectors.checked_mul(SECTOR_SIZE as u64)
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("invalid field: {field} ({reason})")]
    InvalidField {
        field: &'static str,
        reason: &'static str,
    },
    #[error("integer conversion failed: {field}")]
    IntegerConversion { field: &'static str },
}

/// Fixed device capacity, in sectors.
///
/// Invariant: `sectors > 0` and `sectors * SECTOR_SIZE` fits in both `u64`
/// and `usize`, so the backing store can always be sized from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u64")]
pub struct Capacity(u64);

impl TryFrom<u64> for Capacity {
    type Error = ParseError;

    fn try_from(sectors: u64) -> Result<Self, Self::Error> {
        Self::from_sectors(sectors)
    }
}

impl Capacity {
    /// Capacity for a device of `mib` mebibytes.
    pub fn from_mib(mib: u64) -> Result<Self, ParseError> {
        if mib == 0 {
            return Err(ParseError::InvalidField {
                field: "capacity_mib",
                reason: "must be > 0",
            });
        }
        let sectors = mib
            .checked_mul(MIB_SECTORS)
            .ok_or(ParseError::IntegerConversion {
                field: "capacity_mib",
            })?;
        Self::from_sectors(sectors)
    }

    /// Capacity of exactly `sectors` sectors.
    pub fn from_sectors(sectors: u64) -> Result<Self, ParseError> {
        if sectors == 0 {
            return Err(ParseError::InvalidField {
                field: "capacity_sectors",
                reason: "must be > 0",
            });
        }
        let bytes = sectors_to_bytes(sectors).ok_or(ParseError::IntegerConversion {
            field: "capacity_sectors",
        })?;
        usize::try_from(bytes).map_err(|_| ParseError::IntegerConversion {
            field: "capacity_bytes",
        })?;
        Ok(Self(sectors))
    }

    #[must_use]
    pub const fn sectors(self) -> u64 {
        self.0
    }

    /// Size of the address space in bytes.
    #[must_use]
    pub const fn bytes(self) -> u64 {
        self.0 << SECTOR_SHIFT
    }

    /// Size of the address space in bytes, as a buffer length.
    #[must_use]
    pub fn len_bytes(self) -> usize {
        // Checked at construction.
        usize::try_from(self.bytes()).unwrap_or(usize::MAX)
    }

    #[must_use]
    pub const fn contains(self, sector: SectorNumber) -> bool {
        sector.0 < self.0
    }

    /// Number of sectors of a `len`-sector transfer at `pos` that fall inside
    /// the device. Zero when `pos` is at or past the end.
    #[must_use]
    pub const fn clip(self, pos: SectorNumber, len: u64) -> u64 {
        if pos.0 >= self.0 {
            return 0;
        }
        let room = self.0 - pos.0;
        if len > room { room } else { len }
    }
}

impl fmt::Display for Capacity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} sectors", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geometry_constants() {
        assert_eq!(SECTOR_SIZE, 512);
        assert_eq!(MIB_SECTORS, 2048);
        assert_eq!(bytes_to_sectors(4096), 8);
        assert_eq!(bytes_to_sectors(511), 0);
        assert_eq!(sectors_to_bytes(3), Some(1536));
    }

    #[test]
    fn default_capacity_is_100_mib() {
        let cap = Capacity::from_mib(DEFAULT_CAPACITY_MIB).expect("capacity");
        assert_eq!(cap.sectors(), 204_800);
        assert_eq!(cap.bytes(), 100 * 1024 * 1024);
        assert_eq!(cap.len_bytes(), 100 * 1024 * 1024);
    }

    #[test]
    fn zero_capacity_rejected() {
        assert!(matches!(
            Capacity::from_mib(0),
            Err(ParseError::InvalidField { .. })
        ));
        assert!(matches!(
            Capacity::from_sectors(0),
            Err(ParseError::InvalidField { .. })
        ));
    }

    #[test]
    fn overflowing_capacity_rejected() {
        assert!(matches!(
            Capacity::from_mib(u64::MAX),
            Err(ParseError::IntegerConversion { .. })
        ));
        assert!(matches!(
            Capacity::from_sectors(u64::MAX / 2),
            Err(ParseError::IntegerConversion { .. })
        ));
    }

    #[test]
    fn clip_at_capacity_boundary() {
        let cap = Capacity::from_sectors(2048).expect("capacity");
        assert_eq!(cap.clip(SectorNumber(2040), 20), 8);
        assert_eq!(cap.clip(SectorNumber(0), 20), 20);
        assert_eq!(cap.clip(SectorNumber(2047), 1), 1);
        assert_eq!(cap.clip(SectorNumber(2048), 1), 0);
        assert_eq!(cap.clip(SectorNumber(u64::MAX), u64::MAX), 0);
    }

    #[test]
    fn contains_is_half_open() {
        let cap = Capacity::from_mib(1).expect("capacity");
        assert!(cap.contains(SectorNumber::ZERO));
        assert!(cap.contains(SectorNumber(2047)));
        assert!(!cap.contains(SectorNumber(2048)));
    }

    #[test]
    fn sector_arithmetic() {
        assert_eq!(SectorNumber(4).byte_offset(), Some(2048));
        assert_eq!(SectorNumber(u64::MAX).byte_offset(), None);
        assert_eq!(SectorNumber(1).checked_add(2), Some(SectorNumber(3)));
        assert_eq!(SectorNumber(u64::MAX).checked_add(1), None);
    }

    #[test]
    fn display_formatting() {
        assert_eq!(Direction::Read.to_string(), "read");
        assert_eq!(Direction::Write.to_string(), "write");
        assert!(Direction::Write.is_write());
        assert_eq!(
            Capacity::from_sectors(8).expect("capacity").to_string(),
            "8 sectors"
        );
        let err = Capacity::from_mib(0).unwrap_err();
        assert_eq!(err.to_string(), "invalid field: capacity_mib (must be > 0)");
    }

    #[test]
    fn deserialized_capacity_is_validated() {
        let cap: Capacity = serde_json::from_str("2048").expect("valid capacity");
        assert_eq!(cap, Capacity::from_sectors(2048).expect("capacity"));
        assert_eq!(serde_json::to_string(&cap).expect("serialize"), "2048");

        assert!(serde_json::from_str::<Capacity>("0").is_err());
        assert!(serde_json::from_str::<Capacity>(&u64::MAX.to_string()).is_err());
        assert_eq!(
            Capacity::try_from(0_u64),
            Err(ParseError::InvalidField {
                field: "capacity_sectors",
                reason: "must be > 0",
            })
        );
    }
}
