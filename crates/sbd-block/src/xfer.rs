//! Sector transfer engine.
//!
//! Moves one request segment between its caller-owned buffer and the
//! backing store at a sector position. A segment that runs past the end of
//! the device is clipped: only the sectors inside `[0, capacity)` are copied
//! and the shorter length is returned; the dispatcher advances its cursor by
//! whatever was transferred. The only failure is a store that refuses the
//! copy, which is never reported as a clip.

use crate::{BackingStore, Segment};
use sbd_error::{Result, SbdError};
use sbd_types::{Capacity, Direction, SECTOR_SIZE, SectorNumber};
use tracing::{error, trace};

/// Copy `segment` to or from `store` starting at sector `pos`.
///
/// Returns the number of sectors actually transferred, which is less than
/// `segment.sectors()` when the segment crosses the capacity boundary and `0`
/// when `pos` is at or past it. A copy the store refuses (it was released)
/// is `StoreUnavailable`.
pub fn transfer<S: BackingStore + ?Sized>(
    store: &S,
    capacity: Capacity,
    segment: &mut Segment<'_>,
    pos: SectorNumber,
    direction: Direction,
) -> Result<u64> {
    let requested = segment.sectors();
    let len = capacity.clip(pos, requested);
    if len < requested {
        trace!(
            target: "sbd::xfer",
            pos = pos.0,
            requested,
            len,
            capacity = capacity.sectors(),
            "transfer_clipped"
        );
    }
    if len == 0 {
        return Ok(0);
    }

    // pos + len <= capacity, and the capacity's byte size fits usize.
    let Some(offset) = pos.byte_offset() else {
        return Ok(0);
    };
    let Some(nbytes) = usize::try_from(len)
        .ok()
        .and_then(|sectors| sectors.checked_mul(SECTOR_SIZE))
    else {
        return Ok(0);
    };

    let copied = match direction {
        Direction::Write => store.write_at(offset, &segment.as_slice()[..nbytes]),
        Direction::Read => store.read_at(offset, &mut segment.as_mut_slice()[..nbytes]),
    };
    if !copied {
        error!(
            target: "sbd::xfer",
            pos = pos.0,
            len,
            %direction,
            store_len = store.len_bytes(),
            "transfer_refused"
        );
        return Err(SbdError::StoreUnavailable);
    }

    trace!(target: "sbd::xfer", pos = pos.0, len, %direction, "transfer");
    Ok(len)
}
