//! Host registration interface.
//!
//! The host keeps a table of named disks. Creating a device first allocates
//! a disk handle (reserving the name), then publishes the device's request
//! queue under it; only a published disk receives I/O. Deletion unpublishes
//! the handle, which drops the host's reference to the queue.

use crate::dispatch::{Bio, BioQueue, Completion};
use parking_lot::Mutex;
use sbd_error::{Result, SbdError};
use sbd_types::Capacity;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Opaque identity of a disk allocated by a [`HostRegistry`].
///
/// Not `Clone`: the owner gives it back with [`HostRegistry::del_disk`].
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct DiskHandle {
    id: u64,
    name: String,
    capacity: Capacity,
}

impl DiskHandle {
    #[must_use]
    pub fn new(id: u64, name: impl Into<String>, capacity: Capacity) -> Self {
        Self {
            id,
            name: name.into(),
            capacity,
        }
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn capacity(&self) -> Capacity {
        self.capacity
    }
}

/// Device table of the host environment.
pub trait HostRegistry: Send + Sync {
    /// Reserve `name` and allocate a handle for a disk of `capacity`.
    fn alloc_disk(&self, name: &str, capacity: Capacity) -> Result<DiskHandle>;

    /// Publish: make `queue` reachable for I/O under the handle's name.
    fn add_disk(&self, handle: &DiskHandle, queue: Arc<dyn BioQueue>) -> Result<()>;

    /// Unpublish and free the handle. A handle that was never published is
    /// just freed.
    fn del_disk(&self, handle: DiskHandle);
}

struct DiskEntry {
    id: u64,
    capacity: Capacity,
    queue: Option<Arc<dyn BioQueue>>,
}

/// In-process [`HostRegistry`]: a name -> queue map.
///
/// The table lock only guards the map; requests are dispatched after the
/// queue reference has been cloned out of it.
pub struct DiskTable {
    next_id: AtomicU64,
    disks: Mutex<HashMap<String, DiskEntry>>,
}

impl DiskTable {
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            disks: Mutex::new(HashMap::new()),
        }
    }

    /// Published queue for `name`, if any.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<Arc<dyn BioQueue>> {
        self.disks
            .lock()
            .get(name)
            .and_then(|entry| entry.queue.clone())
    }

    /// Host I/O entry point: route `bio` to the disk published as `name`.
    pub fn submit_bio(&self, name: &str, bio: &mut Bio<'_>) -> Result<Completion> {
        let queue = self
            .lookup(name)
            .ok_or_else(|| SbdError::NoDevice(name.to_owned()))?;
        queue.submit_bio(bio)
    }

    #[must_use]
    pub fn is_published(&self, name: &str) -> bool {
        self.disks
            .lock()
            .get(name)
            .is_some_and(|entry| entry.queue.is_some())
    }

    /// Names of published disks, sorted.
    #[must_use]
    pub fn published(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .disks
            .lock()
            .iter()
            .filter(|(_, entry)| entry.queue.is_some())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// Allocated handles, published or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.disks.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for DiskTable {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DiskTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let disks = self.disks.lock();
        let mut entries: Vec<(&String, u64, u64, bool)> = disks
            .iter()
            .map(|(name, e)| (name, e.id, e.capacity.sectors(), e.queue.is_some()))
            .collect();
        entries.sort();
        f.debug_struct("DiskTable")
            .field("disks", &entries)
            .finish_non_exhaustive()
    }
}

impl HostRegistry for DiskTable {
    fn alloc_disk(&self, name: &str, capacity: Capacity) -> Result<DiskHandle> {
        if name.is_empty() {
            return Err(SbdError::InvalidConfig("disk name cannot be empty".to_owned()));
        }
        let mut disks = self.disks.lock();
        if disks.contains_key(name) {
            return Err(SbdError::Exists(name.to_owned()));
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        disks.insert(
            name.to_owned(),
            DiskEntry {
                id,
                capacity,
                queue: None,
            },
        );
        drop(disks);
        debug!(target: "sbd::registry", name, id, capacity_sectors = capacity.sectors(), "disk_allocated");
        Ok(DiskHandle::new(id, name, capacity))
    }

    fn add_disk(&self, handle: &DiskHandle, queue: Arc<dyn BioQueue>) -> Result<()> {
        let mut disks = self.disks.lock();
        let entry = disks
            .get_mut(handle.name())
            .filter(|entry| entry.id == handle.id())
            .ok_or_else(|| SbdError::NoDevice(handle.name().to_owned()))?;
        if entry.queue.is_some() {
            return Err(SbdError::Exists(handle.name().to_owned()));
        }
        entry.queue = Some(queue);
        drop(disks);
        debug!(target: "sbd::registry", name = handle.name(), id = handle.id(), "disk_published");
        Ok(())
    }

    fn del_disk(&self, handle: DiskHandle) {
        let mut disks = self.disks.lock();
        let removed = match disks.get(handle.name()) {
            Some(entry) if entry.id == handle.id() => disks.remove(handle.name()),
            _ => None,
        };
        drop(disks);
        // The queue reference is dropped outside the table lock.
        let was_published = removed.is_some_and(|entry| entry.queue.is_some());
        debug!(
            target: "sbd::registry",
            name = handle.name(),
            id = handle.id(),
            was_published,
            "disk_deleted"
        );
    }
}
