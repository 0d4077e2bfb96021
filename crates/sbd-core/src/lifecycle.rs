//! Device lifecycle: create, publish, delete.
//!
//! Creation allocates the backing store, builds the device, allocates a disk
//! handle from the host and publishes the device's queue, in that order. Any
//! failure runs the delete path over whatever already exists before the error
//! is returned, so a failed creation leaves nothing behind in the host.
//!
//! Deletion closes admission, drains in-flight requests, unpublishes the
//! handle and frees the store. Every step checks its resource first, so
//! teardown can run against a half-built device and can run twice.

use crate::config::DeviceConfig;
use crate::dispatch::{BioQueue, Device};
use crate::metrics::MetricsSnapshot;
use crate::registry::{DiskHandle, HostRegistry};
use sbd_block::{BackingStore, MemBackingStore};
use sbd_error::Result;
use sbd_types::Capacity;
use std::sync::Arc;
use tracing::{info, warn};

/// A created memory-backed disk.
///
/// Dropping a `RamDisk` deletes it; [`delete`](Self::delete) does the same
/// and returns the final request counters.
pub struct RamDisk<S: BackingStore + 'static = MemBackingStore> {
    name: String,
    device: Arc<Device<S>>,
    registry: Arc<dyn HostRegistry>,
    handle: Option<DiskHandle>,
    deleted: bool,
}

impl RamDisk<MemBackingStore> {
    /// Create a disk backed by zero-filled memory and publish it.
    pub fn create(config: &DeviceConfig, registry: Arc<dyn HostRegistry>) -> Result<Self> {
        Self::create_with(config, registry, MemBackingStore::zeroed)
    }
}

impl<S: BackingStore + 'static> RamDisk<S> {
    /// Create a disk whose backing store comes from `alloc_store`, called
    /// with the byte length the capacity needs.
    pub fn create_with<F>(
        config: &DeviceConfig,
        registry: Arc<dyn HostRegistry>,
        alloc_store: F,
    ) -> Result<Self>
    where
        F: FnOnce(usize) -> Result<S>,
    {
        config.validate()?;
        let capacity = config.capacity()?;

        info!(
            target: "sbd::lifecycle",
            name = %config.name,
            capacity_sectors = capacity.sectors(),
            bytes = capacity.bytes(),
            "allocating_data"
        );
        let store = alloc_store(capacity.len_bytes()).inspect_err(|err| {
            warn!(target: "sbd::lifecycle", name = %config.name, error = %err, "initialization_failed");
        })?;

        let mut disk = Self {
            name: config.name.clone(),
            device: Arc::new(Device::new(capacity, store)),
            registry,
            handle: None,
            deleted: false,
        };
        if let Err(err) = disk.register() {
            warn!(target: "sbd::lifecycle", name = %disk.name, error = %err, "initialization_failed");
            disk.teardown();
            return Err(err);
        }
        info!(target: "sbd::lifecycle", name = %disk.name, "initialization_complete");
        Ok(disk)
    }

    fn register(&mut self) -> Result<()> {
        info!(target: "sbd::lifecycle", name = %self.name, "allocating_disk");
        let handle = self
            .registry
            .alloc_disk(&self.name, self.device.capacity())?;
        let handle = self.handle.insert(handle);

        info!(target: "sbd::lifecycle", name = %self.name, id = handle.id(), "adding_disk");
        let queue: Arc<dyn BioQueue> = Arc::clone(&self.device) as Arc<dyn BioQueue>;
        self.registry.add_disk(handle, queue)
    }

    /// Delete the disk, waiting for in-flight requests, and return the final
    /// request counters.
    pub fn delete(mut self) -> MetricsSnapshot {
        self.teardown()
    }

    fn teardown(&mut self) -> MetricsSnapshot {
        self.deleted = true;
        let admission = self.device.admission();
        if admission.close() {
            info!(target: "sbd::lifecycle", name = %self.name, "closing_admission");
        }
        admission.drain();

        if let Some(handle) = self.handle.take() {
            info!(target: "sbd::lifecycle", name = %self.name, id = handle.id(), "deleting_disk");
            self.registry.del_disk(handle);
        }

        let store = self.device.store();
        if !store.is_released() {
            let bytes = store.release();
            info!(target: "sbd::lifecycle", name = %self.name, bytes, "freeing_data");
        }

        let snap = self.device.metrics().snapshot();
        info!(
            target: "sbd::lifecycle",
            name = %self.name,
            requests_total = snap.requests_total,
            requests_rejected = snap.requests_rejected,
            requests_failed = snap.requests_failed,
            sectors_read = snap.sectors_read,
            sectors_written = snap.sectors_written,
            "exit"
        );
        snap
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn capacity(&self) -> Capacity {
        self.device.capacity()
    }

    /// The shared device, for submitting requests directly.
    #[must_use]
    pub fn device(&self) -> &Arc<Device<S>> {
        &self.device
    }

    #[must_use]
    pub fn handle(&self) -> Option<&DiskHandle> {
        self.handle.as_ref()
    }
}

impl<S: BackingStore + 'static> Drop for RamDisk<S> {
    fn drop(&mut self) {
        if !self.deleted {
            self.teardown();
        }
    }
}

impl<S: BackingStore + 'static> std::fmt::Debug for RamDisk<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RamDisk")
            .field("name", &self.name)
            .field("capacity", &self.device.capacity())
            .field("handle", &self.handle)
            .field("in_flight", &self.device.admission().in_flight())
            .field("metrics", &self.device.metrics().snapshot())
            .finish_non_exhaustive()
    }
}
