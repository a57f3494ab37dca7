// SPDX-License-Identifier: MIT

//! Per-device lifecycle: taste, attach, route, wither.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use sectorio::prelude::*;

use crate::errors::*;
use crate::header::GptHeader;
use crate::registry::{Partition, PartitionRegistry};
use crate::router::{self, Reply, Request};
use crate::summary::DiskSummary;
use crate::validator::{self, CopyKind, DiscoveryState, TasteOptions};

/// State shared between a device and the providers opened on it.
struct Shared {
    registry: RwLock<PartitionRegistry>,
    withered: AtomicBool,
}

impl Shared {
    fn read(&self) -> RwLockReadGuard<'_, PartitionRegistry> {
        self.registry.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, PartitionRegistry> {
        self.registry.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs `f` on partition `index` while holding the read side, so a
    /// concurrent teardown waits for the request to finish.
    fn with_partition<T>(
        &self,
        index: usize,
        f: impl FnOnce(&Partition) -> Result<T, RouteError>,
    ) -> Result<T, RouteError> {
        let reg = self.read();
        if self.withered.load(Ordering::Acquire) {
            return Err(RouteError::DeviceGone);
        }
        let part = reg
            .lookup_by_index(index)
            .ok_or(RouteError::NoSuchPartition(index))?;
        f(part)
    }

    /// Clears the registry. Returns `false` if it was already withered.
    fn wither(&self) -> bool {
        let mut reg = self.write();
        let first = !self.withered.swap(true, Ordering::AcqRel);
        reg.clear();
        first
    }
}

/// A GPT-partitioned device with its partitions attached.
pub struct GptGeom {
    name: String,
    header: GptHeader,
    state: DiscoveryState,
    sector_size: u64,
    shared: Arc<Shared>,
}

impl GptGeom {
    /// Examines `provider` and attaches its partitions if it holds a usable GPT.
    ///
    /// Failures are logged once: quietly when the disk is simply not ours,
    /// loudly when a GPT is present but unusable.
    pub fn taste(
        name: &str,
        provider: Arc<dyn SectorIO>,
        opts: &TasteOptions,
    ) -> Result<Self, TasteError> {
        let found = match validator::discover(name, provider.as_ref(), opts) {
            Ok(found) => found,
            Err(e) if e.is_foreign() => {
                log::debug!("GPT: {name}: not claimed: {e}");
                return Err(e);
            }
            Err(e) => {
                log::error!("GPT: {name}: {e}; no partitions exposed, recovery is recommended");
                return Err(e);
            }
        };

        let mut registry = PartitionRegistry::new(name, provider);
        registry
            .populate(&found.entries, found.sector_size)
            .map_err(|_| TasteError::Geometry("partition offsets overflow"))?;

        if found.state.needs_recovery() {
            log::warn!(
                "GPT: {name}: GPT is damaged (primary {}, secondary {}); recovery is recommended",
                found.state.primary,
                found.state.secondary
            );
        }
        if let Some(source) = found.state.table_source {
            log::info!(
                "GPT: {name}: attached {} partition(s), table from {source} copy",
                registry.len()
            );
        }

        Ok(Self {
            name: name.to_string(),
            header: found.header,
            state: found.state,
            sector_size: found.sector_size,
            shared: Arc::new(Shared {
                registry: RwLock::new(registry),
                withered: AtomicBool::new(false),
            }),
        })
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The trusted header; see [`GptGeom::table_source`] for where the
    /// entries were read from.
    #[inline]
    pub fn header(&self) -> &GptHeader {
        &self.header
    }

    #[inline]
    pub fn state(&self) -> &DiscoveryState {
        &self.state
    }

    #[inline]
    pub fn table_source(&self) -> Option<CopyKind> {
        self.state.table_source
    }

    #[inline]
    pub fn needs_recovery(&self) -> bool {
        self.state.needs_recovery()
    }

    #[inline]
    pub fn sector_size(&self) -> u64 {
        self.sector_size
    }

    #[inline]
    pub fn is_withered(&self) -> bool {
        self.shared.withered.load(Ordering::Acquire)
    }

    /// Snapshot of the attached partitions, empty once withered.
    pub fn partitions(&self) -> Vec<Partition> {
        self.shared.read().all().cloned().collect()
    }

    pub fn summary(&self) -> DiskSummary {
        DiskSummary {
            name: self.name.clone(),
            sector_size: self.sector_size,
            disk_guid: self.header.disk_guid,
            state: self.state,
            partitions: self.partitions(),
        }
    }

    /// Routes one request to partition `index`.
    pub fn start(&self, index: usize, req: Request<'_>) -> Result<Reply, RouteError> {
        self.shared.with_partition(index, |p| router::route(p, req))
    }

    /// Opens partition `index` as a block device of its own.
    pub fn open(&self, index: usize) -> Result<PartitionProvider, RouteError> {
        let (name, length) = self
            .shared
            .with_partition(index, |p| Ok((p.name.clone(), p.byte_length)))?;
        Ok(PartitionProvider {
            shared: Arc::clone(&self.shared),
            index,
            name,
            sector_size: self.sector_size,
            length,
        })
    }

    /// The backing device went away.
    pub fn orphan(&self) {
        if self.shared.wither() {
            log::warn!("GPT: {}: provider orphaned, partitions withdrawn", self.name);
        }
    }

    /// The raw device was opened for writing elsewhere; our view is stale.
    pub fn spoiled(&self) {
        if self.shared.wither() {
            log::warn!("GPT: {}: provider spoiled, partitions withdrawn", self.name);
        }
    }

    pub fn destroy(self) {
        if self.shared.wither() {
            log::info!("GPT: {}: destroyed", self.name);
        }
    }
}

impl Drop for GptGeom {
    fn drop(&mut self) {
        self.shared.wither();
    }
}

/// Block-device view of one partition.
///
/// Unlike [`GptGeom::start`], reads and writes must fit the partition
/// entirely. Every operation fails once the device has withered.
#[derive(Clone)]
pub struct PartitionProvider {
    shared: Arc<Shared>,
    index: usize,
    name: String,
    sector_size: u64,
    length: u64,
}

impl PartitionProvider {
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Routes `req` with the partition-relative semantics of the router.
    pub fn start(&self, req: Request<'_>) -> Result<Reply, RouteError> {
        self.shared.with_partition(self.index, |p| router::route(p, req))
    }

    fn check_fit(&self, offset: u64, len: usize) -> Result<(), RouteError> {
        match offset.checked_add(len as u64) {
            Some(end) if end <= self.length => Ok(()),
            _ => Err(RouteError::OutOfRange),
        }
    }
}

impl core::fmt::Debug for PartitionProvider {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PartitionProvider")
            .field("name", &self.name)
            .field("index", &self.index)
            .field("length", &self.length)
            .finish_non_exhaustive()
    }
}

impl SectorIO for PartitionProvider {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> BlockIOResult {
        self.check_fit(offset, buf.len())?;
        self.start(Request::Read { offset, buf })?;
        Ok(())
    }

    fn write_at(&self, offset: u64, data: &[u8]) -> BlockIOResult {
        self.check_fit(offset, data.len())?;
        self.start(Request::Write { offset, data })?;
        Ok(())
    }

    fn flush(&self) -> BlockIOResult {
        self.start(Request::Flush)?;
        Ok(())
    }

    #[inline]
    fn sector_size(&self) -> u64 {
        self.sector_size
    }

    #[inline]
    fn media_size(&self) -> u64 {
        self.length
    }

    fn get_attr(&self, name: &str) -> Option<u64> {
        match self.start(Request::GetAttr(name)) {
            Ok(Reply::Attr(v)) => v,
            _ => None,
        }
    }
}
