//! Volume: one block device plus the allocator and open-inode state
//!
//! A [`Volume`] ties a [`hal::BlockDevice`] to the free map and the
//! open-inode table. Handles ([`crate::Inode`], [`crate::Dir`]) hold a clone
//! of the volume, so the shared state lives as long as any handle does.
//!
//! Lock order, where more than one lock is taken: inode table, then free map,
//! then device.

use crate::free_map::FreeMap;
use crate::inode::{Inode, InodeKind, InodeRecord, InodeTable};
use hal::{BlockDevice, BlockError, SectorNumber, SECTOR_SIZE};
use log::{debug, warn};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

/// Sector holding the free-map file's inode record.
pub const FREE_MAP_SECTOR: SectorNumber = 0;
/// Sector holding the root directory's inode record.
pub const ROOT_DIR_SECTOR: SectorNumber = 1;

/// Smallest device a volume will attach to: the two reserved records, one
/// bitmap sector, one root-directory data sector, and room to allocate.
const MIN_VOLUME_SECTORS: u32 = 8;

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Errors from the allocator, inode and directory layers.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StorageError {
    /// Device-level failure
    #[error("device error: {0}")]
    Device(#[from] BlockError),

    /// Device unusable at attach time
    #[error("device too small: {0} sectors")]
    DeviceTooSmall(u32),

    /// Allocator has no run of free sectors of the requested length
    #[error("no free sectors left")]
    NoFreeSpace,

    /// On-disk record missing, corrupt, or failed its checksum
    #[error("invalid on-disk record at sector {0}")]
    InvalidRecord(SectorNumber),

    /// Expected a directory inode
    #[error("sector {0} does not hold a directory")]
    NotADirectory(SectorNumber),

    /// Directory entry with this name already exists
    #[error("entry already exists: {0}")]
    AlreadyExists(String),

    /// No directory entry with this name
    #[error("entry not found: {0}")]
    NotFound(String),

    /// Name is empty, too long, or contains a separator or NUL
    #[error("invalid entry name: {0:?}")]
    InvalidName(String),

    /// Directory's fixed entry table has no free slot
    #[error("directory full")]
    DirectoryFull,

    /// Refusing to remove a directory that still has entries
    #[error("directory not empty")]
    NotEmpty,
}

pub(crate) struct FreeMapState {
    pub(crate) map: FreeMap,
    /// Record of the free-map file once it exists on disk. While this is set,
    /// bitmap changes are written through.
    pub(crate) backing: Option<InodeRecord>,
}

pub(crate) struct VolumeInner<D: BlockDevice> {
    pub(crate) device: Mutex<D>,
    pub(crate) free_map: Mutex<FreeMapState>,
    pub(crate) inodes: Mutex<InodeTable>,
}

/// Shared handle to one attached device and its allocator/inode state.
pub struct Volume<D: BlockDevice> {
    pub(crate) inner: Arc<VolumeInner<D>>,
}

impl<D: BlockDevice> Clone for Volume<D> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<D: BlockDevice> Volume<D> {
    /// Attaches to a device.
    ///
    /// The in-memory free map starts with only the two reserved record
    /// sectors marked; the persistent bitmap is loaded separately with
    /// [`Volume::open_free_map`].
    pub fn attach(device: D) -> Result<Self, StorageError> {
        let sectors = device.sector_count();
        if sectors < MIN_VOLUME_SECTORS {
            return Err(StorageError::DeviceTooSmall(sectors));
        }
        let mut map = FreeMap::new(sectors);
        map.mark_used(FREE_MAP_SECTOR);
        map.mark_used(ROOT_DIR_SECTOR);
        Ok(Self {
            inner: Arc::new(VolumeInner {
                device: Mutex::new(device),
                free_map: Mutex::new(FreeMapState { map, backing: None }),
                inodes: Mutex::new(InodeTable::new()),
            }),
        })
    }

    /// Reserves `count` contiguous sectors. The returned sector number is
    /// always non-zero: sector 0 is reserved at attach time.
    ///
    /// While the free map has an on-disk backing, the updated bitmap is
    /// written through before the allocation is reported; if that write
    /// fails the sectors are returned to the pool and the call fails, so a
    /// successful return never leaves disk and memory disagreeing.
    pub fn allocate_sectors(&self, count: u32) -> Result<SectorNumber, StorageError> {
        let mut state = lock(&self.inner.free_map);
        let start = state.map.allocate(count).ok_or(StorageError::NoFreeSpace)?;
        if let Some(record) = state.backing.clone() {
            if let Err(err) = self.inner.persist_free_map(&state.map, &record) {
                state.map.release(start, count);
                return Err(err);
            }
        }
        Ok(start)
    }

    /// Returns `count` sectors starting at `start` to the free pool.
    ///
    /// Release itself cannot fail; a failed bitmap write-through is logged
    /// and retried by the next successful persist.
    pub fn release_sectors(&self, start: SectorNumber, count: u32) {
        if count == 0 {
            return;
        }
        let mut state = lock(&self.inner.free_map);
        state.map.release(start, count);
        if let Some(record) = state.backing.clone() {
            if let Err(err) = self.inner.persist_free_map(&state.map, &record) {
                warn!("free map write-through failed after releasing {count} sectors at {start}: {err}");
            }
        }
    }

    /// Number of free sectors remaining.
    pub fn free_sector_count(&self) -> u32 {
        lock(&self.inner.free_map).map.free_count()
    }

    /// Number of distinct inodes currently open.
    pub fn open_inode_count(&self) -> usize {
        lock(&self.inner.inodes).open_count()
    }

    /// Creates the free-map file on a fresh volume and writes the current
    /// bitmap into it. From here on, bitmap changes are written through.
    pub fn create_free_map(&self) -> Result<(), StorageError> {
        let byte_len = lock(&self.inner.free_map).map.byte_len() as u64;
        Inode::create(self, FREE_MAP_SECTOR, byte_len, InodeKind::File, None)?;
        let record = self.inner.read_record(FREE_MAP_SECTOR)?;
        let mut state = lock(&self.inner.free_map);
        self.inner.persist_free_map(&state.map, &record)?;
        state.backing = Some(record);
        debug!("free map created, bitmap of {byte_len} bytes");
        Ok(())
    }

    /// Loads the persistent bitmap from the free-map file, replacing the
    /// in-memory map.
    pub fn open_free_map(&self) -> Result<(), StorageError> {
        let record = self.inner.read_record(FREE_MAP_SECTOR)?;
        let mut bytes = vec![0u8; record.length as usize];
        self.inner.read_span(&record, 0, &mut bytes)?;
        let mut state = lock(&self.inner.free_map);
        let sectors = state.map.sector_count();
        state.map = FreeMap::from_bytes(sectors, &bytes);
        state.backing = Some(record);
        debug!("free map opened, {} sectors free", state.map.free_count());
        Ok(())
    }

    /// Writes the bitmap out and flushes the device, making the allocator
    /// state durable.
    pub fn close_free_map(&self) -> Result<(), StorageError> {
        {
            let state = lock(&self.inner.free_map);
            if let Some(record) = state.backing.clone() {
                self.inner.persist_free_map(&state.map, &record)?;
            }
        }
        lock(&self.inner.device).flush()?;
        Ok(())
    }
}

impl<D: BlockDevice> VolumeInner<D> {
    pub(crate) fn read_record(&self, sector: SectorNumber) -> Result<InodeRecord, StorageError> {
        let mut buf = [0u8; SECTOR_SIZE];
        lock(&self.device).read_sector(sector, &mut buf)?;
        InodeRecord::decode(&buf).ok_or(StorageError::InvalidRecord(sector))
    }

    pub(crate) fn write_record(
        &self,
        sector: SectorNumber,
        record: &InodeRecord,
    ) -> Result<(), StorageError> {
        let buf = record
            .encode()
            .ok_or(StorageError::InvalidRecord(sector))?;
        lock(&self.device).write_sector(sector, &buf)?;
        Ok(())
    }

    /// Reads from a record's data run, clamped to the record's length.
    pub(crate) fn read_span(
        &self,
        record: &InodeRecord,
        offset: u64,
        buf: &mut [u8],
    ) -> Result<usize, StorageError> {
        if offset >= record.length {
            return Ok(0);
        }
        let end = record.length.min(offset + buf.len() as u64);
        let mut device = lock(&self.device);
        let mut sector_buf = [0u8; SECTOR_SIZE];
        let mut pos = offset;
        let mut done = 0usize;
        while pos < end {
            let sector = record.start + (pos / SECTOR_SIZE as u64) as u32;
            let within = (pos % SECTOR_SIZE as u64) as usize;
            let chunk = ((SECTOR_SIZE - within) as u64).min(end - pos) as usize;
            device.read_sector(sector, &mut sector_buf)?;
            buf[done..done + chunk].copy_from_slice(&sector_buf[within..within + chunk]);
            pos += chunk as u64;
            done += chunk;
        }
        Ok(done)
    }

    /// Writes into a record's data run, clamped to the record's length.
    /// Partial sectors are read-modified-written.
    pub(crate) fn write_span(
        &self,
        record: &InodeRecord,
        offset: u64,
        data: &[u8],
    ) -> Result<usize, StorageError> {
        if offset >= record.length {
            return Ok(0);
        }
        let end = record.length.min(offset + data.len() as u64);
        let mut device = lock(&self.device);
        let mut sector_buf = [0u8; SECTOR_SIZE];
        let mut pos = offset;
        let mut done = 0usize;
        while pos < end {
            let sector = record.start + (pos / SECTOR_SIZE as u64) as u32;
            let within = (pos % SECTOR_SIZE as u64) as usize;
            let chunk = ((SECTOR_SIZE - within) as u64).min(end - pos) as usize;
            if chunk == SECTOR_SIZE {
                sector_buf.copy_from_slice(&data[done..done + SECTOR_SIZE]);
            } else {
                device.read_sector(sector, &mut sector_buf)?;
                sector_buf[within..within + chunk].copy_from_slice(&data[done..done + chunk]);
            }
            device.write_sector(sector, &sector_buf)?;
            pos += chunk as u64;
            done += chunk;
        }
        Ok(done)
    }

    pub(crate) fn zero_sectors(
        &self,
        start: SectorNumber,
        count: u32,
    ) -> Result<(), StorageError> {
        let zeros = [0u8; SECTOR_SIZE];
        let mut device = lock(&self.device);
        for sector in start..start + count {
            device.write_sector(sector, &zeros)?;
        }
        Ok(())
    }

    pub(crate) fn persist_free_map(
        &self,
        map: &FreeMap,
        record: &InodeRecord,
    ) -> Result<(), StorageError> {
        let bytes = map.to_bytes();
        self.write_span(record, 0, &bytes)?;
        Ok(())
    }
}
