//! Inode layer: on-disk metadata records and open-inode handles
//!
//! Each object (file or directory) is described by one [`InodeRecord`] living
//! alone in its sector: a JSON document with a crc32 checksum, NUL-padded to
//! the sector size. The record names a single contiguous run of data sectors.
//! Records are immutable once written; there is no file growth.
//!
//! [`Inode`] is a reference-counted open handle. Opening the same sector
//! twice shares one table slot; the slot's removed flag defers deletion until
//! the last handle drops.

use crate::volume::{lock, StorageError, Volume};
use hal::{BlockDevice, SectorNumber, SECTOR_SIZE};
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;

/// Type tag carried by every inode record and directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InodeKind {
    File,
    Directory,
}

/// On-disk inode metadata.
///
/// `start` is 0 when `length` is 0 (no data sectors). `parent` is the sector
/// of the containing directory's inode, 0 at the root — this is what parent
/// traversal resolves through; no directory ever stores a "." or ".." entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct InodeRecord {
    pub(crate) start: SectorNumber,
    pub(crate) length: u64,
    pub(crate) kind: InodeKind,
    pub(crate) parent: SectorNumber,
    pub(crate) checksum: u32,
}

impl InodeRecord {
    pub(crate) fn new(
        start: SectorNumber,
        length: u64,
        kind: InodeKind,
        parent: SectorNumber,
    ) -> Self {
        let mut record = Self {
            start,
            length,
            kind,
            parent,
            checksum: 0,
        };
        record.checksum = record.compute_checksum();
        record
    }

    /// crc32 of the record serialized with the checksum field zeroed.
    fn compute_checksum(&self) -> u32 {
        let mut temp = self.clone();
        temp.checksum = 0;
        let data = serde_json::to_vec(&temp).unwrap_or_default();
        crc32fast::hash(&data)
    }

    fn is_valid(&self) -> bool {
        self.compute_checksum() == self.checksum
    }

    /// Number of data sectors backing this record.
    pub(crate) fn data_sectors(&self) -> u32 {
        ((self.length + SECTOR_SIZE as u64 - 1) / SECTOR_SIZE as u64) as u32
    }

    /// Serializes into a full sector, NUL-padded after the JSON document.
    pub(crate) fn encode(&self) -> Option<[u8; SECTOR_SIZE]> {
        let json = serde_json::to_vec(self).ok()?;
        if json.len() >= SECTOR_SIZE {
            return None;
        }
        let mut buf = [0u8; SECTOR_SIZE];
        buf[..json.len()].copy_from_slice(&json);
        Some(buf)
    }

    /// Parses a sector buffer; `None` on empty, malformed, or checksum
    /// mismatch.
    pub(crate) fn decode(buf: &[u8]) -> Option<Self> {
        let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
        if end == 0 {
            return None;
        }
        let record: Self = serde_json::from_slice(&buf[..end]).ok()?;
        record.is_valid().then_some(record)
    }
}

struct OpenSlot {
    count: usize,
    removed: bool,
    record: InodeRecord,
}

/// Table of currently open inodes, keyed by record sector.
pub(crate) struct InodeTable {
    open: HashMap<SectorNumber, OpenSlot>,
}

impl InodeTable {
    pub(crate) fn new() -> Self {
        Self {
            open: HashMap::new(),
        }
    }

    pub(crate) fn open_count(&self) -> usize {
        self.open.len()
    }
}

/// Reference-counted handle to one open inode.
///
/// `Clone` reopens (another reference to the same slot); `Drop` closes. When
/// the last handle to an inode marked removed drops, its data run and its
/// record sector are released back to the free map.
pub struct Inode<D: BlockDevice> {
    volume: Volume<D>,
    sector: SectorNumber,
    record: InodeRecord,
}

impl<D: BlockDevice> Inode<D> {
    /// Initializes a new inode record at `sector` (already allocated by the
    /// caller), allocating and zeroing its data run.
    ///
    /// On failure the data run is released again; the record sector itself
    /// stays owned by the caller, who decides whether to release or retry.
    pub fn create(
        volume: &Volume<D>,
        sector: SectorNumber,
        length: u64,
        kind: InodeKind,
        parent: Option<SectorNumber>,
    ) -> Result<(), StorageError> {
        let record = {
            let data_sectors = ((length + SECTOR_SIZE as u64 - 1) / SECTOR_SIZE as u64) as u32;
            let start = if data_sectors > 0 {
                volume.allocate_sectors(data_sectors)?
            } else {
                0
            };
            let record = InodeRecord::new(start, length, kind, parent.unwrap_or(0));
            if data_sectors > 0 {
                if let Err(err) = volume.inner.zero_sectors(start, data_sectors) {
                    volume.release_sectors(start, data_sectors);
                    return Err(err);
                }
            }
            record
        };
        if let Err(err) = volume.inner.write_record(sector, &record) {
            let data_sectors = record.data_sectors();
            if data_sectors > 0 {
                volume.release_sectors(record.start, data_sectors);
            }
            return Err(err);
        }
        Ok(())
    }

    /// Opens the inode at `sector`, reading and validating its record unless
    /// it is already open.
    pub fn open(volume: &Volume<D>, sector: SectorNumber) -> Result<Self, StorageError> {
        let mut table = lock(&volume.inner.inodes);
        let record = match table.open.entry(sector) {
            Entry::Occupied(mut occupied) => {
                let slot = occupied.get_mut();
                slot.count += 1;
                slot.record.clone()
            }
            Entry::Vacant(vacant) => {
                let record = volume.inner.read_record(sector)?;
                vacant.insert(OpenSlot {
                    count: 1,
                    removed: false,
                    record: record.clone(),
                });
                record
            }
        };
        drop(table);
        Ok(Self {
            volume: volume.clone(),
            sector,
            record,
        })
    }

    /// Sector holding this inode's record.
    pub fn sector(&self) -> SectorNumber {
        self.sector
    }

    pub fn kind(&self) -> InodeKind {
        self.record.kind
    }

    pub fn is_directory(&self) -> bool {
        self.record.kind == InodeKind::Directory
    }

    /// Object length in bytes.
    pub fn length(&self) -> u64 {
        self.record.length
    }

    /// Sector of the containing directory's inode, `None` at the root.
    pub fn parent(&self) -> Option<SectorNumber> {
        (self.record.parent != 0).then_some(self.record.parent)
    }

    /// Flags this inode for deletion when the last handle drops.
    pub fn mark_removed(&self) {
        let mut table = lock(&self.volume.inner.inodes);
        if let Some(slot) = table.open.get_mut(&self.sector) {
            slot.removed = true;
        }
    }

    /// Reads up to `buf.len()` bytes at `offset`, clamped to the object
    /// length. Returns the number of bytes read.
    pub fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize, StorageError> {
        self.volume.inner.read_span(&self.record, offset, buf)
    }

    /// Writes `data` at `offset`, clamped to the object length (no growth).
    /// Returns the number of bytes written.
    pub fn write_at(&self, data: &[u8], offset: u64) -> Result<usize, StorageError> {
        self.volume.inner.write_span(&self.record, offset, data)
    }

    pub(crate) fn volume(&self) -> &Volume<D> {
        &self.volume
    }
}

impl<D: BlockDevice> fmt::Debug for Inode<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Inode")
            .field("sector", &self.sector)
            .field("kind", &self.record.kind)
            .field("length", &self.record.length)
            .finish()
    }
}

impl<D: BlockDevice> Clone for Inode<D> {
    fn clone(&self) -> Self {
        let mut table = lock(&self.volume.inner.inodes);
        if let Some(slot) = table.open.get_mut(&self.sector) {
            slot.count += 1;
        }
        drop(table);
        Self {
            volume: self.volume.clone(),
            sector: self.sector,
            record: self.record.clone(),
        }
    }
}

impl<D: BlockDevice> Drop for Inode<D> {
    fn drop(&mut self) {
        let mut table = lock(&self.volume.inner.inodes);
        let mut last_close = None;
        match table.open.get_mut(&self.sector) {
            Some(slot) => {
                slot.count -= 1;
                if slot.count == 0 {
                    last_close = Some(slot.removed);
                }
            }
            None => warn!("close of inode {} with no open slot", self.sector),
        }
        if last_close.is_some() {
            table.open.remove(&self.sector);
        }
        drop(table);
        if last_close == Some(true) {
            let data_sectors = self.record.data_sectors();
            if data_sectors > 0 {
                self.volume.release_sectors(self.record.start, data_sectors);
            }
            self.volume.release_sectors(self.sector, 1);
        }
    }
}
