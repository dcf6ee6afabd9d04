//! Directory layer
//!
//! A directory is an ordinary inode whose data is a table of fixed-size
//! entries mapping names to sector numbers and a type tag. Capacity is fixed
//! when the directory is created; a full table cannot grow.
//!
//! "." and ".." are never stored as entries. Self-reference is handle
//! identity, and the parent is recorded in the inode itself.

use crate::inode::{Inode, InodeKind};
use crate::volume::{StorageError, Volume, ROOT_DIR_SECTOR};
use hal::{BlockDevice, SectorNumber};
use std::fmt;

/// Size of one on-disk directory entry in bytes.
pub const ENTRY_SIZE: usize = 32;
/// Longest entry name, in bytes.
pub const NAME_MAX: usize = 26;

// On-disk entry layout:
//   [0]     used flag (0 = free slot)
//   [1]     kind tag (0 = file, 1 = directory)
//   [2..6]  sector number, little endian
//   [6..32] name, NUL padded

/// One directory entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub sector: SectorNumber,
    pub kind: InodeKind,
}

fn pack_entry(entry: &DirEntry) -> [u8; ENTRY_SIZE] {
    let mut buf = [0u8; ENTRY_SIZE];
    buf[0] = 1;
    buf[1] = match entry.kind {
        InodeKind::File => 0,
        InodeKind::Directory => 1,
    };
    buf[2..6].copy_from_slice(&entry.sector.to_le_bytes());
    buf[6..6 + entry.name.len()].copy_from_slice(entry.name.as_bytes());
    buf
}

fn unpack_entry(buf: &[u8; ENTRY_SIZE]) -> Option<DirEntry> {
    if buf[0] == 0 {
        return None;
    }
    let kind = if buf[1] == 1 {
        InodeKind::Directory
    } else {
        InodeKind::File
    };
    let sector = u32::from_le_bytes([buf[2], buf[3], buf[4], buf[5]]);
    let name_bytes = &buf[6..ENTRY_SIZE];
    let end = name_bytes
        .iter()
        .position(|&b| b == 0)
        .unwrap_or(NAME_MAX);
    let name = String::from_utf8_lossy(&name_bytes[..end]).into_owned();
    Some(DirEntry { name, sector, kind })
}

fn validate_name(name: &str) -> Result<(), StorageError> {
    if name.is_empty() || name.len() > NAME_MAX || name.contains('/') || name.contains('\0') {
        return Err(StorageError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Open handle to one directory.
///
/// Wraps an [`Inode`] known to be of directory kind; dropping the handle
/// closes it. [`Dir::reopen`] yields an independent handle to the same
/// directory.
pub struct Dir<D: BlockDevice> {
    inode: Inode<D>,
}

impl<D: BlockDevice> Dir<D> {
    /// Initializes a directory inode at `sector` with room for
    /// `entry_capacity` entries. Used at format time for the root and by
    /// directory creation.
    pub fn create(
        volume: &Volume<D>,
        sector: SectorNumber,
        entry_capacity: usize,
        parent: Option<SectorNumber>,
    ) -> Result<(), StorageError> {
        Inode::create(
            volume,
            sector,
            (entry_capacity * ENTRY_SIZE) as u64,
            InodeKind::Directory,
            parent,
        )
    }

    /// Wraps an open inode, refusing non-directories.
    pub fn open(inode: Inode<D>) -> Result<Self, StorageError> {
        if !inode.is_directory() {
            return Err(StorageError::NotADirectory(inode.sector()));
        }
        Ok(Self { inode })
    }

    /// Opens the directory whose inode record lives at `sector`.
    pub fn open_at(volume: &Volume<D>, sector: SectorNumber) -> Result<Self, StorageError> {
        Self::open(Inode::open(volume, sector)?)
    }

    /// Opens the singular root directory.
    pub fn open_root(volume: &Volume<D>) -> Result<Self, StorageError> {
        Self::open_at(volume, ROOT_DIR_SECTOR)
    }

    /// Returns a new independent handle to the same directory.
    pub fn reopen(&self) -> Self {
        Self {
            inode: self.inode.clone(),
        }
    }

    /// Consumes the handle, yielding the underlying inode handle.
    pub fn into_inode(self) -> Inode<D> {
        self.inode
    }

    pub fn sector(&self) -> SectorNumber {
        self.inode.sector()
    }

    pub fn is_root(&self) -> bool {
        self.sector() == ROOT_DIR_SECTOR
    }

    /// Sector of the parent directory's inode, `None` at the root.
    pub fn parent(&self) -> Option<SectorNumber> {
        self.inode.parent()
    }

    /// Number of entry slots in the fixed table.
    pub fn entry_capacity(&self) -> usize {
        self.inode.length() as usize / ENTRY_SIZE
    }

    fn read_slot(&self, index: usize) -> Result<Option<DirEntry>, StorageError> {
        let mut buf = [0u8; ENTRY_SIZE];
        let read = self
            .inode
            .read_at(&mut buf, (index * ENTRY_SIZE) as u64)?;
        if read < ENTRY_SIZE {
            return Ok(None);
        }
        Ok(unpack_entry(&buf))
    }

    fn write_slot(&self, index: usize, entry: Option<&DirEntry>) -> Result<(), StorageError> {
        let buf = match entry {
            Some(entry) => pack_entry(entry),
            None => [0u8; ENTRY_SIZE],
        };
        self.inode.write_at(&buf, (index * ENTRY_SIZE) as u64)?;
        Ok(())
    }

    /// Finds an entry by name.
    pub fn lookup(&self, name: &str) -> Result<Option<DirEntry>, StorageError> {
        for index in 0..self.entry_capacity() {
            if let Some(entry) = self.read_slot(index)? {
                if entry.name == name {
                    return Ok(Some(entry));
                }
            }
        }
        Ok(None)
    }

    /// All live entries, in slot order.
    pub fn entries(&self) -> Result<Vec<DirEntry>, StorageError> {
        let mut entries = Vec::new();
        for index in 0..self.entry_capacity() {
            if let Some(entry) = self.read_slot(index)? {
                entries.push(entry);
            }
        }
        Ok(entries)
    }

    pub fn entry_count(&self) -> Result<usize, StorageError> {
        Ok(self.entries()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, StorageError> {
        Ok(self.entry_count()? == 0)
    }

    /// Binds `name` to the inode at `sector`.
    ///
    /// Fails on invalid names, duplicates, and a full table.
    pub fn add_entry(
        &self,
        name: &str,
        sector: SectorNumber,
        kind: InodeKind,
    ) -> Result<(), StorageError> {
        validate_name(name)?;
        let mut free_slot = None;
        for index in 0..self.entry_capacity() {
            match self.read_slot(index)? {
                Some(entry) if entry.name == name => {
                    return Err(StorageError::AlreadyExists(entry.name));
                }
                Some(_) => {}
                None => {
                    if free_slot.is_none() {
                        free_slot = Some(index);
                    }
                }
            }
        }
        let index = free_slot.ok_or(StorageError::DirectoryFull)?;
        self.write_slot(
            index,
            Some(&DirEntry {
                name: name.to_string(),
                sector,
                kind,
            }),
        )
    }

    /// Removes the entry named `name` and marks its inode removed; the
    /// inode's sectors are released when its last open handle drops.
    ///
    /// An entry naming a directory can only be removed while that directory
    /// is empty.
    pub fn remove_entry(&self, name: &str) -> Result<(), StorageError> {
        let mut found = None;
        for index in 0..self.entry_capacity() {
            if let Some(entry) = self.read_slot(index)? {
                if entry.name == name {
                    found = Some((index, entry));
                    break;
                }
            }
        }
        let (index, entry) = found.ok_or_else(|| StorageError::NotFound(name.to_string()))?;

        let target = Inode::open(self.inode.volume(), entry.sector)?;
        if target.is_directory() {
            let subdir = Dir {
                inode: target.clone(),
            };
            if !subdir.is_empty()? {
                return Err(StorageError::NotEmpty);
            }
        }
        // Clear the slot first; if that fails the directory is unchanged.
        self.write_slot(index, None)?;
        target.mark_removed();
        Ok(())
    }
}

impl<D: BlockDevice> fmt::Debug for Dir<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dir").field("sector", &self.sector()).finish()
    }
}
