//! Open file handles
//!
//! [`File`] is a thin handle over an open inode. Content I/O lives below
//! this crate; the handle exists so an open object stays alive (and its
//! sectors stay allocated, even across removal) until the caller drops it.

use hal::{BlockDevice, SectorNumber};
use std::fmt;
use storage::Inode;

/// Handle to one open file-system object.
pub struct File<D: BlockDevice> {
    inode: Inode<D>,
}

impl<D: BlockDevice> File<D> {
    pub(crate) fn new(inode: Inode<D>) -> Self {
        Self { inode }
    }

    /// Object length in bytes.
    pub fn length(&self) -> u64 {
        self.inode.length()
    }

    /// Sector holding the object's inode record.
    pub fn sector(&self) -> SectorNumber {
        self.inode.sector()
    }

    /// Whether the handle was opened over a directory inode.
    pub fn is_directory(&self) -> bool {
        self.inode.is_directory()
    }

    /// Returns a new independent handle to the same object.
    pub fn reopen(&self) -> Self {
        Self {
            inode: self.inode.clone(),
        }
    }
}

impl<D: BlockDevice> fmt::Debug for File<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("File").field("inode", &self.inode).finish()
    }
}
