//! # Storage Layers
//!
//! This crate implements SectorFS's on-disk layers: the free-map sector
//! allocator, the inode layer and the directory layer, all tied to one
//! [`hal::BlockDevice`] by a [`Volume`].
//!
//! ## Design
//!
//! - **Volume layout**: sector 0 holds the free-map inode, sector 1 the root
//!   directory inode; everything else is allocatable.
//! - **Free map**: an in-memory bitmap, persisted as a file so a volume can be
//!   reattached later. While the backing file is open, allocations write the
//!   bitmap through before they are reported as successful.
//! - **Inodes**: one checksummed metadata record per object, in its own
//!   sector, describing a single contiguous run of data sectors. Records are
//!   immutable after creation.
//! - **Handles**: [`Inode`] and [`Dir`] are reference-counted open handles.
//!   Cloning reopens, dropping closes; an inode marked removed is released
//!   back to the free map when its last handle drops.
//! - **Directories**: a directory is a file of fixed-size entries mapping
//!   names to sector numbers and a type tag.

pub mod directory;
pub mod failing_device;
pub mod free_map;
pub mod inode;
pub mod volume;

pub use directory::{Dir, DirEntry, ENTRY_SIZE, NAME_MAX};
pub use failing_device::{FailingBlockDevice, FailurePolicy};
pub use free_map::FreeMap;
pub use inode::{Inode, InodeKind};
pub use volume::{StorageError, Volume, FREE_MAP_SECTOR, ROOT_DIR_SECTOR};
