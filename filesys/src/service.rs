//! File-system operations and lifecycle
//!
//! [`FileSystem`] orchestrates create, open, remove and change-directory on
//! top of the resolver and the storage layers. Each operation resolves the
//! containing directory, extracts the leaf name, acts through the
//! directory/inode/allocator interfaces, and releases every handle it
//! acquired.

use crate::context::FsContext;
use crate::file::File;
use crate::operations::OperationError;
use crate::path;
use crate::resolver::resolve_containing;
use hal::BlockDevice;
use log::{debug, info};
use storage::{Dir, Inode, InodeKind, StorageError, Volume, ROOT_DIR_SECTOR};

/// Entry capacity the root directory is formatted with.
pub const ROOT_ENTRY_CAPACITY: usize = 16;

/// One mounted file system.
pub struct FileSystem<D: BlockDevice> {
    volume: Volume<D>,
}

impl<D: BlockDevice> FileSystem<D> {
    /// Attaches to `device` and brings the file system up.
    ///
    /// With `format` set, a fresh free map and an empty root directory are
    /// written first; the free map is then closed so the new bitmap is on
    /// disk before it is opened for use. Without `format`, the device must
    /// already hold a formatted volume.
    pub fn init(device: D, format: bool) -> Result<Self, OperationError> {
        let volume = Volume::attach(device)?;
        let fs = Self { volume };
        if format {
            fs.format()?;
        }
        fs.volume.open_free_map()?;
        Ok(fs)
    }

    fn format(&self) -> Result<(), OperationError> {
        info!("formatting file system");
        self.volume.create_free_map()?;
        Dir::create(&self.volume, ROOT_DIR_SECTOR, ROOT_ENTRY_CAPACITY, None)?;
        self.volume.close_free_map()?;
        Ok(())
    }

    /// Flushes the allocator state so it is durable. The file system remains
    /// usable afterwards; call this before dropping the last reference if
    /// the device outlives the process state.
    pub fn done(&self) -> Result<(), OperationError> {
        self.volume.close_free_map()?;
        Ok(())
    }

    /// A fresh resolution context for one caller (no current directory).
    pub fn context(&self) -> FsContext<D> {
        FsContext::new()
    }

    /// Creates a file or directory of `size` bytes at `path`.
    ///
    /// The steps run in order: resolve the containing directory, allocate a
    /// sector for the inode record, initialize the record (with its data
    /// run), bind the leaf name in the directory. A failure at any later
    /// step releases everything the earlier steps acquired, so a failed
    /// create never costs a sector.
    pub fn create(
        &self,
        ctx: &FsContext<D>,
        path: &str,
        size: u64,
        is_directory: bool,
    ) -> Result<(), OperationError> {
        let name = path::leaf_name(path);
        if path::is_reserved_name(name) {
            return Err(OperationError::ReservedName(name.to_string()));
        }
        let dir = resolve_containing(&self.volume, ctx, path)?;

        let kind = if is_directory {
            InodeKind::Directory
        } else {
            InodeKind::File
        };
        let sector = self.volume.allocate_sectors(1)?;
        if let Err(err) = Inode::create(&self.volume, sector, size, kind, Some(dir.sector())) {
            self.volume.release_sectors(sector, 1);
            return Err(err.into());
        }
        if let Err(err) = dir.add_entry(name, sector, kind) {
            debug!("create {path:?} failed at entry add, rolling back sector {sector}");
            match Inode::open(&self.volume, sector) {
                Ok(inode) => inode.mark_removed(),
                Err(_) => self.volume.release_sectors(sector, 1),
            }
            return Err(match err {
                StorageError::AlreadyExists(name) => OperationError::AlreadyExists(name),
                other => other.into(),
            });
        }
        Ok(())
    }

    /// Opens the object at `path`.
    ///
    /// An empty or "." leaf opens the resolved directory itself; ".." opens
    /// its parent. The returned handle keeps the object alive until dropped.
    pub fn open(&self, ctx: &FsContext<D>, path: &str) -> Result<File<D>, OperationError> {
        let dir = resolve_containing(&self.volume, ctx, path)?;
        let inode = match path::leaf_name(path) {
            "" | "." => dir.reopen().into_inode(),
            ".." => {
                let parent = dir
                    .parent()
                    .ok_or_else(|| OperationError::NotFound("..".to_string()))?;
                Inode::open(&self.volume, parent)?
            }
            name => {
                let entry = dir
                    .lookup(name)?
                    .ok_or_else(|| OperationError::NotFound(name.to_string()))?;
                Inode::open(&self.volume, entry.sector)?
            }
        };
        Ok(File::new(inode))
    }

    /// Removes the entry at `path`.
    ///
    /// The directory layer owns the inode lifecycle: the entry disappears
    /// now, the inode's sectors return to the free map when its last open
    /// handle drops. Removing a non-empty directory fails.
    pub fn remove(&self, ctx: &FsContext<D>, path: &str) -> Result<(), OperationError> {
        let name = path::leaf_name(path);
        if path::is_reserved_name(name) {
            return Err(OperationError::ReservedName(name.to_string()));
        }
        let dir = resolve_containing(&self.volume, ctx, path)?;
        dir.remove_entry(name).map_err(|err| match err {
            StorageError::NotFound(name) => OperationError::NotFound(name),
            other => other.into(),
        })
    }

    /// Changes the context's current directory to `path`.
    ///
    /// On success the previous current-directory handle is closed and the
    /// new one installed; on failure the context is untouched.
    pub fn change_directory(
        &self,
        ctx: &mut FsContext<D>,
        path: &str,
    ) -> Result<(), OperationError> {
        let dir = resolve_containing(&self.volume, ctx, path)?;
        let next = match path::leaf_name(path) {
            ".." => {
                let parent = dir
                    .parent()
                    .ok_or_else(|| OperationError::NotFound("..".to_string()))?;
                Dir::open_at(&self.volume, parent)?
            }
            "" | "." => dir.reopen(),
            name => {
                let entry = dir
                    .lookup(name)?
                    .ok_or_else(|| OperationError::NotFound(name.to_string()))?;
                if entry.kind != InodeKind::Directory {
                    return Err(OperationError::NotADirectory(name.to_string()));
                }
                Dir::open_at(&self.volume, entry.sector)?
            }
        };
        ctx.set_current(next);
        Ok(())
    }

    /// Number of free sectors in the allocator.
    pub fn free_sector_count(&self) -> u32 {
        self.volume.free_sector_count()
    }

    /// Number of distinct inodes currently open.
    pub fn open_inode_count(&self) -> usize {
        self.volume.open_inode_count()
    }

    /// The underlying volume, for layered callers and tests.
    pub fn volume(&self) -> &Volume<D> {
        &self.volume
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hal::RamDisk;
    use std::sync::{Arc, Mutex};

    fn fresh_fs() -> FileSystem<RamDisk> {
        FileSystem::init(RamDisk::new(256), true).unwrap()
    }

    #[test]
    fn test_init_format_leaves_empty_root() {
        let fs = fresh_fs();
        let ctx = fs.context();
        let root = resolve_containing(fs.volume(), &ctx, "/").unwrap();
        assert!(root.is_root());
        assert!(root.is_empty().unwrap());
    }

    #[test]
    fn test_init_without_format_on_blank_device_fails() {
        let result = FileSystem::init(RamDisk::new(256), false);
        assert!(result.is_err());
    }

    #[test]
    fn test_create_and_open_file() {
        let fs = fresh_fs();
        let ctx = fs.context();

        fs.create(&ctx, "/hello", 100, false).unwrap();
        let file = fs.open(&ctx, "/hello").unwrap();
        assert_eq!(file.length(), 100);
        assert!(!file.is_directory());

        drop(file);
        drop(ctx);
        assert_eq!(fs.open_inode_count(), 0);
    }

    #[test]
    fn test_create_in_subdirectory() {
        let fs = fresh_fs();
        let ctx = fs.context();

        fs.create(&ctx, "/a", 512, true).unwrap();
        fs.create(&ctx, "/a/b", 10, false).unwrap();

        let dir = resolve_containing(fs.volume(), &ctx, "/a/b").unwrap();
        let entry = dir.lookup("b").unwrap().unwrap();
        assert_eq!(entry.kind, InodeKind::File);
    }

    #[test]
    fn test_descent_and_duplicate() {
        let fs = fresh_fs();
        let ctx = fs.context();
        fs.create(&ctx, "/a", 512, true).unwrap();
        fs.create(&ctx, "/a/b", 10, false).unwrap();

        // A sibling create succeeds and is visible inside "a".
        fs.create(&ctx, "/a/b2", 10, false).unwrap();
        let a = resolve_containing(fs.volume(), &ctx, "/a/x").unwrap();
        assert!(a.lookup("b2").unwrap().is_some());
        drop(a);

        // Creating it again fails and costs nothing.
        let before = fs.free_sector_count();
        assert_eq!(
            fs.create(&ctx, "/a/b2", 10, false),
            Err(OperationError::AlreadyExists("b2".to_string()))
        );
        assert_eq!(fs.free_sector_count(), before);
        drop(ctx);
        assert_eq!(fs.open_inode_count(), 0);
    }

    #[test]
    fn test_create_reserved_names_fail() {
        let fs = fresh_fs();
        let ctx = fs.context();
        fs.create(&ctx, "/foo", 512, true).unwrap();

        let before = fs.free_sector_count();
        for p in ["/foo/.", "/foo/..", ".", ".."] {
            assert!(matches!(
                fs.create(&ctx, p, 10, false),
                Err(OperationError::ReservedName(_))
            ));
        }
        assert_eq!(fs.free_sector_count(), before);
    }

    #[test]
    fn test_create_unresolvable_path_fails() {
        let fs = fresh_fs();
        let ctx = fs.context();
        let before = fs.free_sector_count();
        assert_eq!(
            fs.create(&ctx, "/missing/file", 10, false),
            Err(OperationError::NotFound("missing".to_string()))
        );
        assert_eq!(fs.free_sector_count(), before);
    }

    #[test]
    fn test_create_device_full_rolls_back() {
        let fs = fresh_fs();
        let ctx = fs.context();
        let before = fs.free_sector_count();
        // Far more data sectors than the disk has.
        let err = fs.create(&ctx, "/big", 10 << 20, false).unwrap_err();
        assert_eq!(err, OperationError::Storage(StorageError::NoFreeSpace));
        assert_eq!(fs.free_sector_count(), before);
    }

    #[test]
    fn test_create_full_directory_rolls_back() {
        let fs = fresh_fs();
        let ctx = fs.context();
        // Room for exactly one entry.
        fs.create(&ctx, "/tiny", 32, true).unwrap();
        fs.create(&ctx, "/tiny/only", 0, false).unwrap();

        let before = fs.free_sector_count();
        let err = fs.create(&ctx, "/tiny/more", 0, false).unwrap_err();
        assert_eq!(err, OperationError::Storage(StorageError::DirectoryFull));
        assert_eq!(fs.free_sector_count(), before);
    }

    #[test]
    fn test_create_empty_leaf_rolls_back() {
        let fs = fresh_fs();
        let ctx = fs.context();
        let before = fs.free_sector_count();
        assert!(matches!(
            fs.create(&ctx, "/", 10, false),
            Err(OperationError::Storage(StorageError::InvalidName(_)))
        ));
        assert_eq!(fs.free_sector_count(), before);
    }

    #[test]
    fn test_open_missing_fails() {
        let fs = fresh_fs();
        let ctx = fs.context();
        assert_eq!(
            fs.open(&ctx, "/ghost").err(),
            Some(OperationError::NotFound("ghost".to_string()))
        );
    }

    #[test]
    fn test_open_root_and_parent() {
        let fs = fresh_fs();
        let ctx = fs.context();
        fs.create(&ctx, "/a", 512, true).unwrap();

        let root = fs.open(&ctx, "/").unwrap();
        assert!(root.is_directory());
        assert_eq!(root.sector(), ROOT_DIR_SECTOR);

        let parent = fs.open(&ctx, "/a/..").unwrap();
        assert_eq!(parent.sector(), ROOT_DIR_SECTOR);

        assert_eq!(
            fs.open(&ctx, "/..").err(),
            Some(OperationError::NotFound("..".to_string()))
        );
    }

    #[test]
    fn test_open_relative_uses_current_directory() {
        let fs = fresh_fs();
        let mut ctx = fs.context();
        fs.create(&ctx, "/a", 512, true).unwrap();
        fs.create(&ctx, "/a/inner", 42, false).unwrap();

        fs.change_directory(&mut ctx, "/a").unwrap();
        let file = fs.open(&ctx, "inner").unwrap();
        assert_eq!(file.length(), 42);
    }

    #[test]
    fn test_remove_file() {
        let fs = fresh_fs();
        let ctx = fs.context();
        let before = fs.free_sector_count();

        fs.create(&ctx, "/victim", 100, false).unwrap();
        fs.remove(&ctx, "/victim").unwrap();
        assert_eq!(fs.free_sector_count(), before);
        assert_eq!(
            fs.open(&ctx, "/victim").err(),
            Some(OperationError::NotFound("victim".to_string()))
        );
    }

    #[test]
    fn test_remove_missing_is_harmless() {
        let fs = fresh_fs();
        let ctx = fs.context();
        fs.create(&ctx, "/keep", 0, false).unwrap();

        let root = resolve_containing(fs.volume(), &ctx, "/x").unwrap();
        let count_before = root.entry_count().unwrap();
        assert_eq!(
            fs.remove(&ctx, "/ghost"),
            Err(OperationError::NotFound("ghost".to_string()))
        );
        assert_eq!(root.entry_count().unwrap(), count_before);
    }

    #[test]
    fn test_remove_in_subdirectory() {
        let fs = fresh_fs();
        let ctx = fs.context();
        fs.create(&ctx, "/a", 512, true).unwrap();
        fs.create(&ctx, "/a/f", 10, false).unwrap();

        fs.remove(&ctx, "/a/f").unwrap();
        assert_eq!(
            fs.open(&ctx, "/a/f").err(),
            Some(OperationError::NotFound("f".to_string()))
        );
        // The directory itself is untouched.
        assert!(fs.open(&ctx, "/a").is_ok());
    }

    #[test]
    fn test_remove_nonempty_directory_fails() {
        let fs = fresh_fs();
        let ctx = fs.context();
        fs.create(&ctx, "/a", 512, true).unwrap();
        fs.create(&ctx, "/a/f", 0, false).unwrap();

        assert_eq!(
            fs.remove(&ctx, "/a"),
            Err(OperationError::Storage(StorageError::NotEmpty))
        );
        fs.remove(&ctx, "/a/f").unwrap();
        fs.remove(&ctx, "/a").unwrap();
    }

    #[test]
    fn test_removed_open_file_keeps_sectors_until_close() {
        let fs = fresh_fs();
        let ctx = fs.context();
        let before = fs.free_sector_count();

        fs.create(&ctx, "/held", 600, false).unwrap();
        let file = fs.open(&ctx, "/held").unwrap();
        fs.remove(&ctx, "/held").unwrap();

        // Deferred deletion: the open handle pins the sectors.
        assert!(fs.free_sector_count() < before);
        drop(file);
        assert_eq!(fs.free_sector_count(), before);
    }

    #[test]
    fn test_change_directory_persists_for_relative_creates() {
        let fs = fresh_fs();
        let mut ctx = fs.context();
        fs.create(&ctx, "/a", 512, true).unwrap();

        fs.change_directory(&mut ctx, "/a").unwrap();
        fs.create(&ctx, "b3", 10, false).unwrap();

        // The entry landed inside "a", not in the root.
        assert!(fs.open(&ctx, "/a/b3").is_ok());
        assert_eq!(
            fs.open(&ctx, "/b3").err(),
            Some(OperationError::NotFound("b3".to_string()))
        );
    }

    #[test]
    fn test_change_directory_dotdot_walks_up() {
        let fs = fresh_fs();
        let mut ctx = fs.context();
        fs.create(&ctx, "/a", 512, true).unwrap();
        fs.create(&ctx, "/a/b", 512, true).unwrap();

        fs.change_directory(&mut ctx, "/a/b").unwrap();
        fs.change_directory(&mut ctx, "..").unwrap();
        let a = fs.open(&ctx, ".").unwrap();
        assert!(a.is_directory());
        assert_eq!(Some(a.sector()), ctx.current_sector());

        fs.change_directory(&mut ctx, "..").unwrap();
        assert_eq!(ctx.current_sector(), Some(ROOT_DIR_SECTOR));

        // Root has no parent.
        assert_eq!(
            fs.change_directory(&mut ctx, ".."),
            Err(OperationError::NotFound("..".to_string()))
        );
        assert_eq!(ctx.current_sector(), Some(ROOT_DIR_SECTOR));
    }

    #[test]
    fn test_change_directory_to_file_fails() {
        let fs = fresh_fs();
        let mut ctx = fs.context();
        fs.create(&ctx, "/f", 10, false).unwrap();

        assert_eq!(
            fs.change_directory(&mut ctx, "/f"),
            Err(OperationError::NotADirectory("f".to_string()))
        );
        assert!(ctx.current().is_none());
    }

    #[test]
    fn test_change_directory_root_and_dot() {
        let fs = fresh_fs();
        let mut ctx = fs.context();
        fs.change_directory(&mut ctx, "/").unwrap();
        assert_eq!(ctx.current_sector(), Some(ROOT_DIR_SECTOR));
        fs.change_directory(&mut ctx, ".").unwrap();
        assert_eq!(ctx.current_sector(), Some(ROOT_DIR_SECTOR));
    }

    #[test]
    fn test_resolution_round_trip() {
        let fs = fresh_fs();
        let ctx = fs.context();
        fs.create(&ctx, "/a", 512, true).unwrap();
        fs.create(&ctx, "/a/b", 512, true).unwrap();

        // Containing directory of /a/b/c, rebuilt from its own path + leaf.
        let dir = resolve_containing(fs.volume(), &ctx, "/a/b/c").unwrap();
        let leaf = path::leaf_name("/a/b/c");
        let rebuilt = format!("{}/{}", "/a/b", leaf);
        let again = resolve_containing(fs.volume(), &ctx, &rebuilt).unwrap();
        assert_eq!(dir.sector(), again.sector());
    }

    #[test]
    fn test_state_survives_done_and_reinit() {
        let disk = Arc::new(Mutex::new(RamDisk::new(256)));

        let fs = FileSystem::init(Arc::clone(&disk), true).unwrap();
        let ctx = fs.context();
        fs.create(&ctx, "/a", 512, true).unwrap();
        fs.create(&ctx, "/a/keep", 123, false).unwrap();
        let free_before = fs.free_sector_count();
        drop(ctx);
        fs.done().unwrap();
        drop(fs);

        let fs = FileSystem::init(Arc::clone(&disk), false).unwrap();
        let ctx = fs.context();
        assert_eq!(fs.free_sector_count(), free_before);
        let file = fs.open(&ctx, "/a/keep").unwrap();
        assert_eq!(file.length(), 123);
    }

    #[test]
    fn test_operations_leave_no_open_inodes() {
        let fs = fresh_fs();
        let mut ctx = fs.context();
        fs.create(&ctx, "/a", 512, true).unwrap();
        fs.create(&ctx, "/a/b", 512, true).unwrap();
        fs.create(&ctx, "/a/b/f", 10, false).unwrap();
        fs.change_directory(&mut ctx, "/a/b").unwrap();
        let _ = fs.open(&ctx, "f").unwrap();
        let _ = fs.create(&ctx, "f", 10, false);
        let _ = fs.remove(&ctx, "missing");
        fs.remove(&ctx, "f").unwrap();
        drop(ctx);
        assert_eq!(fs.open_inode_count(), 0);
    }
}
