//! Per-caller resolution context
//!
//! Each execution context (a thread, a shell session, a test) owns one
//! [`FsContext`]: the place where relative paths start. It is passed
//! explicitly into every path-taking operation rather than living in hidden
//! thread state.

use hal::{BlockDevice, SectorNumber};
use storage::Dir;

/// Current-directory slot for one caller.
///
/// Starts unset, which means relative paths resolve from the root. A
/// successful change-directory installs a handle here, closing the previous
/// one exactly once; dropping the context closes whatever it still holds.
pub struct FsContext<D: BlockDevice> {
    current: Option<Dir<D>>,
}

impl<D: BlockDevice> FsContext<D> {
    /// Fresh context with no current directory (relative paths start at the
    /// root).
    pub fn new() -> Self {
        Self { current: None }
    }

    /// The current directory handle, if one has been set.
    pub fn current(&self) -> Option<&Dir<D>> {
        self.current.as_ref()
    }

    /// Sector of the current directory, for inspection.
    pub fn current_sector(&self) -> Option<SectorNumber> {
        self.current.as_ref().map(Dir::sector)
    }

    /// Installs a new current directory, dropping (closing) the previous
    /// handle if any.
    pub fn set_current(&mut self, dir: Dir<D>) {
        self.current = Some(dir);
    }
}

impl<D: BlockDevice> Default for FsContext<D> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hal::RamDisk;
    use storage::{Volume, ROOT_DIR_SECTOR};

    #[test]
    fn test_context_starts_unset() {
        let ctx: FsContext<RamDisk> = FsContext::new();
        assert!(ctx.current().is_none());
        assert_eq!(ctx.current_sector(), None);
    }

    #[test]
    fn test_set_current_replaces_and_closes() {
        let volume = Volume::attach(RamDisk::new(64)).unwrap();
        Dir::create(&volume, ROOT_DIR_SECTOR, 16, None).unwrap();

        let mut ctx = FsContext::new();
        ctx.set_current(Dir::open_root(&volume).unwrap());
        assert_eq!(ctx.current_sector(), Some(ROOT_DIR_SECTOR));
        assert_eq!(volume.open_inode_count(), 1);

        // Replacing closes the old handle.
        ctx.set_current(Dir::open_root(&volume).unwrap());
        assert_eq!(volume.open_inode_count(), 1);

        drop(ctx);
        assert_eq!(volume.open_inode_count(), 0);
    }
}
