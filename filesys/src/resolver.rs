//! Path resolution
//!
//! Walks a path component by component and returns a handle to the directory
//! that would contain the path's final component. The final component itself
//! is never descended into — interpreting it (lookup, create, adopt) is the
//! calling operation's job, paired with [`crate::path::leaf_name`].

use crate::context::FsContext;
use crate::operations::OperationError;
use crate::path;
use hal::BlockDevice;
use storage::{Dir, InodeKind, Volume};

/// Resolves `path` to the directory that would contain its final component.
///
/// Resolution starts at the root for absolute paths and for callers with no
/// current directory, otherwise at a reopened handle to the context's
/// current directory. Every component except the last is then walked:
/// "." stays put, ".." moves to the parent (failing at the root, which has
/// none), and any other name must look up to an existing directory — a file
/// in the middle of a path fails resolution.
///
/// The returned handle is owned by the caller and closes on drop, as does
/// every intermediate handle the walk replaces, on success and failure
/// alike.
pub fn resolve_containing<D: BlockDevice>(
    volume: &Volume<D>,
    ctx: &FsContext<D>,
    path: &str,
) -> Result<Dir<D>, OperationError> {
    let mut dir = match ctx.current() {
        Some(current) if !path::is_absolute(path) => current.reopen(),
        _ => Dir::open_root(volume)?,
    };

    let parts: Vec<&str> = path::components(path).collect();
    if parts.len() <= 1 {
        // The sole component, if any, is the leaf; it is not consumed here.
        return Ok(dir);
    }

    for &part in &parts[..parts.len() - 1] {
        match part {
            "." => {}
            ".." => {
                let parent = dir
                    .parent()
                    .ok_or_else(|| OperationError::NotFound("..".to_string()))?;
                dir = Dir::open_at(volume, parent)?;
            }
            name => {
                let entry = dir
                    .lookup(name)?
                    .ok_or_else(|| OperationError::NotFound(name.to_string()))?;
                if entry.kind != InodeKind::Directory {
                    return Err(OperationError::NotADirectory(name.to_string()));
                }
                dir = Dir::open_at(volume, entry.sector)?;
            }
        }
    }
    Ok(dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hal::RamDisk;
    use storage::{Inode, ROOT_DIR_SECTOR};

    /// Builds /a/b with a file /a/f on a fresh volume.
    fn sample_volume() -> (Volume<RamDisk>, u32, u32) {
        let volume = Volume::attach(RamDisk::new(128)).unwrap();
        Dir::create(&volume, ROOT_DIR_SECTOR, 16, None).unwrap();
        let root = Dir::open_root(&volume).unwrap();

        let a_sector = volume.allocate_sectors(1).unwrap();
        Dir::create(&volume, a_sector, 16, Some(ROOT_DIR_SECTOR)).unwrap();
        root.add_entry("a", a_sector, InodeKind::Directory).unwrap();

        let a = Dir::open_at(&volume, a_sector).unwrap();
        let b_sector = volume.allocate_sectors(1).unwrap();
        Dir::create(&volume, b_sector, 16, Some(a_sector)).unwrap();
        a.add_entry("b", b_sector, InodeKind::Directory).unwrap();

        let f_sector = volume.allocate_sectors(1).unwrap();
        Inode::create(&volume, f_sector, 0, InodeKind::File, Some(a_sector)).unwrap();
        a.add_entry("f", f_sector, InodeKind::File).unwrap();

        (volume, a_sector, b_sector)
    }

    #[test]
    fn test_resolve_root_only() {
        let (volume, _, _) = sample_volume();
        let ctx = FsContext::new();
        for p in ["/", "", "///"] {
            let dir = resolve_containing(&volume, &ctx, p).unwrap();
            assert!(dir.is_root());
        }
        assert_eq!(volume.open_inode_count(), 0);
    }

    #[test]
    fn test_single_component_returns_start() {
        let (volume, _, _) = sample_volume();
        let ctx = FsContext::new();
        // The leaf is not consumed: the containing directory of "/a" is root.
        let dir = resolve_containing(&volume, &ctx, "/a").unwrap();
        assert!(dir.is_root());
    }

    #[test]
    fn test_descends_intermediates() {
        let (volume, a_sector, b_sector) = sample_volume();
        let ctx = FsContext::new();

        let dir = resolve_containing(&volume, &ctx, "/a/x").unwrap();
        assert_eq!(dir.sector(), a_sector);

        let dir = resolve_containing(&volume, &ctx, "/a/b/x").unwrap();
        assert_eq!(dir.sector(), b_sector);
    }

    #[test]
    fn test_dot_components_stay_put() {
        let (volume, a_sector, _) = sample_volume();
        let ctx = FsContext::new();
        let dir = resolve_containing(&volume, &ctx, "/./a/./x").unwrap();
        assert_eq!(dir.sector(), a_sector);
    }

    #[test]
    fn test_dotdot_moves_to_parent() {
        let (volume, a_sector, _) = sample_volume();
        let ctx = FsContext::new();

        let dir = resolve_containing(&volume, &ctx, "/a/b/../x").unwrap();
        assert_eq!(dir.sector(), a_sector);

        let dir = resolve_containing(&volume, &ctx, "/a/../x").unwrap();
        assert!(dir.is_root());
    }

    #[test]
    fn test_dotdot_at_root_fails() {
        let (volume, _, _) = sample_volume();
        let ctx = FsContext::new();
        let err = resolve_containing(&volume, &ctx, "/../x").unwrap_err();
        assert_eq!(err, OperationError::NotFound("..".to_string()));
        assert_eq!(volume.open_inode_count(), 0);
    }

    #[test]
    fn test_missing_component_fails() {
        let (volume, _, _) = sample_volume();
        let ctx = FsContext::new();
        let err = resolve_containing(&volume, &ctx, "/nope/x").unwrap_err();
        assert_eq!(err, OperationError::NotFound("nope".to_string()));
        assert_eq!(volume.open_inode_count(), 0);
    }

    #[test]
    fn test_file_in_middle_fails() {
        let (volume, _, _) = sample_volume();
        let ctx = FsContext::new();
        let err = resolve_containing(&volume, &ctx, "/a/f/x").unwrap_err();
        assert_eq!(err, OperationError::NotADirectory("f".to_string()));
        assert_eq!(volume.open_inode_count(), 0);
    }

    #[test]
    fn test_relative_resolution_uses_context() {
        let (volume, a_sector, b_sector) = sample_volume();
        let mut ctx = FsContext::new();
        ctx.set_current(Dir::open_at(&volume, a_sector).unwrap());

        let dir = resolve_containing(&volume, &ctx, "b/x").unwrap();
        assert_eq!(dir.sector(), b_sector);

        // An absolute path ignores the current directory.
        let dir = resolve_containing(&volume, &ctx, "/a/x").unwrap();
        assert_eq!(dir.sector(), a_sector);

        // ".." from the current directory reaches root.
        let dir = resolve_containing(&volume, &ctx, "../x").unwrap();
        assert!(dir.is_root());
    }

    #[test]
    fn test_no_handles_leak_across_calls() {
        let (volume, a_sector, _) = sample_volume();
        let mut ctx = FsContext::new();
        ctx.set_current(Dir::open_at(&volume, a_sector).unwrap());

        for p in ["/a/b/x", "b/../b/x", "/nope/x", "/a/f/x", "/../x"] {
            let _ = resolve_containing(&volume, &ctx, p);
        }
        drop(ctx);
        assert_eq!(volume.open_inode_count(), 0);
    }
}
