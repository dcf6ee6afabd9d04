//! # File System Core
//!
//! Path resolution and the file-system operations of SectorFS: create, open,
//! remove and change-directory over the directory/inode/allocator layers in
//! the `storage` crate.
//!
//! ## Philosophy
//!
//! **No ambient authority.** Where a path does not start at the root, it
//! starts at a current directory — and that current directory is not hidden
//! thread state but an explicit [`FsContext`] the caller owns and passes in.
//!
//! **Cleanup is structural.** Directory and inode handles close when they are
//! dropped, so every exit path of every operation — including the early
//! failure returns inside the resolution walk — releases what it acquired.
//! An operation that allocated a sector and then failed puts it back before
//! returning; no outcome leaves the allocator and the directory tree
//! disagreeing.
//!
//! ## Walkthrough
//!
//! ```
//! use filesys::FileSystem;
//! use hal::RamDisk;
//!
//! let fs = FileSystem::init(RamDisk::new(64), true).unwrap();
//! let mut ctx = fs.context();
//!
//! fs.create(&ctx, "/docs", 512, true).unwrap();
//! fs.create(&ctx, "/docs/todo", 100, false).unwrap();
//! fs.change_directory(&mut ctx, "/docs").unwrap();
//!
//! let file = fs.open(&ctx, "todo").unwrap();
//! assert_eq!(file.length(), 100);
//! # drop(file);
//! # drop(ctx);
//! fs.done().unwrap();
//! ```

pub mod context;
pub mod file;
pub mod operations;
pub mod path;
pub mod resolver;
pub mod service;

pub use context::FsContext;
pub use file::File;
pub use operations::OperationError;
pub use resolver::resolve_containing;
pub use service::{FileSystem, ROOT_ENTRY_CAPACITY};
