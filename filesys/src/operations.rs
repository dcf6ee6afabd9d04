//! Operation-boundary errors
//!
//! Every file-system operation reports one of a small set of failure kinds:
//! a missing path component, a file where a directory was needed, a reserved
//! name, a duplicate, or an underlying storage failure (which covers
//! exhaustion — no free sectors, or a directory table with no free slot).

use storage::StorageError;
use thiserror::Error;

/// Errors reported by the file-system operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum OperationError {
    /// A path component or the leaf does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// A component that had to be a directory is not one
    #[error("not a directory: {0}")]
    NotADirectory(String),

    /// Create targets a name that already exists
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// "." and ".." cannot be created or removed
    #[error("reserved name: {0}")]
    ReservedName(String),

    /// Allocator, inode or device failure
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}
