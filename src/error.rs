use std::io;
use std::sync::Arc;

use thiserror::Error;

/// Main error type for storage operations
///
/// Errors are `Clone` because one coalesced backend call may answer many
/// callers, and every one of them must observe the same failure.
#[derive(Error, Debug, Clone)]
pub enum FsError {
    #[error("Storage {0} is unavailable: {1}")]
    StorageUnavailable(String, String),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Not a folder: {0}")]
    NotAFolder(String),

    #[error("Not a file: {0}")]
    NotAFile(String),

    #[error("Not implemented")]
    NotImplemented,

    #[error("Not supported: {0}")]
    NotSupported(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Object already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("I/O error: {0}")]
    Io(Arc<io::Error>),

    #[error("Backend error: {0}")]
    Backend(String),
}

impl FsError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, FsError::NotFound(_))
    }

    /// True for both a missing capability and a backend that declined the call.
    pub fn is_not_implemented(&self) -> bool {
        matches!(self, FsError::NotImplemented | FsError::NotSupported(_))
    }

    /// Attach operation and path context to an opaque backend error.
    ///
    /// Taxonomy errors already name their path and are returned unchanged so
    /// callers can keep matching on the kind.
    pub fn context(self, op: &str, path: &str) -> FsError {
        match self {
            FsError::Io(e) => FsError::Backend(format!("failed to {} {}: {}", op, path, e)),
            FsError::Backend(msg) => {
                FsError::Backend(format!("failed to {} {}: {}", op, path, msg))
            }
            other => other,
        }
    }
}

impl From<io::Error> for FsError {
    fn from(e: io::Error) -> Self {
        FsError::Io(Arc::new(e))
    }
}

/// Result type alias for storage operations
pub type Result<T> = std::result::Result<T, FsError>;
