use std::path::PathBuf;

use sidecar_types::Digest;

/// Errors from content store and tracked-file operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Local filesystem failure (read, write, rename, symlink).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A relative link target could not be computed.
    #[error("cannot link {from} to {to}: {reason}")]
    Path {
        from: PathBuf,
        to: PathBuf,
        reason: String,
    },

    /// Blob content does not hash to the digest it is stored under.
    #[error("integrity error for {path}: expected {expected}, computed {computed}")]
    Integrity {
        path: PathBuf,
        expected: Digest,
        computed: Digest,
    },

    /// The store has no blob for this digest.
    #[error("blob not found in store: {0}")]
    MissingBlob(Digest),

    /// Linking failed and the file could not be moved back either.
    #[error("linking {path} failed ({cause}) and rollback failed: {rollback}; content remains at {parked}")]
    RollbackFailed {
        path: PathBuf,
        parked: PathBuf,
        cause: std::io::Error,
        rollback: std::io::Error,
    },
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
