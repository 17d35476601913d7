use sidecar_types::Digest;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArchiveError {
    /// Unsupported or malformed archive URL, or missing credentials.
    #[error("configuration error: {0}")]
    Config(String),

    /// The archive could not be reached.
    #[error("network error: {0}")]
    Network(String),

    /// The backend answered with a failure status.
    #[error("archive returned {status} for {key}: {message}")]
    Http {
        status: u16,
        key: String,
        message: String,
    },

    /// The requested object does not exist in the archive.
    #[error("not found in archive: {0}")]
    NotFound(String),

    /// Downloaded bytes do not hash to the digest they are stored under.
    #[error("integrity error for {key}: expected {expected}, computed {computed}")]
    Integrity {
        key: String,
        expected: Digest,
        computed: Digest,
    },

    #[error("store error: {0}")]
    Store(#[from] sidecar_store::StoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for ArchiveError {
    fn from(e: reqwest::Error) -> Self {
        Self::Network(e.to_string())
    }
}

pub type ArchiveResult<T> = Result<T, ArchiveError>;
