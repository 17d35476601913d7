//! Error types for the manifest crate.

use std::path::PathBuf;

/// Errors that can occur while loading or saving the manifest.
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    /// The manifest is missing or cannot be decoded.
    #[error("could not load {path}: {reason}")]
    NotInitialized { path: PathBuf, reason: String },

    /// Writing the manifest failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The manifest could not be encoded.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Convenience alias for manifest results.
pub type ManifestResult<T> = Result<T, ManifestError>;
