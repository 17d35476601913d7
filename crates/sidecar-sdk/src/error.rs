use thiserror::Error;

#[derive(Debug, Error)]
pub enum SdkError {
    #[error(transparent)]
    Manifest(#[from] sidecar_index::ManifestError),

    #[error("no archive URL configured; pass --url or re-run init")]
    MissingUrl,

    #[error(transparent)]
    Archive(#[from] sidecar_sync::ArchiveError),

    #[error(transparent)]
    Store(#[from] sidecar_store::StoreError),

    #[error("work queue closed early")]
    Queue(#[from] sidecar_queue::QueueClosed),

    #[error("internal error: {0}")]
    Internal(String),
}

impl SdkError {
    /// `true` if the working tree has no readable manifest.
    pub fn is_not_initialized(&self) -> bool {
        matches!(
            self,
            SdkError::Manifest(sidecar_index::ManifestError::NotInitialized { .. })
        )
    }
}

pub type SdkResult<T> = Result<T, SdkError>;
