use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::AsyncWrite;

use crate::error::ArchiveResult;

/// Metadata returned by a `HEAD` on an archive object.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ObjectHead {
    /// Entity tag as reported by the backend, quotes included.
    pub etag: Option<String>,
    pub size: Option<u64>,
}

/// Per-upload options.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PutOptions {
    /// Base64 MD5 of the body; the backend must reject a body that does not
    /// match.
    pub content_md5: String,
    /// Exact body length in bytes.
    pub content_length: u64,
    /// Ask the backend to encrypt the object at rest.
    pub server_side_encryption: bool,
    pub content_type: String,
}

impl PutOptions {
    pub fn new(content_md5: impl Into<String>, content_length: u64) -> Self {
        Self {
            content_md5: content_md5.into(),
            content_length,
            server_side_encryption: true,
            content_type: "application/octet-stream".into(),
        }
    }
}

/// Object storage transport used by the [`Archive`](crate::Archive).
///
/// Keys are full object keys (root prefix included).
#[async_trait]
pub trait ObjectBackend: Send + Sync {
    /// Object metadata, or `Ok(None)` if the key does not exist.
    async fn head(&self, key: &str) -> ArchiveResult<Option<ObjectHead>>;

    /// Stream `body` to `key`, replacing any previous object.
    ///
    /// The file is read from its current position for
    /// `options.content_length` bytes and never held in memory whole.
    async fn put(&self, key: &str, body: File, options: &PutOptions) -> ArchiveResult<()>;

    /// Stream the object's bytes into `sink`, returning the byte count.
    ///
    /// Fails with [`ArchiveError::NotFound`](crate::ArchiveError::NotFound)
    /// if the key does not exist.
    async fn get(&self, key: &str, sink: &mut (dyn AsyncWrite + Send + Unpin)) -> ArchiveResult<u64>;
}
