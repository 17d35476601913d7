use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use bytes::Bytes;
use sidecar_crypto::ContentHasher;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::backend::{ObjectBackend, ObjectHead, PutOptions};
use crate::error::{ArchiveError, ArchiveResult};

#[derive(Clone, Debug)]
struct StoredObject {
    data: Bytes,
    etag: String,
    encrypted: bool,
}

/// In-memory object backend.
///
/// Behaves like a single-part S3 upload target: the ETag of a stored object
/// is its quoted hex MD5, and a body that does not match its `Content-MD5`
/// is rejected. Test helpers can damage stored objects or take the backend
/// offline.
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    objects: RwLock<HashMap<String, StoredObject>>,
    offline: AtomicBool,
    puts: AtomicUsize,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `data` under `key` directly, bypassing upload checks.
    pub fn insert(&self, key: impl Into<String>, data: impl Into<Bytes>) {
        let data = data.into();
        let etag = quoted_md5(&data);
        self.objects.write().expect("lock poisoned").insert(
            key.into(),
            StoredObject {
                data,
                etag,
                encrypted: false,
            },
        );
    }

    /// Replace an object's ETag, leaving its bytes alone.
    pub fn corrupt_etag(&self, key: &str, etag: impl Into<String>) -> bool {
        let mut objects = self.objects.write().expect("lock poisoned");
        match objects.get_mut(key) {
            Some(obj) => {
                obj.etag = etag.into();
                true
            }
            None => false,
        }
    }

    /// Replace an object's bytes, leaving its ETag alone.
    pub fn corrupt_data(&self, key: &str, data: impl Into<Bytes>) -> bool {
        let mut objects = self.objects.write().expect("lock poisoned");
        match objects.get_mut(key) {
            Some(obj) => {
                obj.data = data.into();
                true
            }
            None => false,
        }
    }

    /// Make every call fail with a network error.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn object(&self, key: &str) -> Option<Bytes> {
        self.objects
            .read()
            .expect("lock poisoned")
            .get(key)
            .map(|obj| obj.data.clone())
    }

    pub fn is_encrypted(&self, key: &str) -> bool {
        self.objects
            .read()
            .expect("lock poisoned")
            .get(key)
            .is_some_and(|obj| obj.encrypted)
    }

    /// All stored keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .objects
            .read()
            .expect("lock poisoned")
            .keys()
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    /// Number of accepted uploads.
    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    fn check_online(&self) -> ArchiveResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(ArchiveError::Network("backend is offline".into()));
        }
        Ok(())
    }
}

fn quoted_md5(data: &[u8]) -> String {
    format!("\"{}\"", ContentHasher::hash(data).to_hex())
}

#[async_trait]
impl ObjectBackend for InMemoryBackend {
    async fn head(&self, key: &str) -> ArchiveResult<Option<ObjectHead>> {
        self.check_online()?;
        let objects = self.objects.read().expect("lock poisoned");
        Ok(objects.get(key).map(|obj| ObjectHead {
            etag: Some(obj.etag.clone()),
            size: Some(obj.data.len() as u64),
        }))
    }

    async fn put(&self, key: &str, mut body: File, options: &PutOptions) -> ArchiveResult<()> {
        self.check_online()?;
        let mut data = Vec::new();
        body.read_to_end(&mut data).await?;
        let reject = |message: &str| ArchiveError::Http {
            status: 400,
            key: key.to_string(),
            message: message.into(),
        };
        if data.len() as u64 != options.content_length {
            return Err(reject("IncompleteBody"));
        }
        if ContentHasher::hash(&data).to_base64() != options.content_md5 {
            return Err(reject("BadDigest"));
        }
        let body = Bytes::from(data);
        let etag = quoted_md5(&body);
        self.objects.write().expect("lock poisoned").insert(
            key.to_string(),
            StoredObject {
                data: body,
                etag,
                encrypted: options.server_side_encryption,
            },
        );
        self.puts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn get(&self, key: &str, sink: &mut (dyn AsyncWrite + Send + Unpin)) -> ArchiveResult<u64> {
        self.check_online()?;
        let data = self
            .object(key)
            .ok_or_else(|| ArchiveError::NotFound(key.to_string()))?;
        sink.write_all(&data).await?;
        Ok(data.len() as u64)
    }
}
