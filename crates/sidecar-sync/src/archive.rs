use std::sync::Arc;

use sidecar_crypto::ContentHasher;
use sidecar_store::{ContentStore, StoreError, TrackedFile};
use sidecar_types::Digest;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use url::Url;

use crate::backend::{ObjectBackend, PutOptions};
use crate::config::S3Config;
use crate::error::{ArchiveError, ArchiveResult};
use crate::s3::S3Backend;

/// The only archive URL scheme understood.
pub const ARCHIVE_SCHEME: &str = "s3";

/// Where blobs live remotely: a bucket plus a key prefix.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArchiveLocation {
    bucket: String,
    root: String,
}

impl ArchiveLocation {
    /// Parse `s3://<bucket>/<root>`. The root may be empty or nested.
    pub fn parse(url: &str) -> ArchiveResult<Self> {
        let parsed = Url::parse(url).map_err(|e| ArchiveError::Config(format!("invalid archive URL {url:?}: {e}")))?;
        if parsed.scheme() != ARCHIVE_SCHEME {
            return Err(ArchiveError::Config(format!(
                "unsupported archive scheme {:?} in {url:?}, expected {ARCHIVE_SCHEME:?}",
                parsed.scheme()
            )));
        }
        let bucket = match parsed.host_str() {
            Some(host) if !host.is_empty() => host.to_string(),
            _ => return Err(ArchiveError::Config(format!("archive URL {url:?} has no bucket"))),
        };
        let root = parsed.path().trim_matches('/').to_string();
        Ok(Self { bucket, root })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    /// The object key for `digest`: `<root>/<hex>`, or bare hex under an
    /// empty root.
    pub fn key_for(&self, digest: &Digest) -> String {
        if self.root.is_empty() {
            digest.to_hex()
        } else {
            format!("{}/{}", self.root, digest.to_hex())
        }
    }
}

/// Result of probing the archive for a digest.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Presence {
    /// An object exists and its ETag matches the digest.
    Present,
    Missing,
    /// An object exists under the key but its ETag names other content.
    Corrupt { etag: String },
}

/// What [`Archive::push`] did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PushOutcome {
    Uploaded,
    AlreadyPresent,
}

/// Remote content-addressed blob archive.
#[derive(Clone)]
pub struct Archive {
    location: ArchiveLocation,
    backend: Arc<dyn ObjectBackend>,
}

impl std::fmt::Debug for Archive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Archive").field("location", &self.location).finish_non_exhaustive()
    }
}

impl Archive {
    /// Open the S3 archive at `url`, with credentials and region from the
    /// environment.
    pub fn open(url: &str) -> ArchiveResult<Self> {
        let location = ArchiveLocation::parse(url)?;
        let backend = S3Backend::new(S3Config::from_env(location.bucket())?)?;
        Ok(Self::with_backend(location, Arc::new(backend)))
    }

    pub fn with_backend(location: ArchiveLocation, backend: Arc<dyn ObjectBackend>) -> Self {
        Self { location, backend }
    }

    pub fn location(&self) -> &ArchiveLocation {
        &self.location
    }

    /// Look up the object for `digest` and compare its ETag.
    pub async fn probe(&self, digest: &Digest) -> ArchiveResult<Presence> {
        let key = self.location.key_for(digest);
        let Some(head) = self.backend.head(&key).await? else {
            return Ok(Presence::Missing);
        };
        let etag = head.etag.unwrap_or_default();
        if digest.matches_etag(&etag) {
            Ok(Presence::Present)
        } else {
            Ok(Presence::Corrupt { etag })
        }
    }

    /// Returns `true` if the archive holds an intact copy of `file`'s blob.
    ///
    /// A damaged remote copy counts as absent so a later push replaces it.
    pub async fn exists(&self, file: &TrackedFile) -> ArchiveResult<bool> {
        match self.probe(file.digest()).await? {
            Presence::Present => Ok(true),
            Presence::Missing => Ok(false),
            Presence::Corrupt { etag } => {
                warn!(
                    path = %file.path().display(),
                    key = %self.location.key_for(file.digest()),
                    %etag,
                    "archive copy does not match its digest"
                );
                Ok(false)
            }
        }
    }

    /// Upload `file`'s blob from `store` unless the archive already has it.
    ///
    /// The local blob is hashed before upload; a blob that no longer matches
    /// its digest is never sent. The upload streams from the blob file.
    pub async fn push(&self, store: &ContentStore, file: &TrackedFile) -> ArchiveResult<PushOutcome> {
        match self.exists(file).await {
            Ok(true) => return Ok(PushOutcome::AlreadyPresent),
            Ok(false) => {}
            Err(e) => debug!(path = %file.path().display(), error = %e, "existence check failed, uploading"),
        }

        let digest = *file.digest();
        let blob_path = store.storage_path(&digest);
        let hash_path = blob_path.clone();
        let computed = match tokio::task::spawn_blocking(move || ContentHasher::hash_file(&hash_path))
            .await
            .map_err(std::io::Error::other)?
        {
            Ok(computed) => computed,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::MissingBlob(digest).into())
            }
            Err(e) => return Err(e.into()),
        };
        if computed != digest {
            return Err(StoreError::Integrity {
                path: blob_path,
                expected: digest,
                computed,
            }
            .into());
        }

        let body = tokio::fs::File::open(&blob_path).await?;
        let length = body.metadata().await?.len();
        let key = self.location.key_for(&digest);
        self.backend
            .put(&key, body, &PutOptions::new(digest.to_base64(), length))
            .await?;
        info!(path = %file.path().display(), %key, "uploaded");
        Ok(PushOutcome::Uploaded)
    }

    /// Download `file`'s blob into `store`, returning the byte count.
    ///
    /// Bytes land in a staging file and are checked against the digest
    /// before being renamed to the blob path, so the store never holds a
    /// partial or mismatched blob under a digest name.
    pub async fn pull(&self, store: &ContentStore, file: &TrackedFile) -> ArchiveResult<u64> {
        let digest = *file.digest();
        let key = self.location.key_for(&digest);

        let staged = store.stage()?;
        let mut sink = tokio::fs::File::from_std(staged.reopen()?);
        let written = self.backend.get(&key, &mut sink).await?;
        sink.flush().await?;
        sink.sync_all().await?;
        drop(sink);

        let staged_path = staged.path().to_path_buf();
        let computed = tokio::task::spawn_blocking(move || ContentHasher::hash_file(&staged_path))
            .await
            .map_err(std::io::Error::other)??;
        if computed != digest {
            return Err(ArchiveError::Integrity {
                key,
                expected: digest,
                computed,
            });
        }

        store.commit_staged(staged, &digest)?;
        info!(path = %file.path().display(), %key, bytes = written, "downloaded");
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryBackend;
    use bytes::Bytes;
    use std::fs;

    const HELLO_HEX: &str = "5d41402abc4b2a76b9719d911017c592";

    struct Fixture {
        _dir: tempfile::TempDir,
        store: ContentStore,
        backend: Arc<InMemoryBackend>,
        archive: Archive,
        file: TrackedFile,
    }

    /// A store holding the blob for "hello", tracked as `a.txt`, and an
    /// empty in-memory archive at `s3://bucket/prefix`.
    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let store = ContentStore::new(dir.path().join(".sidecar"));
        store.ensure_dir().unwrap();
        let digest = ContentHasher::hash(b"hello");
        fs::write(store.storage_path(&digest), b"hello").unwrap();
        let backend = Arc::new(InMemoryBackend::new());
        let archive = Archive::with_backend(
            ArchiveLocation::parse("s3://bucket/prefix").unwrap(),
            backend.clone(),
        );
        let file = TrackedFile::new(dir.path().join("a.txt"), digest);
        Fixture {
            _dir: dir,
            store,
            backend,
            archive,
            file,
        }
    }

    #[test]
    fn parse_location() {
        let loc = ArchiveLocation::parse("s3://bucket/prefix").unwrap();
        assert_eq!(loc.bucket(), "bucket");
        assert_eq!(loc.root(), "prefix");

        let loc = ArchiveLocation::parse("s3://bucket/a/b/").unwrap();
        assert_eq!(loc.root(), "a/b");

        let loc = ArchiveLocation::parse("s3://bucket").unwrap();
        assert_eq!(loc.root(), "");
    }

    #[test]
    fn keys_follow_root() {
        let d = Digest::from_hex(HELLO_HEX).unwrap();
        assert_eq!(
            ArchiveLocation::parse("s3://bucket/prefix").unwrap().key_for(&d),
            format!("prefix/{HELLO_HEX}")
        );
        assert_eq!(ArchiveLocation::parse("s3://bucket/").unwrap().key_for(&d), HELLO_HEX);
    }

    #[test]
    fn non_s3_schemes_are_config_errors() {
        for url in ["https://bucket/prefix", "gs://bucket", "bucket/prefix", "s3:///prefix"] {
            let err = ArchiveLocation::parse(url).unwrap_err();
            assert!(matches!(err, ArchiveError::Config(_)), "{url}: {err}");
        }
    }

    #[tokio::test]
    async fn push_uploads_under_prefixed_key() {
        let fx = fixture();
        assert!(!fx.archive.exists(&fx.file).await.unwrap());

        let outcome = fx.archive.push(&fx.store, &fx.file).await.unwrap();
        assert_eq!(outcome, PushOutcome::Uploaded);
        let key = format!("prefix/{HELLO_HEX}");
        assert_eq!(fx.backend.keys(), vec![key.clone()]);
        assert_eq!(fx.backend.object(&key).unwrap(), Bytes::from_static(b"hello"));
        assert!(fx.backend.is_encrypted(&key));
        assert!(fx.archive.exists(&fx.file).await.unwrap());
    }

    #[tokio::test]
    async fn push_streams_multi_megabyte_blob() {
        let fx = fixture();
        let data: Vec<u8> = (0..3 * 1024 * 1024 + 17).map(|i| (i % 251) as u8).collect();
        let digest = ContentHasher::hash(&data);
        fs::write(fx.store.storage_path(&digest), &data).unwrap();
        let file = TrackedFile::new(fx.store.root().join("big.bin"), digest);

        assert_eq!(fx.archive.push(&fx.store, &file).await.unwrap(), PushOutcome::Uploaded);
        let stored = fx.backend.object(&format!("prefix/{}", digest.to_hex())).unwrap();
        assert_eq!(stored.len(), data.len());
        assert_eq!(ContentHasher::hash(&stored), digest);
    }

    #[tokio::test]
    async fn push_is_a_no_op_when_present() {
        let fx = fixture();
        fx.archive.push(&fx.store, &fx.file).await.unwrap();
        let outcome = fx.archive.push(&fx.store, &fx.file).await.unwrap();
        assert_eq!(outcome, PushOutcome::AlreadyPresent);
        assert_eq!(fx.backend.put_count(), 1);
    }

    #[tokio::test]
    async fn corrupt_etag_is_absent_and_repushed() {
        let fx = fixture();
        let key = format!("prefix/{HELLO_HEX}");
        fx.backend.insert(key.clone(), "jello");
        assert_eq!(
            fx.archive.probe(fx.file.digest()).await.unwrap(),
            Presence::Corrupt {
                etag: format!("\"{}\"", ContentHasher::hash(b"jello").to_hex())
            }
        );
        assert!(!fx.archive.exists(&fx.file).await.unwrap());

        assert_eq!(fx.archive.push(&fx.store, &fx.file).await.unwrap(), PushOutcome::Uploaded);
        assert_eq!(fx.backend.object(&key).unwrap(), Bytes::from_static(b"hello"));
    }

    #[tokio::test]
    async fn push_refuses_corrupt_local_blob() {
        let fx = fixture();
        fs::write(fx.store.storage_path(fx.file.digest()), b"jello").unwrap();
        let err = fx.archive.push(&fx.store, &fx.file).await.unwrap_err();
        assert!(matches!(err, ArchiveError::Store(StoreError::Integrity { .. })));
        assert!(fx.backend.keys().is_empty());
    }

    #[tokio::test]
    async fn push_without_local_blob() {
        let fx = fixture();
        fs::remove_file(fx.store.storage_path(fx.file.digest())).unwrap();
        let err = fx.archive.push(&fx.store, &fx.file).await.unwrap_err();
        assert!(matches!(err, ArchiveError::Store(StoreError::MissingBlob(_))));
    }

    #[tokio::test]
    async fn push_while_offline_fails() {
        let fx = fixture();
        fx.backend.set_offline(true);
        let err = fx.archive.push(&fx.store, &fx.file).await.unwrap_err();
        assert!(matches!(err, ArchiveError::Network(_)));
    }

    #[tokio::test]
    async fn pull_round_trip() {
        let fx = fixture();
        fx.archive.push(&fx.store, &fx.file).await.unwrap();
        fs::remove_file(fx.store.storage_path(fx.file.digest())).unwrap();

        let n = fx.archive.pull(&fx.store, &fx.file).await.unwrap();
        assert_eq!(n, 5);
        assert!(fx.store.verify_blob(fx.file.digest()));
    }

    #[tokio::test]
    async fn pull_rejects_corrupt_remote_bytes() {
        let fx = fixture();
        fx.archive.push(&fx.store, &fx.file).await.unwrap();
        fs::remove_file(fx.store.storage_path(fx.file.digest())).unwrap();
        fx.backend.corrupt_data(&format!("prefix/{HELLO_HEX}"), "jello");

        let err = fx.archive.pull(&fx.store, &fx.file).await.unwrap_err();
        assert!(matches!(err, ArchiveError::Integrity { .. }));
        assert!(!fx.store.contains(fx.file.digest()));
        // Staging file is gone too.
        assert_eq!(fs::read_dir(fx.store.root()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn pull_missing_object() {
        let fx = fixture();
        let err = fx.archive.pull(&fx.store, &fx.file).await.unwrap_err();
        assert!(matches!(err, ArchiveError::NotFound(_)));
        // The existing local blob is untouched.
        assert!(fx.store.verify_blob(fx.file.digest()));
    }
}
