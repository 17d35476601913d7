use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use sidecar_crypto::ContentHasher;
use sidecar_types::Digest;
use tempfile::{NamedTempFile, TempPath};
use tracing::debug;

use crate::error::{StoreError, StoreResult};

const INCOMING_PREFIX: &str = ".incoming-";
const PARKED_PREFIX: &str = ".parked-";

/// Local directory of immutable blobs keyed by digest.
///
/// The store holds no state beyond its root path; every query goes to the
/// filesystem, so several handles to the same directory stay consistent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContentStore {
    root: PathBuf,
}

impl ContentStore {
    /// Create a handle for the store rooted at `root`.
    ///
    /// Nothing is created on disk; see [`ContentStore::ensure_dir`].
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The store directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the store directory if it does not exist yet.
    pub fn ensure_dir(&self) -> StoreResult<()> {
        fs::create_dir_all(&self.root)?;
        Ok(())
    }

    /// Where the blob for `digest` lives: the store root joined with the
    /// digest's hex encoding.
    pub fn storage_path(&self, digest: &Digest) -> PathBuf {
        self.root.join(digest.to_hex())
    }

    /// Returns `true` if a regular file exists for `digest`.
    ///
    /// Says nothing about whether its content is intact; see
    /// [`ContentStore::verify_blob`].
    pub fn contains(&self, digest: &Digest) -> bool {
        fs::symlink_metadata(self.storage_path(digest))
            .map(|meta| meta.is_file())
            .unwrap_or(false)
    }

    /// Hash the stored blob and compare with `digest`.
    pub fn check_blob(&self, digest: &Digest) -> StoreResult<()> {
        let path = self.storage_path(digest);
        let computed = match ContentHasher::hash_file(&path) {
            Ok(computed) => computed,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::MissingBlob(*digest))
            }
            Err(e) => return Err(e.into()),
        };
        if computed != *digest {
            return Err(StoreError::Integrity {
                path,
                expected: *digest,
                computed,
            });
        }
        Ok(())
    }

    /// Returns `true` only if the blob exists and hashes to `digest`.
    pub fn verify_blob(&self, digest: &Digest) -> bool {
        match self.check_blob(digest) {
            Ok(()) => true,
            Err(e) => {
                debug!(digest = %digest, error = %e, "blob did not verify");
                false
            }
        }
    }

    /// Open a uniquely named temporary file inside the store.
    ///
    /// Content is written to the staging file and moved into place with
    /// [`ContentStore::commit_staged`]. Dropping the handle without committing
    /// removes the file, so an interrupted write never leaves a blob that
    /// looks complete.
    pub fn stage(&self) -> StoreResult<NamedTempFile> {
        self.ensure_dir()?;
        let staged = tempfile::Builder::new()
            .prefix(INCOMING_PREFIX)
            .tempfile_in(&self.root)?;
        Ok(staged)
    }

    /// Atomically rename a staged file to the blob path for `digest`,
    /// replacing any previous (partial or corrupt) content there.
    pub fn commit_staged(&self, staged: NamedTempFile, digest: &Digest) -> StoreResult<PathBuf> {
        let path = self.storage_path(digest);
        staged.persist(&path).map_err(|e| StoreError::Io(e.error))?;
        debug!(digest = %digest, path = %path.display(), "blob committed");
        Ok(path)
    }

    /// Reserve a unique path inside the store to park a file temporarily.
    ///
    /// The reserved path is deleted when the returned guard drops.
    pub(crate) fn park_slot(&self) -> StoreResult<TempPath> {
        let slot = tempfile::Builder::new()
            .prefix(PARKED_PREFIX)
            .tempfile_in(&self.root)?;
        Ok(slot.into_temp_path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn hello() -> Digest {
        ContentHasher::hash(b"hello")
    }

    #[test]
    fn storage_path_is_root_joined_with_hex() {
        let store = ContentStore::new(".sidecar");
        assert_eq!(
            store.storage_path(&hello()),
            Path::new(".sidecar").join("5d41402abc4b2a76b9719d911017c592")
        );
    }

    #[test]
    fn contains_and_verify() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContentStore::new(dir.path().join("store"));
        store.ensure_dir().unwrap();
        assert!(!store.contains(&hello()));
        assert!(!store.verify_blob(&hello()));

        fs::write(store.storage_path(&hello()), b"hello").unwrap();
        assert!(store.contains(&hello()));
        assert!(store.verify_blob(&hello()));
    }

    #[test]
    fn check_blob_reports_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContentStore::new(dir.path());
        fs::write(store.storage_path(&hello()), b"jello").unwrap();
        let err = store.check_blob(&hello()).unwrap_err();
        assert!(matches!(err, StoreError::Integrity { .. }));
        assert!(!store.verify_blob(&hello()));
    }

    #[test]
    fn check_blob_reports_missing() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContentStore::new(dir.path());
        let err = store.check_blob(&hello()).unwrap_err();
        assert!(matches!(err, StoreError::MissingBlob(d) if d == hello()));
    }

    #[test]
    fn staged_file_only_appears_after_commit() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContentStore::new(dir.path().join("store"));
        let mut staged = store.stage().unwrap();
        staged.write_all(b"hello").unwrap();
        assert!(!store.contains(&hello()));

        let path = store.commit_staged(staged, &hello()).unwrap();
        assert_eq!(fs::read(path).unwrap(), b"hello");
        assert!(store.verify_blob(&hello()));
    }

    #[test]
    fn commit_replaces_partial_blob() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContentStore::new(dir.path());
        fs::write(store.storage_path(&hello()), b"hel").unwrap();

        let mut staged = store.stage().unwrap();
        staged.write_all(b"hello").unwrap();
        store.commit_staged(staged, &hello()).unwrap();
        assert!(store.verify_blob(&hello()));
    }

    #[test]
    fn dropped_stage_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContentStore::new(dir.path());
        {
            let mut staged = store.stage().unwrap();
            staged.write_all(b"partial").unwrap();
        }
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
