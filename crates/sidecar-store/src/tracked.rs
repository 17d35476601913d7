use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use sidecar_crypto::ContentHasher;
use sidecar_types::Digest;
use tracing::{debug, error, info, warn};

use crate::error::{StoreError, StoreResult};
use crate::path::relative_path;
use crate::store::ContentStore;

/// What currently occupies a tracked path, inspected without following
/// symlinks.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LinkState {
    /// Nothing exists at the path.
    Absent,
    /// A symlink with exactly the expected relative target.
    Linked,
    /// A symlink pointing somewhere else.
    WrongTarget(PathBuf),
    /// A regular file, directory, or other non-symlink object.
    NotALink,
}

/// What [`TrackedFile::repair`] had to do.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RepairAction {
    /// The link was already correct; nothing was touched.
    AlreadyLinked,
    /// The path was empty and a link was created.
    Created,
    /// A stale link was removed and replaced.
    ReplacedLink,
    /// A non-symlink object was removed and replaced by the link.
    ReplacedObject,
}

/// A working-tree path bound to the digest of its content.
///
/// Once added, the path holds a relative symlink into the [`ContentStore`];
/// the tracked file never owns the blob itself.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrackedFile {
    path: PathBuf,
    digest: Digest,
}

impl TrackedFile {
    pub fn new(path: impl Into<PathBuf>, digest: Digest) -> Self {
        Self {
            path: path.into(),
            digest,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn digest(&self) -> &Digest {
        &self.digest
    }

    /// Relative path from this file's directory to its blob in `store`.
    pub fn link_target(&self, store: &ContentStore) -> StoreResult<PathBuf> {
        let dir = self.path.parent().unwrap_or_else(|| Path::new(""));
        relative_path(dir, &store.storage_path(&self.digest))
    }

    /// Move the file into the store and leave a symlink in its place.
    ///
    /// Two-phase and all-or-nothing: the file is renamed into the store, then
    /// the link is created. If linking fails the file is renamed back and
    /// the link error is returned, so the caller sees the path exactly as it
    /// was before the call.
    ///
    /// When the store already holds a blob for this digest, the file is
    /// parked under a temporary name instead of overwriting that blob, and
    /// discarded once the link exists.
    pub fn add(&self, store: &ContentStore) -> StoreResult<()> {
        let target = self.link_target(store)?;
        store.ensure_dir()?;

        let blob = store.storage_path(&self.digest);
        let parked = if store.contains(&self.digest) {
            Some(store.park_slot()?)
        } else {
            None
        };
        let moved_to: &Path = parked.as_deref().unwrap_or(&blob);

        fs::rename(&self.path, moved_to)?;

        if let Err(cause) = symlink(&target, &self.path) {
            if let Err(rollback) = fs::rename(moved_to, &self.path) {
                error!(
                    path = %self.path.display(),
                    parked = %moved_to.display(),
                    error = %rollback,
                    "rollback after failed link did not complete"
                );
                let parked_at = moved_to.to_path_buf();
                if let Some(slot) = parked {
                    // Keep the only copy of the user's data.
                    let _ = slot.keep();
                }
                return Err(StoreError::RollbackFailed {
                    path: self.path.clone(),
                    parked: parked_at,
                    cause,
                    rollback,
                });
            }
            return Err(cause.into());
        }

        if parked.is_some() {
            debug!(path = %self.path.display(), digest = %self.digest, "content already stored; dropped duplicate");
        }
        info!(path = %self.path.display(), target = %target.display(), "added");
        Ok(())
    }

    /// Returns `true` if the content reachable at the path (following the
    /// link) hashes to this file's digest.
    ///
    /// Any failure to read counts as "not verified" rather than an error.
    pub fn verify(&self) -> bool {
        match ContentHasher::hash_file(&self.path) {
            Ok(computed) => computed == self.digest,
            Err(e) => {
                debug!(path = %self.path.display(), error = %e, "verify could not hash");
                false
            }
        }
    }

    /// Inspect the path without following symlinks.
    pub fn link_state(&self, store: &ContentStore) -> StoreResult<LinkState> {
        let target = self.link_target(store)?;
        self.state_against(&target)
    }

    fn state_against(&self, target: &Path) -> StoreResult<LinkState> {
        let meta = match fs::symlink_metadata(&self.path) {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(LinkState::Absent),
            Err(e) => return Err(e.into()),
        };
        if !meta.file_type().is_symlink() {
            return Ok(LinkState::NotALink);
        }
        let current = fs::read_link(&self.path)?;
        if current == target {
            Ok(LinkState::Linked)
        } else {
            Ok(LinkState::WrongTarget(current))
        }
    }

    /// Converge the path onto the correct symlink.
    ///
    /// Idempotent: a correct link is left untouched. Anything else at the
    /// path is removed first and a fresh link created.
    ///
    /// A regular file occupying the path is deleted without comparing its
    /// content against the digest.
    pub fn repair(&self, store: &ContentStore) -> StoreResult<RepairAction> {
        let target = self.link_target(store)?;

        let action = match self.state_against(&target)? {
            LinkState::Linked => return Ok(RepairAction::AlreadyLinked),
            LinkState::Absent => {
                if let Some(parent) = self.path.parent() {
                    if !parent.as_os_str().is_empty() {
                        fs::create_dir_all(parent)?;
                    }
                }
                RepairAction::Created
            }
            LinkState::WrongTarget(old) => {
                debug!(path = %self.path.display(), old = %old.display(), "replacing stale link");
                fs::remove_file(&self.path)?;
                RepairAction::ReplacedLink
            }
            LinkState::NotALink => {
                warn!(path = %self.path.display(), "replacing non-symlink at tracked path; its content is discarded");
                remove_object(&self.path)?;
                RepairAction::ReplacedObject
            }
        };

        info!(path = %self.path.display(), target = %target.display(), "linking");
        symlink(&target, &self.path)?;
        Ok(action)
    }
}

fn remove_object(path: &Path) -> io::Result<()> {
    let meta = fs::symlink_metadata(path)?;
    if meta.is_dir() {
        fs::remove_dir(path)
    } else {
        fs::remove_file(path)
    }
}

#[cfg(unix)]
fn symlink(target: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn symlink(target: &Path, link: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_file(target, link)
}
