use std::path::{Path, PathBuf};

use sidecar_store::{ContentStore, TrackedFile};
use sidecar_types::Digest;

/// File name of the manifest at the working-tree root.
pub const MANIFEST_FILE: &str = "sidecar.json";

/// Directory name of the content store at the working-tree root.
pub const STORE_DIR: &str = ".sidecar";

/// Where a working tree keeps its manifest and content store.
///
/// Passed explicitly to every component that touches disk, so a test can
/// point a whole sidecar instance at a temporary directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkspaceLayout {
    root: PathBuf,
}

impl WorkspaceLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The working-tree root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.root.join(MANIFEST_FILE)
    }

    pub fn store_dir(&self) -> PathBuf {
        self.root.join(STORE_DIR)
    }

    /// The content store of this working tree.
    pub fn store(&self) -> ContentStore {
        ContentStore::new(self.store_dir())
    }

    /// Resolve an index path (relative to the working-tree root unless
    /// absolute) to the filesystem path to operate on.
    pub fn resolve(&self, tracked: &str) -> PathBuf {
        self.root.join(tracked)
    }

    /// Bind an index entry to its on-disk location.
    pub fn tracked_file(&self, tracked: &str, digest: Digest) -> TrackedFile {
        TrackedFile::new(self.resolve(tracked), digest)
    }
}
