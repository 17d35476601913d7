use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{ManifestError, ManifestResult};
use crate::index::Index;

const URL_KEY: &str = "url";

/// String key/value settings stored in the manifest.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Settings(BTreeMap<String, String>);

impl Settings {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    /// The archive URL, if configured.
    pub fn url(&self) -> Option<&str> {
        self.get(URL_KEY)
    }

    pub fn set_url(&mut self, url: impl Into<String>) {
        self.set(URL_KEY, url);
    }
}

/// The persisted record of a sidecar working tree.
///
/// Field names are written lowercase; the capitalised names used by older
/// manifests are accepted on read. Both fields are required and nothing
/// else may appear beside them.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    #[serde(alias = "Settings")]
    pub settings: Settings,
    #[serde(alias = "Index")]
    pub index: Index,
}

impl Manifest {
    /// A fresh manifest with an empty index and the given archive URL.
    pub fn new(url: impl Into<String>) -> Self {
        let mut settings = Settings::default();
        settings.set_url(url);
        Self {
            settings,
            index: Index::new(),
        }
    }

    /// Read and decode the manifest at `path`.
    ///
    /// A missing, unreadable, or undecodable file all mean the same thing to
    /// the caller: the working tree is not initialized.
    ///
    /// A bare `{path: digest}` object, the index-only layout, is migrated
    /// into a manifest without settings. It is written back in the current
    /// layout on the next save.
    pub fn load(path: &Path) -> ManifestResult<Self> {
        let not_initialized = |reason: String| ManifestError::NotInitialized {
            path: path.to_path_buf(),
            reason,
        };
        let data = fs::read(path).map_err(|e| not_initialized(e.to_string()))?;
        let manifest = Self::decode(&data).map_err(|e| not_initialized(e.to_string()))?;
        debug!(path = %path.display(), tracked = manifest.index.len(), "manifest loaded");
        Ok(manifest)
    }

    /// Decode a manifest document, accepting the index-only layout.
    pub fn decode(data: &[u8]) -> Result<Self, serde_json::Error> {
        let err = match serde_json::from_slice::<Manifest>(data) {
            Ok(manifest) => return Ok(manifest),
            Err(err) => err,
        };
        match serde_json::from_slice::<Index>(data) {
            Ok(index) => {
                info!(tracked = index.len(), "migrating index-only manifest");
                Ok(Self {
                    settings: Settings::default(),
                    index,
                })
            }
            Err(_) => Err(err),
        }
    }

    /// Encode the manifest as pretty JSON with sorted keys.
    pub fn to_json(&self) -> ManifestResult<Vec<u8>> {
        let mut data = serde_json::to_vec_pretty(self)
            .map_err(|e| ManifestError::Serialization(e.to_string()))?;
        data.push(b'\n');
        Ok(data)
    }

    /// Write the manifest to `path` via a temporary file in the same
    /// directory and an atomic rename. A crash mid-write leaves the
    /// previous manifest intact.
    pub fn save(&self, path: &Path) -> ManifestResult<()> {
        let data = self.to_json()?;
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let mut tmp = tempfile::Builder::new()
            .prefix(".sidecar.json.")
            .tempfile_in(dir)?;
        tmp.write_all(&data)?;
        tmp.as_file().sync_all()?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tmp.as_file()
                .set_permissions(fs::Permissions::from_mode(0o644))?;
        }
        tmp.persist(path).map_err(|e| ManifestError::Io(e.error))?;
        // The rename is only durable once the directory entry is on disk.
        #[cfg(unix)]
        fs::File::open(dir)?.sync_all()?;

        debug!(path = %path.display(), tracked = self.index.len(), "manifest saved");
        Ok(())
    }
}
