//! The path → digest mapping of tracked files.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sidecar_types::Digest;

/// Tracked path → content digest.
///
/// Paths are stored exactly as given on the command line, not
/// canonicalized. Iteration order is lexicographic by path, which is the
/// submission order for every bulk operation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Index {
    entries: BTreeMap<String, Digest>,
}

impl Index {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tracked paths.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is tracked.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Digest recorded for `path`, if tracked.
    pub fn get(&self, path: &str) -> Option<&Digest> {
        self.entries.get(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    /// Record `path` with `digest`, returning the previous digest if the
    /// path was already tracked.
    pub fn insert(&mut self, path: impl Into<String>, digest: Digest) -> Option<Digest> {
        self.entries.insert(path.into(), digest)
    }

    /// Stop tracking `path`.
    pub fn remove(&mut self, path: &str) -> Option<Digest> {
        self.entries.remove(path)
    }

    /// Tracked paths in lexicographic order.
    pub fn sorted_keys(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    /// `(path, digest)` pairs in lexicographic path order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Digest)> {
        self.entries.iter().map(|(path, digest)| (path.as_str(), digest))
    }
}
