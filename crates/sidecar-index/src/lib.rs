//! Manifest and path index for sidecar.
//!
//! The [`Manifest`] is the single persisted root of a sidecar working tree:
//! archive [`Settings`] plus the [`Index`] mapping each tracked path to the
//! digest of its content. [`WorkspaceLayout`] says where the manifest and
//! the content store live for a given working-tree root.
//!
//! # Key Types
//!
//! - [`Manifest`] -- settings + index, loaded and saved as pretty JSON
//! - [`Index`] -- `BTreeMap`-backed path → digest mapping, iterated in
//!   lexicographic path order
//! - [`Settings`] -- string key/value settings (`url` is the archive URL)
//! - [`WorkspaceLayout`] -- manifest and store locations under a root

pub mod error;
pub mod index;
pub mod layout;
pub mod manifest;

pub use error::{ManifestError, ManifestResult};
pub use index::Index;
pub use layout::WorkspaceLayout;
pub use manifest::{Manifest, Settings};
