//! High-level SDK for sidecar.
//!
//! [`Sidecar`] is the entry point for applications and the CLI: it owns the
//! loaded manifest of one working tree and runs every user-facing operation
//! against it. Bulk archive operations report one line per tracked file, in
//! lexicographic path order, through a callback as results arrive.

pub mod error;
pub mod report;
pub mod repository;

pub use error::{SdkError, SdkResult};
pub use report::{AddOutcome, AddReport, PullOutcome, PullReport, PushReport, StatusReport, StatusState};
pub use repository::{InitOutcome, Sidecar, DEFAULT_JOBS};

// Re-export key types
pub use sidecar_index::layout::{MANIFEST_FILE, STORE_DIR};
pub use sidecar_index::{Manifest, WorkspaceLayout};
pub use sidecar_store::RepairAction;
pub use sidecar_sync::{Archive, ArchiveLocation, PushOutcome};
pub use sidecar_types::Digest;
