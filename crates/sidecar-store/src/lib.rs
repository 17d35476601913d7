//! Content-addressed blob storage for sidecar.
//!
//! A [`ContentStore`] is a directory holding one immutable blob per distinct
//! [`Digest`](sidecar_types::Digest), named by the digest's lowercase hex.
//! A [`TrackedFile`] binds a working-tree path to a digest and owns the
//! on-disk transition from "plain file" to "blob in the store plus a
//! relative symlink at the original path".
//!
//! # Design Rules
//!
//! 1. Blobs are immutable once written; the store never rewrites an entry
//!    in place.
//! 2. Blobs enter the store by rename (same filesystem), never by copy.
//! 3. New blob content is staged under a temporary name and renamed into
//!    place only when complete.
//! 4. Links are relative, so a working tree can be moved or cloned without
//!    invalidating them.
//! 5. Distinct digests never touch the same file, so concurrent operations
//!    on different blobs are safe without locking.

pub mod error;
pub mod path;
pub mod store;
pub mod tracked;

pub use error::{StoreError, StoreResult};
pub use path::relative_path;
pub use store::ContentStore;
pub use tracked::{LinkState, RepairAction, TrackedFile};
