//! Archive synchronization for sidecar.
//!
//! The [`Archive`] is the remote, content-addressed home of every blob: one
//! object per digest at `<root>/<hex digest>` in an object-storage bucket.
//! It offers three operations against a tracked file: an existence check
//! that also validates the remote integrity tag, an upload that asserts the
//! digest to the backend, and a download that lands atomically in the local
//! content store.
//!
//! Transport is behind the [`ObjectBackend`] trait:
//!
//! - [`S3Backend`] -- S3-compatible HTTP API, SigV4-signed
//! - [`InMemoryBackend`] -- `HashMap`-based backend for tests and embedding

pub mod archive;
pub mod backend;
pub mod config;
pub mod error;
pub mod memory;
pub mod s3;
pub mod sigv4;

pub use archive::{Archive, ArchiveLocation, Presence, PushOutcome, ARCHIVE_SCHEME};
pub use backend::{ObjectBackend, ObjectHead, PutOptions};
pub use config::{Credentials, S3Config};
pub use error::{ArchiveError, ArchiveResult};
pub use memory::InMemoryBackend;
pub use s3::S3Backend;
