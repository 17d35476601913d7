//! Content hashing for sidecar.
//!
//! Wraps the RustCrypto MD5 implementation. MD5 is used as a content
//! fingerprint compatible with object-store ETags, not as a defence against
//! adversarial collisions.

pub mod hasher;

pub use hasher::ContentHasher;
