//! Foundation types for sidecar.
//!
//! Every other sidecar crate depends on `sidecar-types`. The central type is
//! [`Digest`], the fixed-size content fingerprint used both as the local
//! store key (lowercase hex) and as the integrity assertion sent to the
//! remote archive (standard base64).

pub mod digest;
pub mod error;

pub use digest::{Digest, DIGEST_LEN};
pub use error::TypeError;
