use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use md5::{Digest as _, Md5};
use sidecar_types::{Digest, DIGEST_LEN};

const READ_BUF_SIZE: usize = 64 * 1024;

/// Computes [`Digest`]s of blob content.
///
/// All entry points consume their input fully and are deterministic: the
/// same bytes always produce the same digest, on every platform.
pub struct ContentHasher;

impl ContentHasher {
    /// Hash an in-memory byte slice.
    pub fn hash(data: &[u8]) -> Digest {
        to_digest(&Md5::digest(data))
    }

    /// Hash everything readable from `reader`.
    ///
    /// Fails only if a read fails; `Interrupted` reads are retried.
    pub fn hash_reader<R: Read>(mut reader: R) -> io::Result<Digest> {
        let mut hasher = Md5::new();
        let mut buf = vec![0u8; READ_BUF_SIZE];
        loop {
            let n = match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            hasher.update(&buf[..n]);
        }
        Ok(to_digest(&hasher.finalize()))
    }

    /// Hash the file at `path`, following symlinks.
    pub fn hash_file(path: &Path) -> io::Result<Digest> {
        let file = File::open(path)?;
        Self::hash_reader(file)
    }

    /// Verify that `data` produces the expected digest.
    pub fn verify(data: &[u8], expected: &Digest) -> bool {
        Self::hash(data) == *expected
    }
}

fn to_digest(out: &[u8]) -> Digest {
    let mut bytes = [0u8; DIGEST_LEN];
    bytes.copy_from_slice(out);
    Digest::from_array(bytes)
}
