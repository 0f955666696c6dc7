//! Large-object plumbing: streaming digests and externalization decisions.

use std::io::{self, Read};

use sha2::{Digest, Sha256};

use crate::config::LobConfig;
use crate::paths::LobKind;

/// Digest algorithm recorded on large-object references.
pub const DIGEST_TYPE: &str = "SHA-256";

/// Counts and hashes bytes as they are copied through.
pub struct DigestReader<R> {
    inner: R,
    hasher: Sha256,
    length: u64,
}

impl<R: Read> DigestReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
            length: 0,
        }
    }

    /// Bytes read so far and their lowercase hex digest.
    pub fn finish(self) -> (u64, String) {
        (self.length, hex::encode(self.hasher.finalize()))
    }
}

impl<R: Read> Read for DigestReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.hasher.update(&buf[..n]);
        self.length += n as u64;
        Ok(n)
    }
}

/// Threshold for a kind of large object.
pub fn threshold(config: &LobConfig, kind: LobKind) -> u64 {
    match kind {
        // XML records are character data.
        LobKind::Character | LobKind::Xml => config.clob_threshold,
        LobKind::Binary => config.blob_threshold,
    }
}

/// A value of `size` bytes is externalized when strictly larger than its
/// threshold; a value exactly at the threshold stays inline.
pub fn should_externalize(config: &LobConfig, kind: LobKind, size: u64) -> bool {
    size > threshold(config, kind)
}
