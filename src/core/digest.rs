//! Incremental SHA-1 content digests

use sha1::{Digest, Sha1};

/// Length of a hex-encoded digest
pub const DIGEST_HEX_LEN: usize = 40;

/// Running digest over the exact bytes of one archived file
#[derive(Clone, Default)]
pub struct ContentHasher {
    inner: Sha1,
    bytes: u64,
}

impl ContentHasher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
        self.bytes += data.len() as u64;
    }

    /// Number of bytes fed so far
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    /// Lowercase hex digest of everything fed so far
    pub fn hex_digest(&self) -> String {
        hex::encode(self.inner.clone().finalize())
    }
}

impl std::fmt::Debug for ContentHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentHasher")
            .field("bytes", &self.bytes)
            .finish()
    }
}

/// Hex digest of an in-memory buffer
pub fn hex_digest(data: &[u8]) -> String {
    let mut hasher = ContentHasher::new();
    hasher.update(data);
    hasher.hex_digest()
}

/// Whether `digest` has the shape of a stored digest
pub fn is_valid_hex_digest(digest: &str) -> bool {
    digest.len() == DIGEST_HEX_LEN && digest.bytes().all(|b| b.is_ascii_hexdigit())
}
