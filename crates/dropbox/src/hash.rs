//! Dropbox content hash
//!
//! Dropbox reports a content hash computed as the SHA-256 of the
//! concatenated SHA-256 digests of successive 4 MiB blocks. Computing it
//! locally lets callers verify round-trips without re-downloading.

use sha2::{Digest, Sha256};

/// Block size over which per-block digests are taken
pub const BLOCK_SIZE: usize = 4 * 1024 * 1024;

/// Incremental content hasher. Feed arbitrary slices; block boundaries
/// are tracked internally.
pub struct ContentHasher {
    block: Sha256,
    block_len: usize,
    overall: Sha256,
}

impl ContentHasher {
    pub fn new() -> Self {
        Self {
            block: Sha256::new(),
            block_len: 0,
            overall: Sha256::new(),
        }
    }

    pub fn update(&mut self, mut data: &[u8]) {
        while !data.is_empty() {
            let room = BLOCK_SIZE - self.block_len;
            let take = room.min(data.len());
            self.block.update(&data[..take]);
            self.block_len += take;
            data = &data[take..];

            if self.block_len == BLOCK_SIZE {
                self.roll_block();
            }
        }
    }

    fn roll_block(&mut self) {
        let digest = std::mem::take(&mut self.block).finalize();
        self.overall.update(digest);
        self.block_len = 0;
    }

    /// Finish and return the lowercase hex content hash
    pub fn finalize(mut self) -> String {
        if self.block_len > 0 {
            self.roll_block();
        }
        hex::encode(self.overall.finalize())
    }
}

impl Default for ContentHasher {
    fn default() -> Self {
        Self::new()
    }
}

/// One-shot content hash of an in-memory payload
pub fn content_hash(data: &[u8]) -> String {
    let mut hasher = ContentHasher::new();
    hasher.update(data);
    hasher.finalize()
}
