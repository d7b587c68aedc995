//! Content-addressing hash used by the file-transfer file list. Not
//! cryptographic: only used to detect byte-identical files across a resume.

use twox_hash::XxHash64;

const SEED: u64 = 0;

/// Hash `data` in one pass. Stable across mmap chunking strides since callers
/// always feed the full file contents (or accumulate via [`Hasher`]).
pub fn hash_bytes(data: &[u8]) -> u64 {
    XxHash64::oneshot(SEED, data)
}

/// Incremental hasher for streaming a file through in mmap-sized chunks
/// without materializing the whole file in memory at once.
pub struct Hasher(XxHash64);

impl Hasher {
    pub fn new() -> Self {
        Hasher(XxHash64::with_seed(SEED))
    }

    pub fn write(&mut self, chunk: &[u8]) {
        use std::hash::Hasher as _;
        self.0.write(chunk);
    }

    pub fn finish(self) -> u64 {
        use std::hash::Hasher as _;
        self.0.finish()
    }
}

impl Default for Hasher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic_regardless_of_chunking() {
        let data = b"the quick brown fox jumps over the lazy dog".repeat(37);
        let whole = hash_bytes(&data);

        let mut h = Hasher::new();
        for chunk in data.chunks(17) {
            h.write(chunk);
        }
        assert_eq!(h.finish(), whole);
    }
}
