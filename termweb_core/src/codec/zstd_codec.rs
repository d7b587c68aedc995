//! Per-connection zstd compressor/decompressor handles for the app-level
//! WebSocket compression envelope (spec §4.1) and the file-transfer chunk
//! compressor (spec §4.8), plus one-shot helpers for tests.

use super::CodecError;

pub const TRANSFER_LEVEL: i32 = 3;

/// One-shot compress at `level`.
pub fn compress(data: &[u8], level: i32) -> Result<Vec<u8>, CodecError> {
    zstd::bulk::compress(data, level).map_err(|_| CodecError::CompressionFailed)
}

/// One-shot decompress, capped at `cap` bytes of output to defend against
/// zip-bomb expansion. Never allocates past `cap`.
pub fn decompress_capped(data: &[u8], cap: usize) -> Result<Vec<u8>, CodecError> {
    zstd::bulk::decompress(data, cap).map_err(|_| CodecError::OutputTooLarge)
}

/// A reusable per-connection zstd encoder context.
pub struct Compressor {
    inner: zstd::bulk::Compressor<'static>,
}

impl Compressor {
    pub fn new(level: i32) -> Result<Self, CodecError> {
        Ok(Compressor {
            inner: zstd::bulk::Compressor::new(level).map_err(|_| CodecError::CompressionFailed)?,
        })
    }

    pub fn compress(&mut self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        self.inner.compress(data).map_err(|_| CodecError::CompressionFailed)
    }
}

/// A reusable per-connection zstd decoder context with a hard output cap.
pub struct Decompressor {
    inner: zstd::bulk::Decompressor<'static>,
}

impl Decompressor {
    pub fn new() -> Result<Self, CodecError> {
        Ok(Decompressor {
            inner: zstd::bulk::Decompressor::new().map_err(|_| CodecError::DecompressionFailed)?,
        })
    }

    /// Decompress `data`, never allocating more than `cap` bytes of output.
    pub fn decompress(&mut self, data: &[u8], cap: usize) -> Result<Vec<u8>, CodecError> {
        self.inner.decompress(data, cap).map_err(|_| CodecError::OutputTooLarge)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let data = b"hello hello hello hello world".repeat(10);
        let compressed = compress(&data, 3).unwrap();
        let decompressed = decompress_capped(&compressed, 16 * 1024 * 1024).unwrap();
        assert_eq!(decompressed, data);
    }

    #[test]
    fn reusable_contexts_round_trip() {
        let mut enc = Compressor::new(3).unwrap();
        let mut dec = Decompressor::new().unwrap();
        for i in 0..4 {
            let data = format!("frame {i}").repeat(50).into_bytes();
            let c = enc.compress(&data).unwrap();
            let d = dec.decompress(&c, 16 * 1024 * 1024).unwrap();
            assert_eq!(d, data);
        }
    }

    #[test]
    fn zip_bomb_capped() {
        let data = vec![0u8; 1024 * 1024];
        let compressed = compress(&data, 19).unwrap();
        let err = decompress_capped(&compressed, 1024);
        assert!(err.is_err());
    }
}
