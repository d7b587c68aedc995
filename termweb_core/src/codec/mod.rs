//! Thin safe wrappers around the three codec libraries the core treats as
//! external collaborators: content hashing, zstd, and raw DEFLATE.
//! No other module reaches for `zstd`/`miniz_oxide`/`twox_hash` types directly.

pub mod deflate;
pub mod hash;
pub mod zstd_codec;

#[derive(Debug)]
pub enum CodecError {
    CompressionFailed,
    DecompressionFailed,
    OutputTooLarge,
}

impl std::fmt::Display for CodecError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CodecError::CompressionFailed => write!(f, "compression failed"),
            CodecError::DecompressionFailed => write!(f, "decompression failed"),
            CodecError::OutputTooLarge => write!(f, "decompressed output exceeds cap"),
        }
    }
}

impl std::error::Error for CodecError {}
