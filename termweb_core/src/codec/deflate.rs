//! Raw DEFLATE (no zlib header) so browsers can decode with the native
//! `DecompressionStream('deflate-raw')` API (spec §4.5).

use super::CodecError;
use miniz_oxide::deflate::compress_to_vec;
use miniz_oxide::inflate::decompress_to_vec_with_limit;

pub const LEVEL: u8 = 6;

pub fn compress(data: &[u8]) -> Vec<u8> {
    compress_to_vec(data, LEVEL)
}

/// Inflate `data`, never producing more than `cap` bytes of output.
pub fn decompress_capped(data: &[u8], cap: usize) -> Result<Vec<u8>, CodecError> {
    decompress_to_vec_with_limit(data, cap).map_err(|_| CodecError::DecompressionFailed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let data = b"pixels pixels pixels".repeat(5);
        let c = compress(&data);
        let d = decompress_capped(&c, 1 << 20).unwrap();
        assert_eq!(d, data);
    }
}
