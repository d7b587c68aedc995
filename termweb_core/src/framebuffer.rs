//! Per-panel pixel capture, XOR-delta/keyframe selection, and raw-DEFLATE
//! compression (spec §3 "FrameBuffer", §4.5).

use crate::codec::deflate;
use crate::surface::FramebufferView;

pub const HEADER_LEN: usize = 13;
pub const KEYFRAME_INTERVAL_MS: u64 = 2000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PixelFrameType {
    Keyframe = 1,
    Delta = 2,
    RequestKeyframe = 3,
}

/// Four same-sized buffers plus a compression scratch buffer (spec §3).
/// `current`/`previous` are swapped, never copied, at the end of each frame.
pub struct FrameBuffer {
    width: u32,
    height: u32,
    raw_bgra: Vec<u8>,
    current_rgb: Vec<u8>,
    previous_rgb: Vec<u8>,
    diff: Vec<u8>,
    compressed: Vec<u8>,
}

impl FrameBuffer {
    pub fn new(width: u32, height: u32) -> Self {
        let rgb_len = (width * height * 3) as usize;
        FrameBuffer {
            width,
            height,
            raw_bgra: vec![0u8; (width * height * 4) as usize],
            current_rgb: vec![0u8; rgb_len],
            previous_rgb: vec![0u8; rgb_len],
            diff: vec![0u8; rgb_len],
            compressed: vec![0u8; rgb_len + 1024],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Discard all buffers and resize; the caller must force a keyframe.
    pub fn resize(&mut self, width: u32, height: u32) {
        *self = FrameBuffer::new(width, height);
    }

    /// Copy `view` into the BGRA scratch buffer (handling a source stride
    /// wider than `width*4`), then convert to RGB into `current`.
    pub fn capture(&mut self, view: &FramebufferView<'_>) {
        debug_assert_eq!(view.width, self.width);
        debug_assert_eq!(view.height, self.height);
        let dst_row = (self.width * 4) as usize;
        let src_row = view.stride as usize;
        for row in 0..self.height as usize {
            let n = dst_row.min(src_row);
            let src = &view.bgra[row * src_row..row * src_row + n];
            let dst = &mut self.raw_bgra[row * dst_row..row * dst_row + n];
            dst.copy_from_slice(src);
        }
        bgra_to_rgb(&self.raw_bgra, &mut self.current_rgb, self.width, self.height);
    }

    /// Decide keyframe vs delta, compress, write the 13-byte header, swap
    /// buffers, and return the finished wire packet. `sequence` is the value
    /// to stamp into the header for this frame (monotonic, owned by the
    /// caller so it survives buffer resets).
    pub fn prepare_frame(
        &mut self,
        sequence: u32,
        force_keyframe: bool,
        last_keyframe_ms: &mut u64,
        now_ms: u64,
    ) -> Option<(PixelFrameType, &[u8])> {
        let is_keyframe =
            sequence == 0 || force_keyframe || now_ms.saturating_sub(*last_keyframe_ms) >= KEYFRAME_INTERVAL_MS;

        let deflated = if is_keyframe {
            deflate::compress(&self.current_rgb)
        } else {
            xor_diff(&self.current_rgb, &self.previous_rgb, &mut self.diff);
            deflate::compress(&self.diff)
        };

        if is_keyframe {
            *last_keyframe_ms = now_ms;
        }

        let frame_type = if is_keyframe { PixelFrameType::Keyframe } else { PixelFrameType::Delta };
        self.write_packet(frame_type, sequence, &deflated);

        std::mem::swap(&mut self.current_rgb, &mut self.previous_rgb);

        Some((frame_type, &self.compressed[..HEADER_LEN + deflated.len()]))
    }

    fn write_packet(&mut self, frame_type: PixelFrameType, sequence: u32, deflated: &[u8]) {
        let total = HEADER_LEN + deflated.len();
        if self.compressed.len() < total {
            self.compressed.resize(total, 0);
        }
        self.compressed[0] = frame_type as u8;
        self.compressed[1..5].copy_from_slice(&sequence.to_le_bytes());
        self.compressed[5..7].copy_from_slice(&(self.width as u16).to_le_bytes());
        self.compressed[7..9].copy_from_slice(&(self.height as u16).to_le_bytes());
        self.compressed[9..13].copy_from_slice(&(deflated.len() as u32).to_le_bytes());
        self.compressed[HEADER_LEN..total].copy_from_slice(deflated);
    }
}

/// `(R=src[2], G=src[1], B=src[0])`, alpha dropped (spec §4.5 "BGRA→RGB").
fn bgra_to_rgb(bgra: &[u8], rgb: &mut [u8], width: u32, height: u32) {
    let pixels = (width * height) as usize;
    for i in 0..pixels {
        let s = &bgra[i * 4..i * 4 + 4];
        let d = &mut rgb[i * 3..i * 3 + 3];
        d[0] = s[2];
        d[1] = s[1];
        d[2] = s[0];
    }
}

/// `diff[i] = current[i] ^ previous[i]`, batched 32 bytes at a time to help
/// auto-vectorization (spec §4.5 "XOR diff").
fn xor_diff(current: &[u8], previous: &[u8], diff: &mut [u8]) {
    let chunks = diff.len() / 32;
    for c in 0..chunks {
        let base = c * 32;
        for i in 0..32 {
            diff[base + i] = current[base + i] ^ previous[base + i];
        }
    }
    for i in chunks * 32..diff.len() {
        diff[i] = current[i] ^ previous[i];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xor_delta_reconstructs_current_from_previous() {
        let previous = vec![0xAAu8; 130];
        let current: Vec<u8> = (0..130u32).map(|i| (i * 7) as u8).collect();
        let mut diff = vec![0u8; 130];
        xor_diff(&current, &previous, &mut diff);

        // previous ^ delta = current
        let reconstructed: Vec<u8> = previous.iter().zip(diff.iter()).map(|(p, d)| p ^ d).collect();
        assert_eq!(reconstructed, current);
    }

    #[test]
    fn first_frame_is_always_a_keyframe() {
        let mut fb = FrameBuffer::new(4, 4);
        let mut last_keyframe_ms = 0u64;
        let (kind, _) = fb.prepare_frame(0, false, &mut last_keyframe_ms, 1000).unwrap();
        assert_eq!(kind, PixelFrameType::Keyframe);
    }

    #[test]
    fn keyframe_interval_forces_refresh() {
        let mut fb = FrameBuffer::new(4, 4);
        let mut last_keyframe_ms = 0u64;
        let (kind, _) = fb.prepare_frame(1, false, &mut last_keyframe_ms, 2500).unwrap();
        assert_eq!(kind, PixelFrameType::Keyframe);
        assert_eq!(last_keyframe_ms, 2500);
    }

    #[test]
    fn otherwise_emits_delta() {
        let mut fb = FrameBuffer::new(4, 4);
        let mut last_keyframe_ms = 1000u64;
        let (kind, _) = fb.prepare_frame(1, false, &mut last_keyframe_ms, 1500).unwrap();
        assert_eq!(kind, PixelFrameType::Delta);
    }

    #[test]
    fn bgra_to_rgb_handles_padded_stride() {
        // 2x1 image with a stride wider than width*4 (hardware surface case).
        let mut src = vec![0u8; 16];
        src[0..4].copy_from_slice(&[10, 20, 30, 255]); // pixel 0 BGRA
        src[4..8].copy_from_slice(&[40, 50, 60, 255]); // pixel 1 BGRA
        let view = FramebufferView { width: 2, height: 1, stride: 16, bgra: &src };

        let mut fb = FrameBuffer::new(2, 1);
        fb.capture(&view);
        assert_eq!(&fb.current_rgb, &[30, 20, 10, 60, 50, 40]);
    }

    #[test]
    fn packet_header_matches_wire_layout() {
        let mut fb = FrameBuffer::new(3, 2);
        let mut last_keyframe_ms = 0;
        let (_, packet) = fb.prepare_frame(7, true, &mut last_keyframe_ms, 0).unwrap();
        assert_eq!(packet[0], PixelFrameType::Keyframe as u8);
        assert_eq!(u32::from_le_bytes(packet[1..5].try_into().unwrap()), 7);
        assert_eq!(u16::from_le_bytes(packet[5..7].try_into().unwrap()), 3);
        assert_eq!(u16::from_le_bytes(packet[7..9].try_into().unwrap()), 2);
        let compressed_size = u32::from_le_bytes(packet[9..13].try_into().unwrap()) as usize;
        assert_eq!(packet.len(), HEADER_LEN + compressed_size);
    }
}
