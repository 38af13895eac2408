//! Sampled frame container.
//!
//! A `Frame` is one sampled image from a capture unit: packed 8-bit BGR rows,
//! top to bottom. Frames are exclusively owned by the capture task; they are
//! never shared across threads.

use anyhow::{anyhow, Result};

pub const BYTES_PER_PIXEL: usize = 3;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Result<Self> {
        let expected = width as usize * height as usize * BYTES_PER_PIXEL;
        if data.len() != expected {
            return Err(anyhow!(
                "frame buffer size mismatch: got {} bytes, expected {} for {}x{} BGR",
                data.len(),
                expected,
                width,
                height
            ));
        }
        Ok(Self {
            data,
            width,
            height,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Packed BGR bytes, row-major.
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// Iterate pixels as BGR triples.
    pub fn pixels(&self) -> impl Iterator<Item = &[u8]> {
        self.data.chunks_exact(BYTES_PER_PIXEL)
    }
}

/// Integer BT.601 luma approximation for one BGR pixel.
pub(crate) fn luma(bgr: &[u8]) -> u8 {
    let b = bgr[0] as u32;
    let g = bgr[1] as u32;
    let r = bgr[2] as u32;
    ((r * 77 + g * 150 + b * 29) >> 8) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_mismatched_buffer() {
        assert!(Frame::new(vec![0u8; 10], 2, 2).is_err());
        assert!(Frame::new(vec![0u8; 12], 2, 2).is_ok());
    }

    #[test]
    fn luma_extremes() {
        assert_eq!(luma(&[0, 0, 0]), 0);
        // 255 * (77 + 150 + 29) / 256 = 255
        assert_eq!(luma(&[255, 255, 255]), 255);
    }

    #[test]
    fn pixel_iteration_counts() {
        let frame = Frame::new(vec![0u8; 2 * 3 * BYTES_PER_PIXEL], 2, 3).unwrap();
        assert_eq!(frame.pixels().count(), 6);
        assert_eq!(frame.pixel_count(), 6);
    }
}
