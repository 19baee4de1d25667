//! Decoded video frames.
//!
//! A `Frame` lives for exactly one pipeline iteration: the ingest layer produces it, the
//! sampler either forwards or drops it, and the session hands it to the detector and the
//! annotator. Frames are never cloned across sessions and never written to disk.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Local};

/// One decoded RGB8 image.
pub struct Frame {
    /// Packed RGB pixels, `width * height * 3` bytes, row-major.
    pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// 1-indexed position of this frame in the source's output.
    pub sequence: u64,
    /// Wall-clock time the frame was captured.
    pub captured_at: DateTime<Local>,
}

// No Clone: ownership moves linearly through the pipeline.

impl Frame {
    pub fn new(pixels: Vec<u8>, width: u32, height: u32, sequence: u64) -> Result<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|n| n.checked_mul(3))
            .ok_or_else(|| anyhow!("frame dimensions overflow: {}x{}", width, height))?;
        if pixels.len() != expected {
            return Err(anyhow!(
                "frame buffer is {} bytes, expected {} for {}x{} RGB",
                pixels.len(),
                expected,
                width,
                height
            ));
        }
        Ok(Self {
            pixels,
            width,
            height,
            sequence,
            captured_at: Local::now(),
        })
    }

    /// Solid-colour frame, mostly useful for synthetic sources and tests.
    pub fn filled(width: u32, height: u32, sequence: u64, rgb: [u8; 3]) -> Result<Self> {
        let pixels = rgb
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * 3)
            .collect();
        Self::new(pixels, width, height, sequence)
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn into_pixels(self) -> Vec<u8> {
        self.pixels
    }

    pub fn byte_len(&self) -> usize {
        self.pixels.len()
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Pixel content stays out of logs.
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("sequence", &self.sequence)
            .field("captured_at", &self.captured_at)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_mismatched_buffer() {
        let err = Frame::new(vec![0u8; 10], 4, 4, 1).unwrap_err();
        assert!(err.to_string().contains("expected 48"));
    }

    #[test]
    fn filled_frame_has_expected_size() -> Result<()> {
        let frame = Frame::filled(8, 2, 3, [1, 2, 3])?;
        assert_eq!(frame.byte_len(), 8 * 2 * 3);
        assert_eq!(&frame.pixels()[..6], &[1, 2, 3, 1, 2, 3]);
        assert_eq!(frame.sequence, 3);
        Ok(())
    }

    #[test]
    fn debug_output_omits_pixels() -> Result<()> {
        let frame = Frame::filled(2, 2, 1, [9, 9, 9])?;
        let text = format!("{:?}", frame);
        assert!(text.contains("sequence: 1"));
        assert!(!text.contains("pixels"));
        Ok(())
    }
}
