use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// Axis-aligned box in normalized coordinates (0..1 of frame width/height).
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl BoundingBox {
    pub fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self { x, y, w, h }
    }

    /// Pixel rectangle `(x, y, w, h)` clamped to a `width` x `height` frame.
    ///
    /// Returns `None` when nothing of the box is inside the frame.
    pub fn to_pixels(&self, width: u32, height: u32) -> Option<(i32, i32, u32, u32)> {
        let fw = width as f32;
        let fh = height as f32;
        let x0 = (self.x * fw).clamp(0.0, fw);
        let y0 = (self.y * fh).clamp(0.0, fh);
        let x1 = ((self.x + self.w) * fw).clamp(0.0, fw);
        let y1 = ((self.y + self.h) * fh).clamp(0.0, fh);
        let w = (x1 - x0).round() as u32;
        let h = (y1 - y0).round() as u32;
        if w == 0 || h == 0 {
            return None;
        }
        Some((x0.round() as i32, y0.round() as i32, w, h))
    }
}

/// Detector output before label lookup.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawDetection {
    pub class_id: usize,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

/// A labeled detection tied to the frame it came from.
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    pub label: String,
    /// 0.0..=1.0
    pub confidence: f32,
    pub bbox: BoundingBox,
    pub frame_timestamp: DateTime<Local>,
}

impl Detection {
    pub fn new(label: impl Into<String>, confidence: f32, bbox: BoundingBox) -> Self {
        Self {
            label: label.into(),
            confidence,
            bbox,
            frame_timestamp: Local::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn box_maps_to_pixels() {
        let bbox = BoundingBox::new(0.25, 0.5, 0.5, 0.25);
        assert_eq!(bbox.to_pixels(100, 40), Some((25, 20, 50, 10)));
    }

    #[test]
    fn box_is_clamped_to_frame() {
        let bbox = BoundingBox::new(0.9, -0.2, 0.5, 0.4);
        assert_eq!(bbox.to_pixels(100, 100), Some((90, 0, 10, 20)));
        assert_eq!(BoundingBox::new(1.5, 0.0, 0.2, 0.2).to_pixels(100, 100), None);
    }
}
