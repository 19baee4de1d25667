//! Frame annotation and JPEG encoding for the viewer stream.

pub mod glyphs;

use anyhow::{anyhow, Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;

use crate::detect::Detection;
use crate::frame::Frame;

pub const DEFAULT_JPEG_QUALITY: u8 = 80;
pub const DEFAULT_PLACEHOLDER_WIDTH: u32 = 640;
pub const DEFAULT_PLACEHOLDER_HEIGHT: u32 = 480;

const BOX_THICKNESS: i32 = 2;
const LABEL_SCALE: u32 = 2;
const LABEL_PADDING: u32 = 3;
const PLACEHOLDER_BACKGROUND: Rgb<u8> = Rgb([32, 32, 32]);
const TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

/// Text shown on the placeholder frame when a camera cannot be streamed.
pub fn placeholder_message(camera_id: i64) -> String {
    format!("Camera {} unavailable", camera_id)
}

pub fn encode_jpeg(pixels: &[u8], width: u32, height: u32, quality: u8) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100))
        .encode(pixels, width, height, ExtendedColorType::Rgb8)
        .context("encode jpeg")?;
    Ok(out)
}

fn label_color(label: &str) -> Rgb<u8> {
    match label {
        "fire" => Rgb([255, 48, 0]),
        "smoke" => Rgb([170, 170, 170]),
        _ => Rgb([255, 220, 0]),
    }
}

#[derive(Clone, Debug)]
pub struct Annotator {
    jpeg_quality: u8,
    placeholder_width: u32,
    placeholder_height: u32,
}

impl Default for Annotator {
    fn default() -> Self {
        Self {
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            placeholder_width: DEFAULT_PLACEHOLDER_WIDTH,
            placeholder_height: DEFAULT_PLACEHOLDER_HEIGHT,
        }
    }
}

impl Annotator {
    pub fn new(jpeg_quality: u8, placeholder_width: u32, placeholder_height: u32) -> Result<Self> {
        if !(1..=100).contains(&jpeg_quality) {
            return Err(anyhow!("jpeg quality must be within 1..=100"));
        }
        if placeholder_width == 0 || placeholder_height == 0 {
            return Err(anyhow!("placeholder dimensions must be non-zero"));
        }
        Ok(Self {
            jpeg_quality,
            placeholder_width,
            placeholder_height,
        })
    }

    /// Draw each detection's box and `label confidence` tag, then encode.
    pub fn render(&self, frame: Frame, detections: &[Detection]) -> Result<Vec<u8>> {
        let (width, height) = (frame.width, frame.height);
        let mut image = RgbImage::from_raw(width, height, frame.into_pixels())
            .ok_or_else(|| anyhow!("frame buffer does not match {}x{}", width, height))?;
        for detection in detections {
            draw_detection(&mut image, detection);
        }
        encode_jpeg(image.as_raw(), width, height, self.jpeg_quality)
    }

    /// Fixed-size frame carrying `message`, centered.
    pub fn placeholder(&self, message: &str) -> Result<Vec<u8>> {
        let (width, height) = (self.placeholder_width, self.placeholder_height);
        let mut image = RgbImage::from_pixel(width, height, PLACEHOLDER_BACKGROUND);

        let mut scale = 3;
        while scale > 1 && glyphs::text_width(message, scale) + 8 > width {
            scale -= 1;
        }
        let text_w = glyphs::text_width(message, scale) as i32;
        let text_h = (glyphs::GLYPH_HEIGHT * scale) as i32;
        let x = ((width as i32 - text_w) / 2).max(0);
        let y = (height as i32 - text_h) / 2;
        glyphs::draw_text(&mut image, x, y, message, scale, TEXT_COLOR);

        encode_jpeg(image.as_raw(), width, height, self.jpeg_quality)
    }

    pub fn placeholder_size(&self) -> (u32, u32) {
        (self.placeholder_width, self.placeholder_height)
    }
}

fn draw_detection(image: &mut RgbImage, detection: &Detection) {
    let Some((x, y, w, h)) = detection.bbox.to_pixels(image.width(), image.height()) else {
        return;
    };
    let color = label_color(&detection.label);
    for offset in 0..BOX_THICKNESS {
        let inner_w = w.saturating_sub(2 * offset as u32);
        let inner_h = h.saturating_sub(2 * offset as u32);
        if inner_w == 0 || inner_h == 0 {
            break;
        }
        draw_hollow_rect_mut(
            image,
            Rect::at(x + offset, y + offset).of_size(inner_w, inner_h),
            color,
        );
    }

    let text = format!("{} {:.2}", detection.label, detection.confidence);
    let tag_w = glyphs::text_width(&text, LABEL_SCALE) + 2 * LABEL_PADDING;
    let tag_h = glyphs::GLYPH_HEIGHT * LABEL_SCALE + 2 * LABEL_PADDING;
    // Above the box when there is room, otherwise inside its top edge.
    let tag_y = if y >= tag_h as i32 { y - tag_h as i32 } else { y };
    draw_filled_rect_mut(image, Rect::at(x, tag_y).of_size(tag_w, tag_h), color);
    glyphs::draw_text(
        image,
        x + LABEL_PADDING as i32,
        tag_y + LABEL_PADDING as i32,
        &text,
        LABEL_SCALE,
        Rgb([0, 0, 0]),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::BoundingBox;

    fn decode(bytes: &[u8]) -> RgbImage {
        image::load_from_memory_with_format(bytes, image::ImageFormat::Jpeg)
            .unwrap()
            .to_rgb8()
    }

    #[test]
    fn output_is_jpeg_of_frame_size() -> Result<()> {
        let annotator = Annotator::default();
        let frame = Frame::filled(64, 48, 1, [10, 10, 10])?;
        let bytes = annotator.render(frame, &[])?;
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
        assert_eq!(decode(&bytes).dimensions(), (64, 48));
        Ok(())
    }

    #[test]
    fn detections_change_the_picture() -> Result<()> {
        let annotator = Annotator::new(95, 64, 48)?;
        let plain = annotator.render(Frame::filled(64, 48, 1, [0, 0, 0])?, &[])?;
        let boxed = annotator.render(
            Frame::filled(64, 48, 1, [0, 0, 0])?,
            &[Detection::new("fire", 0.87, BoundingBox::new(0.25, 0.5, 0.5, 0.4))],
        )?;
        assert_ne!(plain, boxed);
        // Box edge pixel is strongly red after decode.
        let px = decode(&boxed).get_pixel(16, 40).0;
        assert!(px[0] > 100 && px[0] > px[2] + 50, "unexpected edge colour {px:?}");
        Ok(())
    }

    #[test]
    fn placeholder_has_fixed_size_regardless_of_message() -> Result<()> {
        let annotator = Annotator::default();
        for message in [
            placeholder_message(12),
            "x".repeat(400),
            String::new(),
        ] {
            let img = decode(&annotator.placeholder(&message)?);
            assert_eq!(img.dimensions(), annotator.placeholder_size());
        }
        Ok(())
    }

    #[test]
    fn placeholder_message_names_the_camera() {
        assert_eq!(placeholder_message(12), "Camera 12 unavailable");
    }

    #[test]
    fn rejects_bad_settings() {
        assert!(Annotator::new(0, 640, 480).is_err());
        assert!(Annotator::new(80, 0, 480).is_err());
    }
}
