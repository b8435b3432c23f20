use std::io::Cursor;
use std::path::Path;

use ab_glyph::{FontVec, PxScale};
use image::codecs::jpeg::JpegEncoder;
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;

use crate::rendering::domain::frame_visualizer::FrameVisualizer;
use crate::shared::constants::DEFAULT_JPEG_QUALITY;
use crate::shared::detection::Detection;
use crate::shared::frame::Frame;

const BOX_THICKNESS: i32 = 2;
const LABEL_SCALE: f32 = 16.0;
const LABEL_PADDING: u32 = 2;
/// Glyph width assumed when no font is loaded.
const FALLBACK_GLYPH_WIDTH: u32 = 8;

const HEAD_UP_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const HEAD_DOWN_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const TEXT_COLOR: Rgb<u8> = Rgb([0, 0, 0]);

/// Colours for classes beyond the first two.
const PALETTE: [[u8; 3]; 8] = [
    [0, 114, 255],
    [255, 178, 29],
    [207, 210, 49],
    [72, 249, 10],
    [146, 204, 23],
    [61, 219, 134],
    [26, 147, 52],
    [0, 212, 187],
];

/// Box colour for a class: green for class 0, red for class 1.
pub fn class_color(class_id: u32) -> Rgb<u8> {
    match class_id {
        0 => HEAD_UP_COLOR,
        1 => HEAD_DOWN_COLOR,
        n => Rgb(PALETTE[(n as usize - 2) % PALETTE.len()]),
    }
}

/// Draws class-coloured boxes with `label: confidence` captions and
/// encodes the result as JPEG.
pub struct BoxOverlayVisualizer {
    font: Option<FontVec>,
    jpeg_quality: u8,
}

impl BoxOverlayVisualizer {
    /// Visualizer without a font: caption strips are drawn, text is not.
    pub fn new(jpeg_quality: u8) -> Self {
        Self {
            font: None,
            jpeg_quality: jpeg_quality.clamp(1, 100),
        }
    }

    pub fn with_font_file(path: &Path, jpeg_quality: u8) -> Result<Self, Box<dyn std::error::Error>> {
        let bytes = std::fs::read(path)?;
        let font = FontVec::try_from_vec(bytes)
            .map_err(|e| format!("Invalid font {}: {e}", path.display()))?;
        Ok(Self {
            font: Some(font),
            ..Self::new(jpeg_quality)
        })
    }

    /// Draws the overlay onto a copy of the frame.
    pub fn annotate(&self, frame: &Frame, detections: &[Detection]) -> Option<RgbImage> {
        let mut img = frame.to_rgb_image()?;
        for det in detections {
            let bbox = det.bbox.clamped(frame.width(), frame.height());
            if !bbox.is_proper() {
                continue;
            }
            let color = class_color(det.class_id);
            let x = bbox.x1 as i32;
            let y = bbox.y1 as i32;
            let w = bbox.width().round().max(1.0) as i32;
            let h = bbox.height().round().max(1.0) as i32;

            for t in 0..BOX_THICKNESS {
                let (rw, rh) = (w - 2 * t, h - 2 * t);
                if rw <= 0 || rh <= 0 {
                    break;
                }
                let rect = Rect::at(x + t, y + t).of_size(rw as u32, rh as u32);
                draw_hollow_rect_mut(&mut img, rect, color);
            }

            self.draw_caption(&mut img, x, y, &det.caption(), color);
        }
        Some(img)
    }

    fn draw_caption(&self, img: &mut RgbImage, x: i32, y: i32, caption: &str, color: Rgb<u8>) {
        let scale = PxScale::from(LABEL_SCALE);
        let (text_w, text_h) = match &self.font {
            Some(font) => text_size(scale, font, caption),
            None => (
                caption.chars().count() as u32 * FALLBACK_GLYPH_WIDTH,
                LABEL_SCALE as u32,
            ),
        };
        let strip_w = text_w + 2 * LABEL_PADDING;
        let strip_h = text_h + 2 * LABEL_PADDING;

        // Above the box when there is room, otherwise just inside it
        let strip_y = if y >= strip_h as i32 { y - strip_h as i32 } else { y };
        draw_filled_rect_mut(img, Rect::at(x, strip_y).of_size(strip_w, strip_h), color);

        if let Some(font) = &self.font {
            draw_text_mut(
                img,
                TEXT_COLOR,
                x + LABEL_PADDING as i32,
                strip_y + LABEL_PADDING as i32,
                scale,
                font,
                caption,
            );
        }
    }
}

impl Default for BoxOverlayVisualizer {
    fn default() -> Self {
        Self::new(DEFAULT_JPEG_QUALITY)
    }
}

impl FrameVisualizer for BoxOverlayVisualizer {
    fn render(
        &self,
        frame: &Frame,
        detections: &[Detection],
    ) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
        let img = self
            .annotate(frame, detections)
            .ok_or("Frame data does not match its dimensions")?;
        let mut buf = Cursor::new(Vec::new());
        JpegEncoder::new_with_quality(&mut buf, self.jpeg_quality).encode_image(&img)?;
        Ok(buf.into_inner())
    }
}
