// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Draws detections onto a copy of the input image

use ab_glyph::{FontArc, FontRef, PxScale};
use anyhow::{anyhow, Context, Result};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use std::path::Path;

use super::model::Detection;

/// Ultralytics class color palette
pub const PALETTE: [[u8; 3]; 20] = [
    [0xFF, 0x38, 0x38],
    [0xFF, 0x9D, 0x97],
    [0xFF, 0x70, 0x1F],
    [0xFF, 0xB2, 0x1D],
    [0xCF, 0xD2, 0x31],
    [0x48, 0xF9, 0x0A],
    [0x92, 0xCC, 0x17],
    [0x3D, 0xDB, 0x86],
    [0x1A, 0x93, 0x34],
    [0x00, 0xD4, 0xBB],
    [0x2C, 0x99, 0xA8],
    [0x00, 0xC2, 0xFF],
    [0x34, 0x45, 0x93],
    [0x64, 0x73, 0xFF],
    [0x00, 0x18, 0xEC],
    [0x84, 0x38, 0xFF],
    [0x52, 0x00, 0x85],
    [0xCB, 0x38, 0xFF],
    [0xFF, 0x95, 0xC8],
    [0xFF, 0x37, 0xC7],
];

const TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

pub fn class_color(class_id: i64) -> Rgb<u8> {
    Rgb(PALETTE[class_id.rem_euclid(PALETTE.len() as i64) as usize])
}

/// Box outline width for an image, never below 2px
pub fn line_width(width: u32, height: u32) -> u32 {
    (((width + height) as f32 / 2.0 * 0.003).round() as u32).max(2)
}

/// Label font size for an image, never below 12px
pub fn font_size(width: u32, height: u32) -> f32 {
    ((width + height) as f32 / 2.0 * 0.035).round().max(12.0)
}

pub fn label_text(detection: &Detection) -> String {
    format!("{} {:.2}", detection.name, detection.confidence)
}

/// DejaVu Sans, used for labels unless another font is configured
pub const BUNDLED_FONT: &[u8] = include_bytes!("../../../assets/fonts/DejaVuSans.ttf");

/// Renders boxes with `"<name> <confidence>"` label tags
pub struct BoxRenderer {
    font: FontArc,
}

impl std::fmt::Debug for BoxRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoxRenderer").finish_non_exhaustive()
    }
}

impl BoxRenderer {
    pub fn new(font: FontArc) -> Self {
        Self { font }
    }

    /// Renderer using the font compiled into the binary
    pub fn bundled() -> Result<Self> {
        let font = FontRef::try_from_slice(BUNDLED_FONT)
            .map_err(|e| anyhow!("Invalid bundled font: {}", e))?;
        Ok(Self::new(FontArc::new(font)))
    }

    pub fn from_font_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read font {}", path.display()))?;
        let font = FontArc::try_from_vec(bytes)
            .map_err(|e| anyhow!("Invalid font {}: {}", path.display(), e))?;
        Ok(Self::new(font))
    }

    /// Draw every detection onto a clone of `image`
    pub fn render(&self, image: &RgbImage, detections: &[Detection]) -> RgbImage {
        let mut canvas = image.clone();
        let (width, height) = canvas.dimensions();
        let lw = line_width(width, height);
        let scale = PxScale::from(font_size(width, height));

        for detection in detections {
            let color = class_color(detection.class_id);
            let x1 = detection.xmin.round() as i32;
            let y1 = detection.ymin.round() as i32;
            let box_w = (detection.xmax.round() as i32 - x1).max(1) as u32;
            let box_h = (detection.ymax.round() as i32 - y1).max(1) as u32;

            // Concentric outlines, growing inward
            for i in 0..lw {
                if box_w <= 2 * i || box_h <= 2 * i {
                    break;
                }
                let rect = Rect::at(x1 + i as i32, y1 + i as i32)
                    .of_size(box_w - 2 * i, box_h - 2 * i);
                draw_hollow_rect_mut(&mut canvas, rect, color);
            }

            let text = label_text(detection);
            let (tag_w, tag_h) = self.tag_size(scale, &text);

            // Above the box when it fits, inside otherwise
            let tag_y = if y1 >= tag_h as i32 { y1 - tag_h as i32 } else { y1 };
            draw_filled_rect_mut(&mut canvas, Rect::at(x1, tag_y).of_size(tag_w, tag_h), color);
            draw_text_mut(&mut canvas, TEXT_COLOR, x1 + 2, tag_y + 2, scale, &self.font, &text);
        }

        canvas
    }

    /// Label tag size: text extent plus a 2px margin on each side
    fn tag_size(&self, scale: PxScale, text: &str) -> (u32, u32) {
        let (text_w, text_h) = text_size(scale, &self.font, text);
        (text_w as u32 + 4, text_h as u32 + 4)
    }
}
