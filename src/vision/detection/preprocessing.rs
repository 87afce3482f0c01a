// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Letterbox preprocessing for the YOLOv5 detector

use image::{imageops, imageops::FilterType, Rgb, RgbImage};
use ndarray::Array4;

/// Padding color used by YOLOv5 letterboxing
pub const PAD_VALUE: u8 = 114;

/// Geometry of a letterbox transform, used to map boxes back
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    /// Scale applied to the original image
    pub gain: f32,
    /// Horizontal padding (left) in network pixels
    pub pad_x: f32,
    /// Vertical padding (top) in network pixels
    pub pad_y: f32,
}

impl Letterbox {
    /// Map a point from network input space to original image space
    pub fn to_original(&self, x: f32, y: f32) -> (f32, f32) {
        ((x - self.pad_x) / self.gain, (y - self.pad_y) / self.gain)
    }
}

/// Resize with aspect ratio preservation and pad to a square canvas
///
/// The image is scaled to fit within `target_size x target_size`, then
/// centered on a gray (114) canvas. The input image is left untouched.
pub fn letterbox(image: &RgbImage, target_size: u32) -> (RgbImage, Letterbox) {
    let (orig_w, orig_h) = image.dimensions();
    let gain = (target_size as f32 / orig_w as f32).min(target_size as f32 / orig_h as f32);

    let new_w = ((orig_w as f32 * gain).round() as u32).clamp(1, target_size);
    let new_h = ((orig_h as f32 * gain).round() as u32).clamp(1, target_size);

    let pad_x = (target_size - new_w) / 2;
    let pad_y = (target_size - new_h) / 2;

    let mut canvas = RgbImage::from_pixel(target_size, target_size, Rgb([PAD_VALUE; 3]));
    if (new_w, new_h) == (orig_w, orig_h) {
        imageops::overlay(&mut canvas, image, pad_x as i64, pad_y as i64);
    } else {
        let resized = imageops::resize(image, new_w, new_h, FilterType::Triangle);
        imageops::overlay(&mut canvas, &resized, pad_x as i64, pad_y as i64);
    }

    (
        canvas,
        Letterbox {
            gain,
            pad_x: pad_x as f32,
            pad_y: pad_y as f32,
        },
    )
}

/// Convert an RGB image to an NCHW tensor scaled to [0, 1]
pub fn to_tensor(image: &RgbImage) -> Array4<f32> {
    let (w, h) = image.dimensions();
    let mut tensor = Array4::<f32>::zeros((1, 3, h as usize, w as usize));

    for (x, y, pixel) in image.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] = pixel[c] as f32 / 255.0;
        }
    }

    tensor
}
