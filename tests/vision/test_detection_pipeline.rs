// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Detection pipeline tests without a model
//!
//! These tests push synthetic network output through the same steps the
//! detector runs: letterbox, decode + NMS, rescale, render, encode.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use billboard_detection_api::vision::detection::postprocess::postprocess;
use billboard_detection_api::vision::detection::preprocessing::{letterbox, to_tensor};
use billboard_detection_api::vision::detection::render::{class_color, BoxRenderer};
use billboard_detection_api::vision::detection::PostprocessParams;
use billboard_detection_api::vision::{decode_image_bytes, encode_jpeg_base64};
use image::{Rgb, RgbImage};
use ndarray::Array2;

fn params() -> PostprocessParams {
    PostprocessParams {
        conf_threshold: 0.25,
        iou_threshold: 0.45,
        max_detections: 1000,
    }
}

fn class_names() -> Vec<String> {
    vec!["billboard".to_string()]
}

/// One prediction row for a single-class model
fn row(cx: f32, cy: f32, w: f32, h: f32, objectness: f32, score: f32) -> [f32; 6] {
    [cx, cy, w, h, objectness, score]
}

fn predictions(rows: &[[f32; 6]]) -> Array2<f32> {
    let flat: Vec<f32> = rows.iter().flatten().copied().collect();
    Array2::from_shape_vec((rows.len(), 6), flat).unwrap()
}

#[test]
fn test_boxes_map_back_to_wide_frame() {
    // 1280x720 scales by 0.5 into 640x360, padded 140px top and bottom
    let frame = RgbImage::from_pixel(1280, 720, Rgb([30, 30, 30]));
    let (input, transform) = letterbox(&frame, 640);
    assert_eq!(input.dimensions(), (640, 640));
    assert_eq!(transform.pad_y, 140.0);

    let tensor = to_tensor(&input);
    assert_eq!(tensor.shape(), &[1, 3, 640, 640]);

    // Billboard at (200..400, 240..340) in network space
    let output = predictions(&[
        row(300.0, 290.0, 200.0, 100.0, 0.9, 0.95),
        row(302.0, 291.0, 198.0, 100.0, 0.8, 0.9),
        row(500.0, 500.0, 20.0, 20.0, 0.1, 0.9),
    ]);

    let detections =
        postprocess(output.view(), &transform, (1280, 720), &params(), &class_names()).unwrap();

    assert_eq!(detections.len(), 1);
    let d = &detections[0];
    assert_eq!(d.name, "billboard");
    assert_eq!(d.class_id, 0);
    assert!((d.xmin - 400.0).abs() < 1e-3);
    assert!((d.ymin - 200.0).abs() < 1e-3);
    assert!((d.xmax - 800.0).abs() < 1e-3);
    assert!((d.ymax - 400.0).abs() < 1e-3);
}

#[test]
fn test_render_and_encode_detections() {
    let frame = RgbImage::from_pixel(320, 240, Rgb([0, 0, 0]));
    let (_, transform) = letterbox(&frame, 640);

    let output = predictions(&[row(320.0, 320.0, 200.0, 200.0, 0.9, 0.9)]);
    let detections =
        postprocess(output.view(), &transform, (320, 240), &params(), &class_names()).unwrap();
    assert_eq!(detections.len(), 1);

    let rendered = BoxRenderer::bundled().unwrap().render(&frame, &detections);
    assert_eq!(rendered.dimensions(), (320, 240));

    let corner = rendered.get_pixel(
        detections[0].xmin.round() as u32,
        detections[0].ymin.round() as u32,
    );
    assert_eq!(corner, &class_color(0));

    let encoded = encode_jpeg_base64(&rendered, 75).unwrap();
    let jpeg = STANDARD.decode(encoded).unwrap();
    let (decoded, info) = decode_image_bytes(&jpeg, usize::MAX).unwrap();
    assert_eq!((info.width, info.height), (320, 240));
    assert_eq!(decoded.width(), 320);
}

#[test]
fn test_blank_output_gives_no_detections() {
    let frame = RgbImage::new(64, 64);
    let (_, transform) = letterbox(&frame, 640);
    let output = Array2::<f32>::zeros((25_200, 6));

    let detections =
        postprocess(output.view(), &transform, (64, 64), &params(), &class_names()).unwrap();
    assert!(detections.is_empty());

    let rendered = BoxRenderer::bundled().unwrap().render(&frame, &detections);
    assert_eq!(rendered, frame);
}
