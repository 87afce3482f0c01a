// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Detection types and the detector seam used by the HTTP layer

use anyhow::Result;
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One detected object, in original image pixel coordinates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub xmin: f32,
    pub ymin: f32,
    pub xmax: f32,
    pub ymax: f32,
    /// Confidence score (0.0-1.0)
    pub confidence: f32,
    /// Class id as emitted by the model
    #[serde(rename = "class")]
    pub class_id: i64,
    /// Class label
    pub name: String,
}

/// Detections plus the annotated copy of the input
#[derive(Debug, Clone)]
pub struct InferenceResult {
    /// Sorted by confidence, highest first
    pub detections: Vec<Detection>,
    /// Input image with boxes and labels drawn
    pub rendered: RgbImage,
}

/// Settings for loading and running the detection model
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// Path to the ONNX model file (best.onnx)
    pub model_path: PathBuf,
    /// Class names indexed by class id
    pub class_names: Vec<String>,
    /// Font for label text, overriding the bundled DejaVu Sans
    pub font_path: Option<PathBuf>,
    /// Square network input size
    pub input_size: u32,
    pub conf_threshold: f32,
    pub iou_threshold: f32,
    pub max_detections: usize,
    pub intra_threads: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("./model/best.onnx"),
            class_names: vec!["billboard".to_string()],
            font_path: None,
            input_size: 640,
            conf_threshold: 0.25,
            iou_threshold: 0.45,
            max_detections: 1000,
            intra_threads: 4,
        }
    }
}

/// A loaded detection model
///
/// Implementations are shared read-only across requests, so `infer` takes
/// `&self` and must never mutate the caller's image.
pub trait Detector: Send + Sync {
    fn infer(&self, image: &RgbImage) -> Result<InferenceResult>;
}
