// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Billboard detection
//!
//! YOLOv5 ONNX model loading, letterbox preprocessing, output decoding with
//! NMS, and box rendering. The HTTP layer only sees the [`Detector`] trait.

pub mod model;
pub mod postprocess;
pub mod preprocessing;
pub mod render;
pub mod yolo;

pub use model::{Detection, Detector, DetectorConfig, InferenceResult};
pub use postprocess::PostprocessParams;
pub use preprocessing::Letterbox;
pub use render::BoxRenderer;
pub use yolo::YoloDetector;
