// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Vision processing module for CPU-based billboard detection
//!
//! This module provides:
//! - Image decoding and JPEG encoding helpers
//! - The YOLOv5 detector and its box renderer

pub mod detection;
pub mod image_utils;

pub use detection::{Detection, Detector, DetectorConfig, InferenceResult, YoloDetector};
pub use image_utils::{
    decode_image_bytes, detect_format, encode_jpeg, encode_jpeg_base64, ImageError, ImageInfo,
};
