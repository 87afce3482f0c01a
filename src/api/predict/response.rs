// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Response bodies for the detection API

use serde::{Deserialize, Serialize};

use crate::vision::Detection;

pub const HEALTH_MESSAGE: &str = "Billboard Detection API is running 🚀";

/// Response from POST /predict
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictResponse {
    /// Detected billboards, highest confidence first
    pub detections: Vec<Detection>,
    /// Base64-encoded JPEG of the input with labelled boxes drawn
    pub boxed_image: String,
}

/// Response from GET /
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthResponse {
    pub message: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            message: HEALTH_MESSAGE.to_string(),
        }
    }
}
