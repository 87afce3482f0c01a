// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Detection API endpoint module
//!
//! Provides POST /predict for detecting billboards in an uploaded image.

pub mod handler;
pub mod response;

pub use handler::{health_handler, predict_handler};
pub use response::{HealthResponse, PredictResponse, HEALTH_MESSAGE};
