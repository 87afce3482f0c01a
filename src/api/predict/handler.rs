// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Health and detection endpoint handlers

use axum::{extract::State, Json};
use axum_extra::extract::multipart::{MultipartError, MultipartRejection};
use axum_extra::extract::Multipart;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use super::response::{HealthResponse, PredictResponse};
use crate::api::errors::ApiError;
use crate::api::http_server::AppState;
use crate::vision::{decode_image_bytes, encode_jpeg_base64};

/// Multipart field carrying the uploaded image
pub const FILE_FIELD: &str = "file";

/// GET / - Liveness check
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::default())
}

/// POST /predict - Detect billboards in an uploaded image
///
/// # Request
/// - multipart/form-data with the image bytes in the `file` field
///
/// # Response
/// - `detections`: boxes in original pixel coordinates
/// - `boxed_image`: base64 JPEG of the input with labelled boxes drawn
///
/// # Errors
/// - 400 Bad Request: missing `file` field or undecodable image
/// - 413 Payload Too Large: upload over the configured limit
/// - 500 Internal Server Error: detection failed
pub async fn predict_handler(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<PredictResponse>, ApiError> {
    let start = Instant::now();

    let mut multipart = multipart.map_err(|rejection| {
        warn!("Rejected predict body: {}", rejection.body_text());
        ApiError::InvalidRequest(rejection.body_text())
    })?;

    // 1. Find the file field
    let mut upload = None;
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() == Some(FILE_FIELD) {
            upload = Some(field.bytes().await.map_err(multipart_error)?);
            break;
        }
    }
    let bytes = upload.ok_or_else(|| {
        warn!("Predict request without a file field");
        ApiError::InvalidRequest("file field is required".to_string())
    })?;

    // 2. Wait for an inference slot, held until the blocking work ends
    let permit = state
        .inference_permits
        .clone()
        .acquire_owned()
        .await
        .map_err(|_| ApiError::Internal)?;

    // 3. Decode, detect and encode off the async workers
    let detector = state.detector.clone();
    let jpeg_quality = state.jpeg_quality;
    let max_upload_bytes = state.max_upload_bytes;
    let outcome = tokio::task::spawn_blocking(move || {
        let _permit = permit;

        let (image, image_info) = decode_image_bytes(&bytes, max_upload_bytes).map_err(|e| {
            warn!("Failed to decode upload: {}", e);
            ApiError::from(e)
        })?;

        debug!(
            "Decoded {:?} image: {}x{}, {} bytes",
            image_info.format, image_info.width, image_info.height, image_info.size_bytes
        );

        let rgb = image.to_rgb8();
        let result = detector.infer(&rgb).map_err(|e| {
            error!("Detection failed: {:#}", e);
            ApiError::InferenceFailed
        })?;
        let boxed_image = encode_jpeg_base64(&result.rendered, jpeg_quality).map_err(|e| {
            error!("Failed to encode boxed image: {}", e);
            ApiError::Internal
        })?;

        let response = PredictResponse {
            detections: result.detections,
            boxed_image,
        };
        Ok::<_, ApiError>((response, image_info))
    })
    .await
    .map_err(|e| {
        error!("Detection task aborted: {}", e);
        ApiError::Internal
    })?;

    let (response, image_info) = outcome?;

    info!(
        "Predict complete: {} detections on {}x{} image, {}ms",
        response.detections.len(),
        image_info.width,
        image_info.height,
        start.elapsed().as_millis()
    );

    Ok(Json(response))
}

fn multipart_error(err: MultipartError) -> ApiError {
    warn!("Failed to read multipart body: {}", err);
    if err.status().as_u16() == 413 {
        ApiError::PayloadTooLarge(err.body_text())
    } else {
        ApiError::InvalidRequest(err.body_text())
    }
}
