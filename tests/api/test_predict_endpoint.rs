// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Detection endpoint tests for POST /predict
//!
//! These tests verify that:
//! - Valid uploads return detections and a JPEG boxed image of the same size
//! - Non-image payloads and missing fields are rejected with 400
//! - Oversized uploads are rejected with 413
//! - Detector failures surface as 500 without detail leakage
//! - Identical requests give identical detections
//! - Concurrent requests never see each other's results
//! - Non-multipart bodies still get a JSON error
//! - An inference slot stays taken while detection runs, even after the
//!   client has gone

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use billboard_detection_api::api::http_server::{create_app, AppState};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tower::util::ServiceExt;

use super::support::{
    half_frame_detector, half_frame_result, jpeg_bytes, json_body, multipart_body, png_bytes,
    predict_request, upload_request, MockBillboardDetector,
};

fn half_frame_state() -> Arc<AppState> {
    Arc::new(AppState::new(Arc::new(half_frame_detector())))
}

fn unused_detector_state() -> Arc<AppState> {
    let mut detector = MockBillboardDetector::new();
    detector.expect_infer().never();
    Arc::new(AppState::new(Arc::new(detector)))
}

#[tokio::test]
async fn test_predict_valid_png() {
    let app = create_app(half_frame_state());

    let response = app.oneshot(upload_request(&png_bytes(64, 48))).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;

    let detections = json["detections"].as_array().unwrap();
    assert_eq!(detections.len(), 1);
    assert_eq!(detections[0]["xmin"], 0.0);
    assert_eq!(detections[0]["xmax"], 32.0);
    assert_eq!(detections[0]["ymax"], 48.0);
    assert_eq!(detections[0]["class"], 0);
    assert_eq!(detections[0]["name"], "billboard");

    let jpeg = STANDARD
        .decode(json["boxed_image"].as_str().unwrap())
        .unwrap();
    assert!(!jpeg.is_empty());
    assert_eq!(&jpeg[..3], &[0xFF, 0xD8, 0xFF]);

    let boxed = image::load_from_memory(&jpeg).unwrap();
    assert_eq!((boxed.width(), boxed.height()), (64, 48));
}

#[tokio::test]
async fn test_predict_valid_jpeg_without_detections() {
    let mut detector = MockBillboardDetector::new();
    detector.expect_infer().times(1).returning(|image| {
        Ok(billboard_detection_api::vision::InferenceResult {
            detections: vec![],
            rendered: image.clone(),
        })
    });
    let app = create_app(Arc::new(AppState::new(Arc::new(detector))));

    let body = multipart_body("file", "street.jpg", "image/jpeg", &jpeg_bytes(40, 30));
    let response = app.oneshot(predict_request(body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert!(json["detections"].as_array().unwrap().is_empty());

    let jpeg = STANDARD
        .decode(json["boxed_image"].as_str().unwrap())
        .unwrap();
    let boxed = image::load_from_memory(&jpeg).unwrap();
    assert_eq!((boxed.width(), boxed.height()), (40, 30));
}

#[tokio::test]
async fn test_predict_non_image_payload() {
    let app = create_app(unused_detector_state());

    let body = multipart_body("file", "notes.txt", "text/plain", b"hello billboard");
    let response = app.oneshot(predict_request(body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = json_body(response).await;
    assert!(json["error"].as_str().unwrap().starts_with("Invalid image"));
    assert!(json.get("detections").is_none());
    assert!(json.get("boxed_image").is_none());
}

#[tokio::test]
async fn test_predict_truncated_png() {
    let app = create_app(unused_detector_state());

    let mut data = png_bytes(64, 64);
    data.truncate(40);
    let response = app.oneshot(upload_request(&data)).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = json_body(response).await;
    assert!(json["error"].is_string());
}

#[tokio::test]
async fn test_predict_empty_file() {
    let app = create_app(unused_detector_state());

    let response = app.oneshot(upload_request(&[])).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_predict_missing_file_field() {
    let app = create_app(unused_detector_state());

    let body = multipart_body("image", "upload.png", "image/png", &png_bytes(8, 8));
    let response = app.oneshot(predict_request(body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = json_body(response).await;
    assert_eq!(json["error"], "file field is required");
}

#[tokio::test]
async fn test_predict_oversized_upload() {
    let mut detector = MockBillboardDetector::new();
    detector.expect_infer().never();
    let state = AppState::new(Arc::new(detector)).with_max_upload_bytes(1024);
    let app = create_app(Arc::new(state));

    let response = app.oneshot(upload_request(&vec![0u8; 2048])).await.unwrap();

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    let json = json_body(response).await;
    assert!(json["error"].is_string());
}

#[tokio::test]
async fn test_predict_inference_failure() {
    let mut detector = MockBillboardDetector::new();
    detector
        .expect_infer()
        .returning(|_| Err(anyhow::anyhow!("session exploded at /models/best.onnx")));
    let app = create_app(Arc::new(AppState::new(Arc::new(detector))));

    let response = app
        .clone()
        .oneshot(upload_request(&png_bytes(16, 16)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let json = json_body(response).await;
    assert_eq!(json["error"], "Inference failed");

    // Service stays up
    let response = app
        .oneshot(super::support::health_request())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_predict_identical_requests() {
    let app = create_app(half_frame_state());
    let data = png_bytes(50, 20);

    let first = json_body(app.clone().oneshot(upload_request(&data)).await.unwrap()).await;
    let second = json_body(app.oneshot(upload_request(&data)).await.unwrap()).await;

    assert_eq!(first["detections"], second["detections"]);
}

#[tokio::test]
async fn test_predict_concurrent_requests_are_isolated() {
    let state = AppState::new(Arc::new(half_frame_detector())).with_max_concurrent_inferences(2);
    let app = create_app(Arc::new(state));

    let sizes: Vec<(u32, u32)> = vec![(20, 10), (40, 30), (64, 64), (100, 12), (8, 80)];
    let requests = sizes.iter().map(|&(w, h)| {
        let app = app.clone();
        async move {
            let response = app.oneshot(upload_request(&png_bytes(w, h))).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            json_body(response).await
        }
    });

    let responses = join_all(requests).await;

    for ((w, h), json) in sizes.iter().zip(responses) {
        let detections = json["detections"].as_array().unwrap();
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0]["xmax"], *w as f64 / 2.0);
        assert_eq!(detections[0]["ymax"], *h as f64);

        let jpeg = STANDARD
            .decode(json["boxed_image"].as_str().unwrap())
            .unwrap();
        let boxed = image::load_from_memory(&jpeg).unwrap();
        assert_eq!((boxed.width(), boxed.height()), (*w, *h));
    }
}

#[tokio::test]
async fn test_predict_non_multipart_body() {
    let app = create_app(unused_detector_state());

    let request = Request::builder()
        .method(Method::POST)
        .uri("/predict")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"file": "billboard.png"}"#))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "application/json"
    );
    let json = json_body(response).await;
    assert!(json["error"].is_string());
    assert!(json.get("detections").is_none());
}

#[tokio::test]
async fn test_predict_slot_held_until_detection_finishes() {
    let mut detector = MockBillboardDetector::new();
    detector.expect_infer().times(1).returning(|image| {
        std::thread::sleep(Duration::from_millis(800));
        Ok(half_frame_result(image))
    });
    let state = Arc::new(AppState::new(Arc::new(detector)).with_max_concurrent_inferences(1));
    let app = create_app(state.clone());

    // Client gives up while detection is still running
    let attempt = tokio::time::timeout(
        Duration::from_millis(200),
        app.oneshot(upload_request(&png_bytes(32, 32))),
    )
    .await;
    assert!(attempt.is_err());
    assert_eq!(state.inference_permits.available_permits(), 0);

    // Slot comes back once the detector returns
    let mut released = false;
    for _ in 0..50 {
        if state.inference_permits.available_permits() == 1 {
            released = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert!(released);
}
