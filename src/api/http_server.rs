// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use anyhow::Result;
use axum::{
    extract::DefaultBodyLimit,
    http::HeaderValue,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use super::predict::{health_handler, predict_handler};
use crate::config::{ServiceConfig, DEFAULT_MAX_UPLOAD_BYTES};
use crate::vision::Detector;

/// Room for multipart boundaries and part headers on top of the image itself
pub const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

pub const DEFAULT_JPEG_QUALITY: u8 = 75;
pub const DEFAULT_MAX_CONCURRENT_INFERENCES: usize = 4;

/// Shared service context, built once at startup
#[derive(Clone)]
pub struct AppState {
    pub detector: Arc<dyn Detector>,
    /// Bounds how many requests may queue CPU work at once
    pub inference_permits: Arc<Semaphore>,
    pub jpeg_quality: u8,
    pub max_upload_bytes: usize,
    /// `*` allows any origin
    pub cors_allow_origins: Vec<String>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("available_permits", &self.inference_permits.available_permits())
            .field("jpeg_quality", &self.jpeg_quality)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .field("cors_allow_origins", &self.cors_allow_origins)
            .finish_non_exhaustive()
    }
}

impl AppState {
    pub fn new(detector: Arc<dyn Detector>) -> Self {
        Self {
            detector,
            inference_permits: Arc::new(Semaphore::new(DEFAULT_MAX_CONCURRENT_INFERENCES)),
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            cors_allow_origins: vec!["*".to_string()],
        }
    }

    pub fn from_config(config: &ServiceConfig, detector: Arc<dyn Detector>) -> Self {
        Self::new(detector)
            .with_jpeg_quality(config.jpeg_quality)
            .with_max_upload_bytes(config.max_upload_bytes)
            .with_max_concurrent_inferences(config.max_concurrent_inferences)
            .with_cors_origins(config.cors_allow_origins.clone())
    }

    pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality;
        self
    }

    pub fn with_max_upload_bytes(mut self, max_bytes: usize) -> Self {
        self.max_upload_bytes = max_bytes;
        self
    }

    pub fn with_max_concurrent_inferences(mut self, permits: usize) -> Self {
        self.inference_permits = Arc::new(Semaphore::new(permits.max(1)));
        self
    }

    pub fn with_cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_allow_origins = origins;
        self
    }
}

/// Build the service router
///
/// Routes:
/// - `GET /` health message
/// - `POST /predict` multipart image upload
pub fn create_app(state: Arc<AppState>) -> Router {
    let body_limit = state.max_upload_bytes.saturating_add(MULTIPART_OVERHEAD_BYTES);
    let cors = cors_layer(&state.cors_allow_origins);

    Router::new()
        .route("/", get(health_handler))
        .route("/predict", post(predict_handler))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o.trim() == "*") {
        return CorsLayer::permissive();
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Serve the detection API until Ctrl-C
pub async fn start_server(config: &ServiceConfig, detector: Arc<dyn Detector>) -> Result<()> {
    let state = Arc::new(AppState::from_config(config, detector));
    let app = create_app(state);

    let addr = config.socket_addr();
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("Billboard detection API listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
