// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use anyhow::Result;
use billboard_detection_api::{
    api::start_server, config::ServiceConfig, version, vision::YoloDetector,
};
use clap::Parser;
use std::{env, sync::Arc};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    // Initialize tracing subscriber for logging
    if env::var("RUST_LOG").is_err() {
        env::set_var("RUST_LOG", "info");
    }
    tracing_subscriber::fmt::init();

    info!("🚀 Starting Billboard Detection API");
    info!("📦 {}", version::get_version_string());
    info!("📦 BUILD VERSION: {}", version::VERSION);
    info!("Features: {}", version::FEATURES.join(", "));

    let config = ServiceConfig::parse();
    if let Err(e) = config.validate() {
        error!("Invalid configuration: {:#}", e);
        std::process::exit(1);
    }

    info!("Model: {}", config.model_path.display());
    info!(
        "Thresholds: conf {}, iou {}, max detections {}",
        config.conf_threshold, config.iou_threshold, config.max_detections
    );
    info!(
        "Limits: {} byte uploads, {} concurrent inferences, JPEG quality {}",
        config.max_upload_bytes, config.max_concurrent_inferences, config.jpeg_quality
    );
    if config.allows_any_origin() {
        info!("CORS: any origin");
    } else {
        info!("CORS: {}", config.cors_allow_origins.join(", "));
    }

    // The model is required; never serve without it
    let detector = match load_detector(&config).await {
        Ok(detector) => detector,
        Err(e) => {
            error!("Failed to load detection model: {:#}", e);
            std::process::exit(1);
        }
    };

    start_server(&config, Arc::new(detector)).await
}

async fn load_detector(config: &ServiceConfig) -> Result<YoloDetector> {
    let detector_config = config.detector_config()?;
    YoloDetector::load(detector_config).await
}
