// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Service configuration resolved once at startup
//!
//! Every option can be given as a flag or through the environment
//! (a `.env` file is loaded by the binary before parsing).

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use crate::vision::detection::DetectorConfig;

/// Default listening port
pub const DEFAULT_PORT: u16 = 8000;

/// Default upload limit (10MB)
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Billboard Detection API server
#[derive(Parser, Debug, Clone)]
#[command(name = "billboard-detection-api")]
#[command(version)]
#[command(about = "HTTP inference service for a pretrained billboard detector", long_about = None)]
pub struct ServiceConfig {
    /// Path to the exported ONNX detection model
    #[arg(long, env = "MODEL_PATH", default_value = "./model/best.onnx")]
    pub model_path: PathBuf,

    /// Address to bind
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: IpAddr,

    /// Port to listen on
    #[arg(long, env = "PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Comma-separated class names, indexed by class id
    #[arg(long, env = "CLASS_NAMES", value_delimiter = ',', default_value = "billboard")]
    pub class_names: Vec<String>,

    /// File with one class name per line (overrides --class-names)
    #[arg(long, env = "LABELS_PATH")]
    pub labels_path: Option<PathBuf>,

    /// TrueType/OpenType font for label text (defaults to the bundled DejaVu Sans)
    #[arg(long, env = "FONT_PATH")]
    pub font_path: Option<PathBuf>,

    /// Square network input size in pixels
    #[arg(long, env = "INPUT_SIZE", default_value_t = 640)]
    pub input_size: u32,

    /// Minimum confidence for a detection to be reported
    #[arg(long, env = "CONF_THRESHOLD", default_value_t = 0.25)]
    pub conf_threshold: f32,

    /// IoU above which overlapping boxes of the same class are suppressed
    #[arg(long, env = "IOU_THRESHOLD", default_value_t = 0.45)]
    pub iou_threshold: f32,

    /// Maximum detections returned per image
    #[arg(long, env = "MAX_DETECTIONS", default_value_t = 1000)]
    pub max_detections: usize,

    /// ONNX Runtime intra-op threads
    #[arg(long, env = "INTRA_THREADS", default_value_t = 4)]
    pub intra_threads: usize,

    /// JPEG quality of the boxed image (1-100)
    #[arg(long, env = "JPEG_QUALITY", default_value_t = 75)]
    pub jpeg_quality: u8,

    /// Largest accepted upload in bytes
    #[arg(long, env = "MAX_UPLOAD_BYTES", default_value_t = DEFAULT_MAX_UPLOAD_BYTES)]
    pub max_upload_bytes: usize,

    /// Inferences allowed to run or queue on the blocking pool at once
    #[arg(long, env = "MAX_CONCURRENT_INFERENCES", default_value_t = 4)]
    pub max_concurrent_inferences: usize,

    /// Comma-separated allowed CORS origins ("*" allows any origin)
    #[arg(long, env = "CORS_ALLOW_ORIGINS", value_delimiter = ',', default_value = "*")]
    pub cors_allow_origins: Vec<String>,
}

impl ServiceConfig {
    /// Check value ranges that clap cannot express
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.conf_threshold) {
            bail!(
                "conf_threshold must be within [0, 1], got {}",
                self.conf_threshold
            );
        }
        if !(0.0..=1.0).contains(&self.iou_threshold) {
            bail!(
                "iou_threshold must be within [0, 1], got {}",
                self.iou_threshold
            );
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            bail!("jpeg_quality must be within 1-100, got {}", self.jpeg_quality);
        }
        if self.input_size == 0 || self.input_size % 32 != 0 {
            bail!(
                "input_size must be a positive multiple of 32, got {}",
                self.input_size
            );
        }
        if self.max_detections == 0 {
            bail!("max_detections must be greater than 0");
        }
        if self.intra_threads == 0 {
            bail!("intra_threads must be greater than 0");
        }
        if self.max_upload_bytes == 0 {
            bail!("max_upload_bytes must be greater than 0");
        }
        if self.max_concurrent_inferences == 0 {
            bail!("max_concurrent_inferences must be greater than 0");
        }
        if self.cors_allow_origins.iter().all(|o| o.trim().is_empty()) {
            bail!("cors_allow_origins must name at least one origin or \"*\"");
        }
        Ok(())
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Class names from the labels file if one is configured, else from the list
    pub fn resolve_class_names(&self) -> Result<Vec<String>> {
        let names: Vec<String> = match &self.labels_path {
            Some(path) => std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read labels file {}", path.display()))?
                .lines()
                .map(|line| line.trim().to_string())
                .filter(|line| !line.is_empty())
                .collect(),
            None => self
                .class_names
                .iter()
                .map(|name| name.trim().to_string())
                .filter(|name| !name.is_empty())
                .collect(),
        };

        if names.is_empty() {
            return Err(anyhow!("at least one class name is required"));
        }
        Ok(names)
    }

    pub fn detector_config(&self) -> Result<DetectorConfig> {
        Ok(DetectorConfig {
            model_path: self.model_path.clone(),
            class_names: self.resolve_class_names()?,
            font_path: self.font_path.clone(),
            input_size: self.input_size,
            conf_threshold: self.conf_threshold,
            iou_threshold: self.iou_threshold,
            max_detections: self.max_detections,
            intra_threads: self.intra_threads,
        })
    }

    /// True when any origin may call the API
    pub fn allows_any_origin(&self) -> bool {
        self.cors_allow_origins.iter().any(|o| o.trim() == "*")
    }
}
