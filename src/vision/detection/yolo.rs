// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! YOLOv5 ONNX detector
//!
//! Loads the exported billboard model once and serves `infer` calls from
//! any number of request handlers. Runs on CPU.

use anyhow::{bail, Context, Result};
use image::RgbImage;
use ndarray::{Array2, Array4, Axis, Ix2};
use ort::execution_providers::CPUExecutionProvider;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Value;
use std::sync::Mutex;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::model::{Detector, DetectorConfig, InferenceResult};
use super::postprocess::{postprocess, PostprocessParams};
use super::preprocessing::{letterbox, to_tensor};
use super::render::BoxRenderer;

/// YOLOv5 detection model backed by ONNX Runtime
pub struct YoloDetector {
    /// ONNX Runtime session (run needs exclusive access)
    session: Mutex<Session>,
    /// Model input name
    input_name: String,
    /// Number of classes the network predicts
    num_classes: usize,
    config: DetectorConfig,
    renderer: BoxRenderer,
}

impl std::fmt::Debug for YoloDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("YoloDetector")
            .field("input_name", &self.input_name)
            .field("num_classes", &self.num_classes)
            .field("config", &self.config)
            .field("renderer", &self.renderer)
            .finish_non_exhaustive()
    }
}

impl YoloDetector {
    /// Load the detection model from `config.model_path`
    ///
    /// # Errors
    /// Returns error if:
    /// - Model file not found
    /// - ONNX Runtime cannot build a session from it (corrupt file)
    /// - A warm-up run does not produce YOLOv5-shaped output
    /// - The configured label font cannot be read
    pub async fn load(config: DetectorConfig) -> Result<Self> {
        let model_path = config.model_path.as_path();

        if !model_path.exists() {
            bail!("Detection model not found: {}", model_path.display());
        }

        info!("Loading detection model from {}", model_path.display());

        let session = Session::builder()
            .context("Failed to create session builder")?
            .with_execution_providers([CPUExecutionProvider::default().build()])
            .context("Failed to set CPU execution provider")?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .context("Failed to set optimization level")?
            .with_intra_threads(config.intra_threads)
            .context("Failed to set intra threads")?
            .commit_from_file(model_path)
            .context(format!(
                "Failed to load detection model from {}",
                model_path.display()
            ))?;

        let input_name = session
            .inputs
            .first()
            .map(|input| input.name.clone())
            .unwrap_or_else(|| "images".to_string());

        debug!("Detection model input: {}", input_name);

        let renderer = match &config.font_path {
            Some(path) => {
                info!("Label font: {}", path.display());
                BoxRenderer::from_font_file(path)?
            }
            None => BoxRenderer::bundled()?,
        };

        let mut detector = Self {
            session: Mutex::new(session),
            input_name,
            num_classes: 0,
            config,
            renderer,
        };

        // Validate the architecture with a blank frame
        let size = detector.config.input_size as usize;
        let warmup = detector
            .run(Array4::<f32>::zeros((1, 3, size, size)))
            .context("Model warm-up failed, is this a YOLOv5 export?")?;
        detector.num_classes = warmup.ncols() - 5;

        if detector.num_classes != detector.config.class_names.len() {
            warn!(
                "Model predicts {} classes but {} names are configured",
                detector.num_classes,
                detector.config.class_names.len()
            );
        }

        info!(
            "✅ Detection model loaded ({} classes, {}x{} input, CPU)",
            detector.num_classes, size, size
        );

        Ok(detector)
    }

    /// Run the network and return the `[N, 5 + classes]` prediction rows
    fn run(&self, input: Array4<f32>) -> Result<Array2<f32>> {
        let mut session = self
            .session
            .lock()
            .map_err(|_| anyhow::anyhow!("Detection session lock poisoned"))?;

        let input_value = Value::from_array(input).context("Failed to create input tensor")?;

        let outputs = session
            .run(ort::inputs![&self.input_name => input_value])
            .context("Detection inference failed")?;

        let output = outputs[0]
            .try_extract_array::<f32>()
            .context("Failed to extract output tensor")?;

        let shape = output.shape().to_vec();
        if shape.len() != 3 || shape[0] != 1 || shape[2] < 6 {
            bail!(
                "Unexpected output shape {:?}, expected [1, N, 5 + classes]",
                shape
            );
        }

        let predictions = output
            .index_axis(Axis(0), 0)
            .into_dimensionality::<Ix2>()
            .context("Failed to reshape predictions")?
            .to_owned();

        Ok(predictions)
    }
}

impl Detector for YoloDetector {
    fn infer(&self, image: &RgbImage) -> Result<InferenceResult> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            bail!("Cannot run detection on an empty {}x{} image", width, height);
        }

        let start = Instant::now();

        let (input_image, transform) = letterbox(image, self.config.input_size);
        let predictions = self.run(to_tensor(&input_image))?;

        let params = PostprocessParams {
            conf_threshold: self.config.conf_threshold,
            iou_threshold: self.config.iou_threshold,
            max_detections: self.config.max_detections,
        };
        let detections = postprocess(
            predictions.view(),
            &transform,
            (width, height),
            &params,
            &self.config.class_names,
        )?;

        let rendered = self.renderer.render(image, &detections);

        debug!(
            "Detected {} objects in {}x{} image ({}ms)",
            detections.len(),
            width,
            height,
            start.elapsed().as_millis()
        );

        Ok(InferenceResult {
            detections,
            rendered,
        })
    }
}
