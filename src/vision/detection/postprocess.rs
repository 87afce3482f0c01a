// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! YOLOv5 output decoding and non-maximum suppression
//!
//! The exported network emits `[1, N, 5 + classes]` rows of
//! `cx, cy, w, h, objectness, class scores...` in letterboxed input space.

use anyhow::{bail, Result};
use ndarray::ArrayView2;
use std::cmp::Ordering;

use super::model::Detection;
use super::preprocessing::Letterbox;

/// Upper bound on boxes fed into NMS
const MAX_NMS_CANDIDATES: usize = 30_000;

/// Thresholds applied after the network runs
#[derive(Debug, Clone, Copy)]
pub struct PostprocessParams {
    pub conf_threshold: f32,
    pub iou_threshold: f32,
    pub max_detections: usize,
}

/// A box that survived the confidence filter, in network input space
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    /// x1, y1, x2, y2
    pub bbox: [f32; 4],
    pub confidence: f32,
    pub class_id: usize,
}

/// Intersection over union of two corner-format boxes
pub fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let inter_x1 = a[0].max(b[0]);
    let inter_y1 = a[1].max(b[1]);
    let inter_x2 = a[2].min(b[2]);
    let inter_y2 = a[3].min(b[3]);

    let inter_area = (inter_x2 - inter_x1).max(0.0) * (inter_y2 - inter_y1).max(0.0);
    let area_a = (a[2] - a[0]).max(0.0) * (a[3] - a[1]).max(0.0);
    let area_b = (b[2] - b[0]).max(0.0) * (b[3] - b[1]).max(0.0);
    let union_area = area_a + area_b - inter_area;

    if union_area <= 0.0 {
        0.0
    } else {
        inter_area / union_area
    }
}

/// Filter raw prediction rows by objectness and class confidence
pub fn decode_predictions(predictions: ArrayView2<f32>, conf_threshold: f32) -> Result<Vec<Candidate>> {
    let cols = predictions.ncols();
    if cols < 6 {
        bail!(
            "Unexpected prediction width {}, expected 5 + at least one class",
            cols
        );
    }

    let mut candidates = Vec::new();
    for row in predictions.rows() {
        let objectness = row[4];
        if objectness <= conf_threshold {
            continue;
        }

        let (class_id, class_score) = row
            .iter()
            .skip(5)
            .enumerate()
            .fold((0usize, f32::NEG_INFINITY), |(best_id, best), (id, &score)| {
                if score > best {
                    (id, score)
                } else {
                    (best_id, best)
                }
            });

        let confidence = objectness * class_score;
        if confidence <= conf_threshold {
            continue;
        }

        let (cx, cy, w, h) = (row[0], row[1], row[2], row[3]);
        candidates.push(Candidate {
            bbox: [cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0],
            confidence,
            class_id,
        });
    }

    Ok(candidates)
}

/// Greedy per-class NMS, highest confidence first
pub fn non_maximum_suppression(
    mut candidates: Vec<Candidate>,
    iou_threshold: f32,
    max_detections: usize,
) -> Vec<Candidate> {
    candidates.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(Ordering::Equal)
    });
    candidates.truncate(MAX_NMS_CANDIDATES);

    let mut kept: Vec<Candidate> = Vec::new();
    for candidate in candidates {
        if kept.len() >= max_detections {
            break;
        }
        let suppressed = kept.iter().any(|k| {
            k.class_id == candidate.class_id && iou(&k.bbox, &candidate.bbox) > iou_threshold
        });
        if !suppressed {
            kept.push(candidate);
        }
    }

    kept
}

/// Map kept boxes back to the original image and attach class names
pub fn to_detections(
    candidates: Vec<Candidate>,
    letterbox: &Letterbox,
    original_size: (u32, u32),
    class_names: &[String],
) -> Vec<Detection> {
    let (width, height) = (original_size.0 as f32, original_size.1 as f32);

    candidates
        .into_iter()
        .map(|c| {
            let (x1, y1) = letterbox.to_original(c.bbox[0], c.bbox[1]);
            let (x2, y2) = letterbox.to_original(c.bbox[2], c.bbox[3]);
            Detection {
                xmin: x1.clamp(0.0, width),
                ymin: y1.clamp(0.0, height),
                xmax: x2.clamp(0.0, width),
                ymax: y2.clamp(0.0, height),
                confidence: c.confidence,
                class_id: c.class_id as i64,
                name: class_name(class_names, c.class_id),
            }
        })
        .collect()
}

/// Full postprocessing: decode, suppress, rescale
pub fn postprocess(
    predictions: ArrayView2<f32>,
    letterbox: &Letterbox,
    original_size: (u32, u32),
    params: &PostprocessParams,
    class_names: &[String],
) -> Result<Vec<Detection>> {
    let candidates = decode_predictions(predictions, params.conf_threshold)?;
    let kept = non_maximum_suppression(candidates, params.iou_threshold, params.max_detections);
    Ok(to_detections(kept, letterbox, original_size, class_names))
}

pub fn class_name(class_names: &[String], class_id: usize) -> String {
    class_names
        .get(class_id)
        .cloned()
        .unwrap_or_else(|| format!("class{}", class_id))
}
