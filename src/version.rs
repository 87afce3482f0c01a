// Version information for the Billboard Detection API

/// Full version string with feature description
pub const VERSION: &str = "v0.1.0-yolov5-onnx-2026-10-17";

/// Semantic version number
pub const VERSION_NUMBER: &str = env!("CARGO_PKG_VERSION");

/// Build date
pub const BUILD_DATE: &str = "2026-10-17";

/// Supported features in this version
pub const FEATURES: &[&str] = &[
    "yolov5-onnx",
    "multipart-upload",
    "boxed-image-jpeg",
    "per-class-nms",
    "bundled-label-font",
    "bounded-inference-concurrency",
];

/// Get formatted version string for logging
pub fn get_version_string() -> String {
    format!("Billboard Detection API {} ({})", VERSION_NUMBER, BUILD_DATE)
}
