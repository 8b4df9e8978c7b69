//! # Mask Module
//!
//! Turns a foreground frame into blend weights. The pipeline is contrast
//! enhancement, segmentation, thresholding, temporal stabilization and
//! edge feathering, in that order.

pub mod types;
pub mod enhance;
pub mod segmentation;
pub mod stabilizer;
pub mod feather;
#[cfg(feature = "onnx")]
pub mod onnx;

pub use types::{AlphaMap, Mask, ProbabilityMap};
pub use enhance::ContrastEnhancer;
pub use segmentation::{MaskSegmenter, SegmentationProvider};
pub use stabilizer::MaskStabilizer;
pub use feather::MaskFeatherer;
#[cfg(feature = "onnx")]
pub use onnx::OnnxSegmenter;
