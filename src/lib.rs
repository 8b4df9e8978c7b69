//! # Backdrop-Compositor
//!
//! Replace the background of a video with frames from another video.
//!
//! Each foreground frame is segmented into person and background, the mask
//! is smoothed over time and feathered at the edges, and the foreground is
//! blended over a center-cropped, looping background. The original audio is
//! attached to the result.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use backdrop_compositor::{
//!     composition::PipelineDriver,
//!     config::Config,
//!     mask::{ProbabilityMap, SegmentationProvider},
//!     video::Frame,
//! };
//!
//! /// Treats the whole frame as foreground
//! struct EverythingIsForeground;
//!
//! impl SegmentationProvider for EverythingIsForeground {
//!     fn name(&self) -> &str {
//!         "everything"
//!     }
//!
//!     fn segment(&mut self, frame: &Frame) -> backdrop_compositor::Result<ProbabilityMap> {
//!         Ok(ProbabilityMap::filled(frame.width(), frame.height(), 1.0))
//!     }
//! }
//!
//! # fn main() -> anyhow::Result<()> {
//! let mut driver = PipelineDriver::new(Config::default(), EverythingIsForeground)?;
//! let summary = driver.run("speaker.mp4", "beach.mp4", "speaker_on_beach.mp4")?;
//! println!("{} frames written", summary.frames_written);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! The library is organized into several key modules:
//!
//! - [`video`] - Decoding, encoding and audio remux through ffmpeg
//! - [`mask`] - Contrast enhancement, segmentation, stabilization, feathering
//! - [`composition`] - Background alignment, blending and the pipeline driver
//! - [`config`] - Configuration management
//!
//! With the `onnx` feature, `mask::OnnxSegmenter` runs a person
//! segmentation model through ONNX Runtime.

pub mod composition;
pub mod config;
pub mod error;
pub mod mask;
pub mod video;

// Re-export commonly used types for convenience
pub use crate::{
    composition::{BatchRunner, CancellationToken, PipelineDriver, RunSummary},
    config::Config,
    error::{CompositorError, Result},
    mask::SegmentationProvider,
};
