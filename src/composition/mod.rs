//! # Composition Engine
//!
//! Aligns backgrounds, blends frames, and drives whole runs: single videos
//! through [`PipelineDriver`], directories through [`BatchRunner`].

pub mod aligner;
pub mod blend;
pub mod engine;
pub mod threaded;
pub mod batch;

// Re-exports for convenience
pub use aligner::{BackgroundAligner, CropRegion};
pub use blend::Compositor;
pub use engine::{
    CancellationToken, FrameProcessor, FrameReport, PipelineDriver, PipelineObserver, PipelineStage,
    RunSummary,
};
pub use batch::{BatchEntry, BatchOutcome, BatchReport, BatchRunner};
