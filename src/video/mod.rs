//! # Video I/O Module
//!
//! Frame-level access to input videos, encoding of the silent composite,
//! and the final audio remux. Decoding and encoding go through the external
//! `ffmpeg`/`ffprobe` tools over raw rgb24 pipes.

pub mod types;
pub mod stream;
pub mod reader;
pub mod writer;
pub mod remux;
pub mod memory;

pub use types::{Frame, OutputParams, VideoStreamDescriptor};
pub use stream::{FrameSink, FrameSource};
pub use reader::{probe, FfmpegFrameReader};
pub use writer::{intermediate_path, FfmpegFrameWriter};
pub use remux::{AudioParams, AudioRemuxer, FfmpegRemuxer};
pub use memory::{MemoryFrameSink, MemoryFrameSource};
