use std::path::{Path, PathBuf};
use serde::{Deserialize, Serialize};

use crate::{
    error::{ConfigError, Result},
    video::{AudioParams, OutputParams},
};

/// Main configuration for the Backdrop-Compositor
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Segmentation model and threshold
    pub segmentation: SegmentationConfig,

    /// Contrast normalization before segmentation
    pub enhance: EnhanceConfig,

    /// Temporal mask smoothing
    pub stabilizer: StabilizerConfig,

    /// Mask edge softening
    pub feather: FeatherConfig,

    /// Intermediate video encoding
    pub output: OutputParams,

    /// Final audio remux
    pub audio: AudioParams,

    /// Driver behavior
    pub pipeline: PipelineConfig,

    /// Directory processing
    pub batch: BatchConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::FileNotFound { path: path.display().to_string() })?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| ConfigError::ParseFailed {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::InvalidValue {
                key: "config".to_string(),
                value: e.to_string()
            })?;

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.segmentation.validate()?;
        self.enhance.validate()?;
        self.stabilizer.validate()?;
        self.feather.validate()?;
        self.pipeline.validate()?;
        self.batch.validate()?;

        if self.output.codec.is_empty() {
            return Err(invalid("output.codec", &self.output.codec));
        }
        if self.output.quality > 100 {
            return Err(invalid("output.quality", self.output.quality));
        }
        Ok(())
    }
}

fn invalid(key: &str, value: impl ToString) -> crate::error::CompositorError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
    .into()
}

/// Segmentation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationConfig {
    /// Probabilities strictly above this are foreground
    pub threshold: f32,

    /// ONNX model file (requires the `onnx` feature)
    pub model_path: Option<PathBuf>,

    /// Model input resolution
    pub input_width: u32,
    pub input_height: u32,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            threshold: 0.1,
            model_path: None,
            input_width: 256,
            input_height: 256,
        }
    }
}

impl SegmentationConfig {
    fn validate(&self) -> Result<()> {
        if !(0.0..1.0).contains(&self.threshold) {
            return Err(invalid("segmentation.threshold", self.threshold));
        }

        if self.input_width == 0 || self.input_height == 0 {
            return Err(invalid(
                "segmentation.input_size",
                format!("{}x{}", self.input_width, self.input_height),
            ));
        }

        Ok(())
    }
}

/// CLAHE settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnhanceConfig {
    pub enabled: bool,

    /// Histogram clip limit, relative to a uniform distribution
    pub clip_limit: f32,

    /// Tiles across and down
    pub tile_grid: (u32, u32),
}

impl Default for EnhanceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            clip_limit: 2.0,
            tile_grid: (8, 8),
        }
    }
}

impl EnhanceConfig {
    fn validate(&self) -> Result<()> {
        if !(self.clip_limit >= 0.0) {
            return Err(invalid("enhance.clip_limit", self.clip_limit));
        }

        if self.tile_grid.0 == 0 || self.tile_grid.1 == 0 {
            return Err(invalid(
                "enhance.tile_grid",
                format!("{}x{}", self.tile_grid.0, self.tile_grid.1),
            ));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StabilizerConfig {
    /// Weight of the previous mask (0.0-1.0)
    pub alpha: f32,
}

impl Default for StabilizerConfig {
    fn default() -> Self {
        Self { alpha: 0.8 }
    }
}

impl StabilizerConfig {
    fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.alpha) {
            return Err(invalid("stabilizer.alpha", self.alpha));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatherConfig {
    /// Passes of the 3x3 dilation
    pub dilation_iterations: u32,

    /// Gaussian kernel size, odd
    pub blur_kernel: u32,
}

impl Default for FeatherConfig {
    fn default() -> Self {
        Self {
            dilation_iterations: 5,
            blur_kernel: 15,
        }
    }
}

impl FeatherConfig {
    fn validate(&self) -> Result<()> {
        if self.blur_kernel == 0 || self.blur_kernel % 2 == 0 {
            return Err(invalid("feather.blur_kernel", self.blur_kernel));
        }
        if self.dilation_iterations > u8::MAX as u32 {
            return Err(invalid("feather.dilation_iterations", self.dilation_iterations));
        }
        Ok(())
    }
}

/// What to do with a run that is cancelled midway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CancelPolicy {
    /// Delete the intermediate file and produce no output
    #[default]
    Discard,

    /// Close the truncated video and remux it as usual
    Finalize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Decode, process and encode on separate threads
    pub threaded: bool,

    /// Capacity of each inter-thread queue
    pub queue_depth: usize,

    /// Log progress every N frames
    pub progress_interval: usize,

    /// Keep `<output>_temp.<ext>` after a successful remux
    pub keep_intermediate: bool,

    pub on_cancel: CancelPolicy,

    /// Worker threads for inference and per-row parallel work
    pub processing_threads: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            threaded: false,
            queue_depth: 4,
            progress_interval: 100,
            keep_intermediate: false,
            on_cancel: CancelPolicy::Discard,
            processing_threads: num_cpus::get(),
        }
    }
}

impl PipelineConfig {
    fn validate(&self) -> Result<()> {
        if self.queue_depth == 0 {
            return Err(invalid("pipeline.queue_depth", self.queue_depth));
        }

        if self.progress_interval == 0 {
            return Err(invalid("pipeline.progress_interval", self.progress_interval));
        }

        if self.processing_threads == 0 {
            return Err(invalid("pipeline.processing_threads", self.processing_threads));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Recognized input extensions, matched case-insensitively
    pub extensions: Vec<String>,

    /// Number of the first output file
    pub start_index: u32,

    /// Output files are named `<prefix>_<index>.mp4`
    pub output_prefix: String,

    /// Keep going after a file fails
    pub continue_on_error: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            extensions: ["mp4", "mov", "avi", "mkv", "webm", "m4v"]
                .iter()
                .map(|e| e.to_string())
                .collect(),
            start_index: 10,
            output_prefix: "processed".to_string(),
            continue_on_error: false,
        }
    }
}

impl BatchConfig {
    fn validate(&self) -> Result<()> {
        if self.extensions.is_empty() {
            return Err(invalid("batch.extensions", "[]"));
        }

        if self.output_prefix.is_empty() || self.output_prefix.contains(std::path::MAIN_SEPARATOR) {
            return Err(invalid("batch.output_prefix", &self.output_prefix));
        }

        Ok(())
    }
}
