use thiserror::Error;

/// Main error type for the Backdrop-Compositor library
#[derive(Error, Debug)]
pub enum CompositorError {
    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),

    #[error("Segmentation error: {0}")]
    Segmentation(#[from] SegmentationError),

    #[error("Encoding error: {0}")]
    Encode(#[from] EncodeError),

    #[error("Remux error: {0}")]
    Remux(#[from] RemuxError),

    #[error("Composition error: {0}")]
    Composition(#[from] CompositionError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Run cancelled after {frames_written} frames")]
    Cancelled { frames_written: usize },
}

/// Errors opening, probing or decoding an input stream
#[derive(Error, Debug)]
pub enum StreamError {
    #[error("Failed to open video stream: {path} ({reason})")]
    OpenFailed { path: String, reason: String },

    #[error("Failed to probe video stream: {path} ({reason})")]
    ProbeFailed { path: String, reason: String },

    #[error("Video decoding failed: {reason}")]
    DecodeFailed { reason: String },

    #[error("Video stream has no frames: {path}")]
    Empty { path: String },
}

/// Errors from the segmentation capability or its output
#[derive(Error, Debug)]
pub enum SegmentationError {
    #[error("Segmentation model unavailable: {reason}")]
    ModelUnavailable { reason: String },

    #[error("Segmentation model failed: {reason}")]
    ModelFailed { reason: String },

    #[error("Probability map is {actual_width}x{actual_height}, frame is {expected_width}x{expected_height}")]
    DimensionMismatch {
        expected_width: u32,
        expected_height: u32,
        actual_width: u32,
        actual_height: u32,
    },

    #[error("Probability {value} at pixel {index} is outside [0, 1]")]
    ValueOutOfRange { value: f32, index: usize },
}

/// Errors creating or feeding the frame writer
#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("Failed to create video writer for {path}: {reason}")]
    WriterCreateFailed { path: String, reason: String },

    #[error("Failed to write frame {index}: {reason}")]
    WriteFailed { index: usize, reason: String },

    #[error("Frame is {actual_width}x{actual_height}, writer expects {expected_width}x{expected_height}")]
    FrameSizeMismatch {
        expected_width: u32,
        expected_height: u32,
        actual_width: u32,
        actual_height: u32,
    },

    #[error("Encoder did not finish cleanly: {reason}")]
    FinishFailed { reason: String },
}

/// Errors attaching the original audio track
#[derive(Error, Debug)]
pub enum RemuxError {
    #[error("Failed to launch remux process: {reason}")]
    LaunchFailed { reason: String },

    #[error("Remux process exited with {status}: {stderr}")]
    ProcessFailed { status: String, stderr: String },

    #[error("Remux produced no output file: {path}")]
    OutputMissing { path: String },
}

/// Errors inside the per-frame compositing math
#[derive(Error, Debug)]
pub enum CompositionError {
    #[error("{stage}: expected {expected_width}x{expected_height}, got {actual_width}x{actual_height}")]
    DimensionMismatch {
        stage: &'static str,
        expected_width: u32,
        expected_height: u32,
        actual_width: u32,
        actual_height: u32,
    },

    #[error("Invalid geometry: {details}")]
    InvalidGeometry { details: String },

    #[error("No input videos found in directory: {path}")]
    NoInputsFound { path: String },

    #[error("Pipeline stage failed: {reason}")]
    StageFailed { reason: String },
}

/// Configuration-specific errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse configuration file: {path} ({reason})")]
    ParseFailed { path: String, reason: String },

    #[error("Invalid configuration value: {key} = {value}")]
    InvalidValue { key: String, value: String },

    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },
}

/// Convenience type alias for Results using CompositorError
pub type Result<T> = std::result::Result<T, CompositorError>;

impl CompositorError {
    /// Check if this error is recoverable (can be retried)
    pub fn is_recoverable(&self) -> bool {
        match self {
            // IO errors might be temporary
            Self::Io(_) => true,
            Self::Stream(StreamError::OpenFailed { .. }) => true,
            // Remux can be rerun against the retained intermediate file
            Self::Remux(_) => true,
            _ => false,
        }
    }

    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            Self::Stream(StreamError::OpenFailed { path, .. }) => {
                format!("Could not open video '{}'. Please check the file exists and ffmpeg can decode it.", path)
            }
            Self::Stream(StreamError::Empty { path }) => {
                format!("Video '{}' contains no frames.", path)
            }
            Self::Segmentation(SegmentationError::ModelUnavailable { reason }) => {
                format!("No segmentation model available: {}", reason)
            }
            Self::Remux(_) => {
                format!("{}. The silent intermediate video was kept next to the output.", self)
            }
            Self::Config(ConfigError::FileNotFound { path }) => {
                format!("Configuration file '{}' not found.", path)
            }
            _ => self.to_string(),
        }
    }

    pub(crate) fn dimension_mismatch(
        stage: &'static str,
        expected: (u32, u32),
        actual: (u32, u32),
    ) -> Self {
        CompositionError::DimensionMismatch {
            stage,
            expected_width: expected.0,
            expected_height: expected.1,
            actual_width: actual.0,
            actual_height: actual.1,
        }
        .into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remux_errors_are_recoverable() {
        let err: CompositorError = RemuxError::ProcessFailed {
            status: "exit status: 1".to_string(),
            stderr: "Stream map '1:a:0' matches no streams".to_string(),
        }
        .into();
        assert!(err.is_recoverable());
        assert!(err.user_message().contains("intermediate"));
    }

    #[test]
    fn test_segmentation_errors_are_fatal() {
        let err: CompositorError = SegmentationError::ValueOutOfRange { value: 1.5, index: 3 }.into();
        assert!(!err.is_recoverable());
        assert!(err.to_string().contains("1.5"));
    }

    #[test]
    fn test_dimension_mismatch_message() {
        let err = CompositorError::dimension_mismatch("blend", (100, 100), (200, 100));
        assert_eq!(
            err.to_string(),
            "Composition error: blend: expected 100x100, got 200x100"
        );
    }
}
