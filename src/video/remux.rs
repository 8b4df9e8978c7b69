use std::path::Path;
use std::process::{Command, Stdio};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{RemuxError, Result};

/// Attaches the original recording's audio to the composited silent video
pub trait AudioRemuxer: Send + Sync {
    /// Copy video from `silent_video`, take audio from `original`, write `output`
    fn attach(&self, silent_video: &Path, original: &Path, output: &Path) -> Result<()>;
}

/// Audio settings for the final mux
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioParams {
    /// ffmpeg audio encoder
    pub codec: String,

    /// e.g. "192k"; encoder default when unset
    pub bitrate: Option<String>,

    /// Produce a silent output instead of failing when the original has no audio
    pub allow_missing: bool,
}

impl Default for AudioParams {
    fn default() -> Self {
        Self {
            codec: "aac".to_string(),
            bitrate: None,
            allow_missing: true,
        }
    }
}

/// Remuxes with the `ffmpeg` command line tool
#[derive(Debug, Clone, Default)]
pub struct FfmpegRemuxer {
    params: AudioParams,
}

impl FfmpegRemuxer {
    pub fn new(params: AudioParams) -> Self {
        Self { params }
    }

    fn build_command(&self, silent_video: &Path, original: &Path, output: &Path) -> Command {
        let audio_map = if self.params.allow_missing { "1:a:0?" } else { "1:a:0" };

        let mut cmd = Command::new("ffmpeg");
        cmd.args(["-hide_banner", "-loglevel", "error", "-y"])
            .arg("-i")
            .arg(silent_video)
            .arg("-i")
            .arg(original)
            .args(["-c:v", "copy"])
            .args(["-c:a", &self.params.codec]);

        if let Some(bitrate) = &self.params.bitrate {
            cmd.args(["-b:a", bitrate]);
        }

        cmd.args(["-map", "0:v:0", "-map", audio_map])
            .arg(output)
            .stdin(Stdio::null());
        cmd
    }
}

impl AudioRemuxer for FfmpegRemuxer {
    fn attach(&self, silent_video: &Path, original: &Path, output: &Path) -> Result<()> {
        info!("Attaching audio from {:?} onto {:?}", original, silent_video);

        let output_result = self
            .build_command(silent_video, original, output)
            .output()
            .map_err(|e| RemuxError::LaunchFailed { reason: e.to_string() })?;

        if !output_result.status.success() {
            return Err(RemuxError::ProcessFailed {
                status: output_result.status.to_string(),
                stderr: String::from_utf8_lossy(&output_result.stderr).trim().to_string(),
            }
            .into());
        }

        if !output.is_file() {
            return Err(RemuxError::OutputMissing { path: output.display().to_string() }.into());
        }

        debug!("Remux wrote {:?}", output);
        Ok(())
    }
}
