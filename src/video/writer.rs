use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};

use tracing::{debug, info, warn};

use crate::error::{EncodeError, Result};
use crate::video::stream::FrameSink;
use crate::video::types::{Frame, OutputParams, VideoStreamDescriptor};

/// Encodes a silent video by piping rgb24 frames into `ffmpeg`
pub struct FfmpegFrameWriter {
    path: PathBuf,
    width: u32,
    height: u32,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    frames_written: usize,
}

impl FfmpegFrameWriter {
    /// Start an encoder producing `path` with the foreground's geometry and rate
    pub fn create<P: AsRef<Path>>(
        path: P,
        descriptor: &VideoStreamDescriptor,
        params: &OutputParams,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let (width, height) = descriptor.dimensions();

        if params.pixel_format == "yuv420p" && (width % 2 != 0 || height % 2 != 0) {
            warn!(
                "{}x{} is not even; {} encoders may reject it",
                width, height, params.pixel_format
            );
        }

        let mut cmd = Command::new("ffmpeg");
        cmd.args(["-hide_banner", "-loglevel", "error", "-y"])
            .args(["-f", "rawvideo", "-pix_fmt", "rgb24"])
            .args(["-s", &format!("{}x{}", width, height)])
            .args(["-r", &descriptor.fps.to_string()])
            .args(["-i", "-", "-an"])
            .args(["-c:v", &params.codec])
            .args(["-pix_fmt", &params.pixel_format]);

        if params.supports_crf() {
            cmd.args(["-crf", &params.crf().to_string()]);
        }

        cmd.arg(&path)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit());

        let mut child = cmd.spawn().map_err(|e| EncodeError::WriterCreateFailed {
            path: path.display().to_string(),
            reason: format!("cannot run ffmpeg: {}", e),
        })?;

        let stdin = child.stdin.take().ok_or_else(|| EncodeError::WriterCreateFailed {
            path: path.display().to_string(),
            reason: "failed to capture ffmpeg stdin".to_string(),
        })?;

        info!(
            "Encoding {}x{} @ {:.2}fps with {} to {}",
            width,
            height,
            descriptor.fps,
            params.codec,
            path.display()
        );

        Ok(Self {
            path,
            width,
            height,
            child: Some(child),
            stdin: Some(stdin),
            frames_written: 0,
        })
    }
}

impl FrameSink for FfmpegFrameWriter {
    fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        if frame.dimensions() != (self.width, self.height) {
            return Err(EncodeError::FrameSizeMismatch {
                expected_width: self.width,
                expected_height: self.height,
                actual_width: frame.width(),
                actual_height: frame.height(),
            }
            .into());
        }

        let index = self.frames_written;
        let stdin = self.stdin.as_mut().ok_or_else(|| EncodeError::WriteFailed {
            index,
            reason: "writer already finished".to_string(),
        })?;

        stdin
            .write_all(frame.as_rgb_bytes())
            .map_err(|e| EncodeError::WriteFailed { index, reason: e.to_string() })?;

        self.frames_written += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        // Closing stdin signals end of input to the encoder
        if let Some(mut stdin) = self.stdin.take() {
            stdin.flush().map_err(|e| EncodeError::FinishFailed { reason: e.to_string() })?;
        }

        if let Some(mut child) = self.child.take() {
            let status = child
                .wait()
                .map_err(|e| EncodeError::FinishFailed { reason: e.to_string() })?;
            if !status.success() {
                return Err(EncodeError::FinishFailed {
                    reason: format!("ffmpeg exited with {} writing {}", status, self.path.display()),
                }
                .into());
            }
            debug!("Encoder wrote {} frames to {}", self.frames_written, self.path.display());
        }
        Ok(())
    }

    fn frames_written(&self) -> usize {
        self.frames_written
    }
}

impl Drop for FfmpegFrameWriter {
    fn drop(&mut self) {
        self.stdin = None;
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

/// `out.mp4` -> `out_temp.mp4`, next to the final output
pub fn intermediate_path(output: &Path) -> PathBuf {
    let stem = output
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output");
    let extension = output
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("mp4");
    output.with_file_name(format!("{}_temp.{}", stem, extension))
}
