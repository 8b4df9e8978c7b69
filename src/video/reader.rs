use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, ExitStatus, Stdio};

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::{CompositorError, Result, StreamError};
use crate::video::stream::FrameSource;
use crate::video::types::{Frame, VideoStreamDescriptor};

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    width: Option<u32>,
    height: Option<u32>,
    avg_frame_rate: Option<String>,
    r_frame_rate: Option<String>,
    nb_frames: Option<String>,
    duration: Option<String>,
    #[serde(default)]
    tags: ProbeTags,
    #[serde(default)]
    side_data_list: Vec<ProbeSideData>,
}

#[derive(Debug, Default, Deserialize)]
struct ProbeTags {
    rotate: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeSideData {
    rotation: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

/// Read stream metadata with `ffprobe`
pub fn probe<P: AsRef<Path>>(path: P) -> Result<VideoStreamDescriptor> {
    let path = path.as_ref();
    let path_str = path.display().to_string();

    if !path.is_file() {
        return Err(StreamError::OpenFailed {
            path: path_str,
            reason: "file does not exist".to_string(),
        }
        .into());
    }

    let output = Command::new("ffprobe")
        .args([
            "-v", "error",
            "-select_streams", "v:0",
            "-show_entries",
            "stream=width,height,avg_frame_rate,r_frame_rate,nb_frames,duration:stream_tags=rotate:stream_side_data=rotation:format=duration",
            "-of", "json",
        ])
        .arg(path)
        .output()
        .map_err(|e| StreamError::OpenFailed {
            path: path_str.clone(),
            reason: format!("cannot run ffprobe: {}", e),
        })?;

    if !output.status.success() {
        return Err(StreamError::OpenFailed {
            path: path_str,
            reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        }
        .into());
    }

    let json = String::from_utf8_lossy(&output.stdout);
    parse_probe_json(&json)
        .map_err(|reason| CompositorError::from(StreamError::ProbeFailed { path: path_str, reason }))
}

fn parse_probe_json(json: &str) -> std::result::Result<VideoStreamDescriptor, String> {
    let probe: ProbeOutput = serde_json::from_str(json).map_err(|e| e.to_string())?;
    let stream = probe
        .streams
        .into_iter()
        .next()
        .ok_or_else(|| "no video stream".to_string())?;

    let (mut width, mut height) = match (stream.width, stream.height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
        _ => return Err("missing frame dimensions".to_string()),
    };

    // ffmpeg autorotates on decode, so report the displayed geometry
    let rotation = stream
        .side_data_list
        .iter()
        .find_map(|side| side.rotation)
        .or_else(|| stream.tags.rotate.as_deref().and_then(|r| r.parse().ok()))
        .unwrap_or(0.0);
    if (rotation.abs().round() as i64) % 180 == 90 {
        std::mem::swap(&mut width, &mut height);
    }

    let fps = stream
        .avg_frame_rate
        .as_deref()
        .and_then(parse_rational)
        .or_else(|| stream.r_frame_rate.as_deref().and_then(parse_rational))
        .ok_or_else(|| "missing frame rate".to_string())?;

    let frame_count = match stream.nb_frames.as_deref().and_then(|n| n.parse::<u64>().ok()) {
        Some(count) if count > 0 => count,
        _ => {
            let duration = stream
                .duration
                .as_deref()
                .or(probe.format.as_ref().and_then(|f| f.duration.as_deref()))
                .and_then(|d| d.parse::<f64>().ok())
                .ok_or_else(|| "missing frame count and duration".to_string())?;
            (duration * fps).round() as u64
        }
    };

    Ok(VideoStreamDescriptor { width, height, fps, frame_count })
}

/// Parse an ffprobe rate such as `30000/1001`
fn parse_rational(value: &str) -> Option<f64> {
    let (num, den) = value.split_once('/').unwrap_or((value, "1"));
    let num: f64 = num.trim().parse().ok()?;
    let den: f64 = den.trim().parse().ok()?;
    if den == 0.0 || num <= 0.0 {
        return None;
    }
    Some(num / den)
}

/// Decodes a video file to packed rgb24 frames through an `ffmpeg` pipe
pub struct FfmpegFrameReader {
    path: PathBuf,
    descriptor: VideoStreamDescriptor,
    child: Option<Child>,
    stdout: Option<ChildStdout>,
    frames_read: u64,
}

impl FfmpegFrameReader {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let descriptor = probe(&path)?;

        info!(
            "Opened {}: {}x{} @ {:.2}fps, {} frames",
            path.display(),
            descriptor.width,
            descriptor.height,
            descriptor.fps,
            descriptor.frame_count
        );

        let mut reader = Self {
            path,
            descriptor,
            child: None,
            stdout: None,
            frames_read: 0,
        };
        reader.spawn_decoder()?;
        Ok(reader)
    }

    fn spawn_decoder(&mut self) -> Result<()> {
        let mut cmd = Command::new("ffmpeg");
        cmd.args(["-hide_banner", "-loglevel", "error", "-nostdin", "-i"])
            .arg(&self.path)
            .args(["-map", "0:v:0", "-f", "rawvideo", "-pix_fmt", "rgb24", "-"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());

        let mut child = cmd.spawn().map_err(|e| StreamError::OpenFailed {
            path: self.path.display().to_string(),
            reason: format!("cannot run ffmpeg: {}", e),
        })?;

        let stdout = child.stdout.take().ok_or_else(|| StreamError::OpenFailed {
            path: self.path.display().to_string(),
            reason: "failed to capture ffmpeg stdout".to_string(),
        })?;

        debug!("Spawned decoder for {}", self.path.display());
        self.child = Some(child);
        self.stdout = Some(stdout);
        self.frames_read = 0;
        Ok(())
    }

    fn stop_decoder(&mut self) {
        self.stdout = None;
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }

    /// Reap the decoder after end of stream and report how it exited
    ///
    /// Decoders stopped by `rewind` or drop never get here, so any failure
    /// status is a real decode error.
    fn finish_decoder(&mut self) -> Result<()> {
        self.stdout = None;
        match self.child.take() {
            Some(mut child) => {
                let status = child.wait()?;
                decoder_exit(&self.path, status, self.frames_read)
            }
            None => Ok(()),
        }
    }
}

/// End of stream is only clean when the decoder exited successfully
fn decoder_exit(path: &Path, status: ExitStatus, frames_read: u64) -> Result<()> {
    if status.success() {
        return Ok(());
    }
    warn!("Decoder for {} exited with {} after {} frames", path.display(), status, frames_read);
    Err(StreamError::DecodeFailed {
        reason: format!(
            "ffmpeg exited with {} decoding {} after {} frames",
            status,
            path.display(),
            frames_read
        ),
    }
    .into())
}

impl FrameSource for FfmpegFrameReader {
    fn descriptor(&self) -> VideoStreamDescriptor {
        self.descriptor
    }

    fn read_frame(&mut self) -> Result<Option<Frame>> {
        let Some(stdout) = self.stdout.as_mut() else {
            return Ok(None);
        };

        let (width, height) = self.descriptor.dimensions();
        let mut buffer = vec![0u8; Frame::byte_len(width, height)];

        match stdout.read_exact(&mut buffer) {
            Ok(()) => {
                self.frames_read += 1;
                Ok(Frame::from_rgb_bytes(width, height, buffer))
            }
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                debug!("{} ended after {} frames", self.path.display(), self.frames_read);
                self.finish_decoder()?;
                Ok(None)
            }
            Err(e) => Err(StreamError::DecodeFailed {
                reason: format!("{}: {}", self.path.display(), e),
            }
            .into()),
        }
    }

    fn rewind(&mut self) -> Result<()> {
        debug!("Rewinding {}", self.path.display());
        self.stop_decoder();
        self.spawn_decoder()
    }

    fn label(&self) -> String {
        self.path.display().to_string()
    }
}

impl Drop for FfmpegFrameReader {
    fn drop(&mut self) {
        self.stop_decoder();
    }
}
