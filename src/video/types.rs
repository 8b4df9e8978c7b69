use image::{ImageBuffer, Rgb, RgbImage};
use serde::{Deserialize, Serialize};

/// A single decoded video frame
///
/// Thin wrapper around an RGB image buffer. Frames handed out by a
/// [`FrameSource`](crate::video::FrameSource) are never mutated; stages
/// produce new frames instead.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    buffer: RgbImage,
}

impl Frame {
    /// Create a new frame from an RGB image buffer
    pub fn new(buffer: RgbImage) -> Self {
        Self { buffer }
    }

    /// Create a new frame with the given dimensions filled with black
    pub fn new_black(width: u32, height: u32) -> Self {
        Self { buffer: ImageBuffer::new(width, height) }
    }

    /// Create a new frame with the given dimensions filled with the specified color
    pub fn new_filled(width: u32, height: u32, color: [u8; 3]) -> Self {
        let buffer = ImageBuffer::from_pixel(width, height, Rgb(color));
        Self { buffer }
    }

    pub fn width(&self) -> u32 {
        self.buffer.width()
    }

    pub fn height(&self) -> u32 {
        self.buffer.height()
    }

    /// (width, height)
    pub fn dimensions(&self) -> (u32, u32) {
        self.buffer.dimensions()
    }

    /// Get a pixel at the given coordinates (returns RGB array)
    pub fn get_pixel(&self, x: u32, y: u32) -> [u8; 3] {
        self.buffer.get_pixel(x, y).0
    }

    /// Get the underlying image buffer
    pub fn as_image(&self) -> &RgbImage {
        &self.buffer
    }

    /// Raw interleaved RGB bytes, row-major
    pub fn as_rgb_bytes(&self) -> &[u8] {
        self.buffer.as_raw()
    }

    /// Create a frame from raw RGB bytes
    pub fn from_rgb_bytes(width: u32, height: u32, data: Vec<u8>) -> Option<Self> {
        ImageBuffer::from_raw(width, height, data).map(|buffer| Self { buffer })
    }

    /// Number of bytes one frame of this size occupies as packed rgb24
    pub fn byte_len(width: u32, height: u32) -> usize {
        width as usize * height as usize * 3
    }
}

/// Stream metadata, read once when a stream is opened
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoStreamDescriptor {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub frame_count: u64,
}

impl VideoStreamDescriptor {
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Aspect ratio as width / height
    pub fn aspect_ratio(&self) -> f64 {
        self.width as f64 / self.height.max(1) as f64
    }

    /// Duration implied by frame count and rate, in seconds
    pub fn duration(&self) -> f64 {
        if self.fps > 0.0 {
            self.frame_count as f64 / self.fps
        } else {
            0.0
        }
    }
}

/// Encoding parameters for the silent intermediate video
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputParams {
    /// ffmpeg video encoder name
    pub codec: String,

    /// Quality setting (0-100, higher is better)
    pub quality: u8,

    /// Pixel format handed to the encoder
    pub pixel_format: String,
}

impl Default for OutputParams {
    fn default() -> Self {
        Self {
            codec: "libx264".to_string(),
            quality: 85,
            pixel_format: "yuv420p".to_string(),
        }
    }
}

impl OutputParams {
    /// Map the 0-100 quality scale onto x264/x265 CRF (lower is better)
    pub fn crf(&self) -> u8 {
        (51 - ((self.quality.min(100) as f32 / 100.0) * 51.0) as u8).clamp(0, 51)
    }

    /// Whether the configured encoder understands `-crf`
    pub fn supports_crf(&self) -> bool {
        matches!(
            self.codec.as_str(),
            "libx264" | "libx265" | "h264" | "hevc" | "libvpx-vp9" | "libaom-av1" | "libsvtav1"
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filled_frame() {
        let frame = Frame::new_filled(4, 2, [1, 2, 3]);
        assert_eq!(frame.dimensions(), (4, 2));
        assert_eq!(frame.get_pixel(3, 1), [1, 2, 3]);
        assert_eq!(frame.as_rgb_bytes().len(), Frame::byte_len(4, 2));
    }

    #[test]
    fn test_from_rgb_bytes_rejects_short_buffer() {
        assert!(Frame::from_rgb_bytes(2, 2, vec![0; 11]).is_none());
        assert!(Frame::from_rgb_bytes(2, 2, vec![0; 12]).is_some());
    }

    #[test]
    fn test_quality_to_crf() {
        let mut params = OutputParams::default();
        params.quality = 100;
        assert_eq!(params.crf(), 0);
        params.quality = 0;
        assert_eq!(params.crf(), 51);
        assert!(params.supports_crf());
        params.codec = "mpeg4".to_string();
        assert!(!params.supports_crf());
    }

    #[test]
    fn test_descriptor_duration() {
        let desc = VideoStreamDescriptor { width: 1920, height: 1080, fps: 25.0, frame_count: 100 };
        assert_eq!(desc.duration(), 4.0);
        assert!((desc.aspect_ratio() - 16.0 / 9.0).abs() < 1e-9);
    }
}
