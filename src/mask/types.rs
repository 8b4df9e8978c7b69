use image::{GrayImage, ImageBuffer, Luma};

/// Per-pixel foreground probability in [0, 1], as returned by a segmentation model
#[derive(Debug, Clone, PartialEq)]
pub struct ProbabilityMap {
    buffer: ImageBuffer<Luma<f32>, Vec<f32>>,
}

impl ProbabilityMap {
    /// Build from row-major values; `None` if the length does not match
    pub fn from_values(width: u32, height: u32, values: Vec<f32>) -> Option<Self> {
        ImageBuffer::from_raw(width, height, values).map(|buffer| Self { buffer })
    }

    pub fn filled(width: u32, height: u32, value: f32) -> Self {
        Self { buffer: ImageBuffer::from_pixel(width, height, Luma([value])) }
    }

    pub fn from_image(buffer: ImageBuffer<Luma<f32>, Vec<f32>>) -> Self {
        Self { buffer }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.buffer.dimensions()
    }

    pub fn get(&self, x: u32, y: u32) -> f32 {
        self.buffer.get_pixel(x, y)[0]
    }

    pub fn values(&self) -> &[f32] {
        self.buffer.as_raw()
    }

    pub fn as_image(&self) -> &ImageBuffer<Luma<f32>, Vec<f32>> {
        &self.buffer
    }
}

/// Single-channel 8-bit mask, binary (0/255) or graded (0..=255)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask {
    buffer: GrayImage,
}

impl Mask {
    pub fn new(buffer: GrayImage) -> Self {
        Self { buffer }
    }

    pub fn filled(width: u32, height: u32, value: u8) -> Self {
        Self { buffer: ImageBuffer::from_pixel(width, height, Luma([value])) }
    }

    pub fn from_values(width: u32, height: u32, values: Vec<u8>) -> Option<Self> {
        ImageBuffer::from_raw(width, height, values).map(|buffer| Self { buffer })
    }

    pub fn width(&self) -> u32 {
        self.buffer.width()
    }

    pub fn height(&self) -> u32 {
        self.buffer.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.buffer.dimensions()
    }

    pub fn get(&self, x: u32, y: u32) -> u8 {
        self.buffer.get_pixel(x, y)[0]
    }

    pub fn values(&self) -> &[u8] {
        self.buffer.as_raw()
    }

    pub fn as_image(&self) -> &GrayImage {
        &self.buffer
    }

    /// True if every pixel is 0 or 255
    pub fn is_binary(&self) -> bool {
        self.values().iter().all(|&v| v == 0 || v == 255)
    }
}

/// Blend weights in [0, 1] derived from a mask, one per pixel
///
/// The same weight applies to all three color channels.
#[derive(Debug, Clone, PartialEq)]
pub struct AlphaMap {
    width: u32,
    height: u32,
    weights: Vec<f32>,
}

impl AlphaMap {
    pub fn from_mask(mask: &Mask) -> Self {
        let (width, height) = mask.dimensions();
        let weights = mask.values().iter().map(|&v| v as f32 / 255.0).collect();
        Self { width, height, weights }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    pub fn get(&self, x: u32, y: u32) -> f32 {
        self.weights[(y * self.width + x) as usize]
    }
}
