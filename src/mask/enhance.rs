//! Contrast normalization applied before segmentation.
//!
//! The frame is split into BT.601 full-range luma and chroma, the luma
//! channel is equalized with CLAHE, and the channels are recombined. Only
//! the segmentation model sees the result; the composite uses the raw frame.

use image::{GrayImage, Luma, Rgb, RgbImage};
use tracing::debug;

use crate::video::types::Frame;

/// Contrast Limited Adaptive Histogram Equalization on the luma channel
#[derive(Debug, Clone)]
pub struct ContrastEnhancer {
    clip_limit: f32,
    tiles_x: u32,
    tiles_y: u32,
}

impl ContrastEnhancer {
    pub fn new(clip_limit: f32, tile_grid: (u32, u32)) -> Self {
        Self {
            clip_limit,
            tiles_x: tile_grid.0.max(1),
            tiles_y: tile_grid.1.max(1),
        }
    }

    /// Equalize the luminance of `frame`, keeping its chroma
    pub fn enhance(&self, frame: &Frame) -> Frame {
        let image = frame.as_image();
        let (width, height) = image.dimensions();

        let mut luma = GrayImage::new(width, height);
        let mut chroma = Vec::with_capacity(width as usize * height as usize);
        for (x, y, pixel) in image.enumerate_pixels() {
            let (y_value, cb, cr) = rgb_to_ycbcr(pixel.0);
            luma.put_pixel(x, y, Luma([y_value.round().clamp(0.0, 255.0) as u8]));
            chroma.push((cb, cr));
        }

        let equalized = self.equalize(&luma);

        let mut output = RgbImage::new(width, height);
        for ((x, y, pixel), &(cb, cr)) in output.enumerate_pixels_mut().zip(chroma.iter()) {
            let y_value = equalized.get_pixel(x, y)[0] as f32;
            *pixel = Rgb(ycbcr_to_rgb(y_value, cb, cr));
        }

        Frame::new(output)
    }

    /// CLAHE over a single 8-bit channel
    pub fn equalize(&self, luma: &GrayImage) -> GrayImage {
        let (width, height) = luma.dimensions();
        if width == 0 || height == 0 {
            return luma.clone();
        }

        let tiles_x = self.tiles_x.min(width);
        let tiles_y = self.tiles_y.min(height);
        let x_bounds: Vec<u32> = (0..=tiles_x).map(|i| i * width / tiles_x).collect();
        let y_bounds: Vec<u32> = (0..=tiles_y).map(|i| i * height / tiles_y).collect();

        let mut luts = Vec::with_capacity((tiles_x * tiles_y) as usize);
        for ty in 0..tiles_y as usize {
            for tx in 0..tiles_x as usize {
                let mut histogram = [0u32; 256];
                for y in y_bounds[ty]..y_bounds[ty + 1] {
                    for x in x_bounds[tx]..x_bounds[tx + 1] {
                        histogram[luma.get_pixel(x, y)[0] as usize] += 1;
                    }
                }
                let area = (x_bounds[tx + 1] - x_bounds[tx]) * (y_bounds[ty + 1] - y_bounds[ty]);
                luts.push(tile_lut(&mut histogram, area, self.clip_limit));
            }
        }

        debug!("CLAHE: {}x{} tiles over {}x{}", tiles_x, tiles_y, width, height);

        let tile_width = width as f32 / tiles_x as f32;
        let tile_height = height as f32 / tiles_y as f32;
        let lut_at = |tx: usize, ty: usize, value: u8| luts[ty * tiles_x as usize + tx][value as usize] as f32;

        GrayImage::from_fn(width, height, |x, y| {
            let value = luma.get_pixel(x, y)[0];
            let (tx1, tx2, xa) = neighbours(x as f32 / tile_width - 0.5, tiles_x as usize);
            let (ty1, ty2, ya) = neighbours(y as f32 / tile_height - 0.5, tiles_y as usize);

            let top = lut_at(tx1, ty1, value) * (1.0 - xa) + lut_at(tx2, ty1, value) * xa;
            let bottom = lut_at(tx1, ty2, value) * (1.0 - xa) + lut_at(tx2, ty2, value) * xa;
            let blended = top * (1.0 - ya) + bottom * ya;
            Luma([blended.round().clamp(0.0, 255.0) as u8])
        })
    }
}

impl Default for ContrastEnhancer {
    fn default() -> Self {
        Self::new(2.0, (8, 8))
    }
}

/// The two tiles bracketing a fractional tile coordinate and the weight of the second
fn neighbours(position: f32, tiles: usize) -> (usize, usize, f32) {
    let first = position.floor();
    let weight = position - first;
    let low = (first.max(0.0) as usize).min(tiles - 1);
    let high = ((first + 1.0).max(0.0) as usize).min(tiles - 1);
    (low, high, weight)
}

/// Clip the histogram, redistribute the excess and build the equalization table
fn tile_lut(histogram: &mut [u32; 256], area: u32, clip_limit: f32) -> [u8; 256] {
    let mut lut = [0u8; 256];
    if area == 0 {
        return lut;
    }

    if clip_limit > 0.0 {
        let clip = ((clip_limit * area as f32 / 256.0) as u32).max(1);
        let mut clipped = 0u32;
        for bin in histogram.iter_mut() {
            if *bin > clip {
                clipped += *bin - clip;
                *bin = clip;
            }
        }

        let batch = clipped / 256;
        let mut residual = clipped - batch * 256;
        for bin in histogram.iter_mut() {
            *bin += batch;
        }
        if residual > 0 {
            let step = (256 / residual).max(1) as usize;
            for bin in histogram.iter_mut().step_by(step) {
                if residual == 0 {
                    break;
                }
                *bin += 1;
                residual -= 1;
            }
        }
    }

    let scale = 255.0 / area as f32;
    let mut cumulative = 0u32;
    for (entry, &count) in lut.iter_mut().zip(histogram.iter()) {
        cumulative += count;
        *entry = (cumulative as f32 * scale).round().min(255.0) as u8;
    }
    lut
}

fn rgb_to_ycbcr([r, g, b]: [u8; 3]) -> (f32, f32, f32) {
    let (r, g, b) = (r as f32, g as f32, b as f32);
    let y = 0.299 * r + 0.587 * g + 0.114 * b;
    let cb = 128.0 - 0.168_736 * r - 0.331_264 * g + 0.5 * b;
    let cr = 128.0 + 0.5 * r - 0.418_688 * g - 0.081_312 * b;
    (y, cb, cr)
}

fn ycbcr_to_rgb(y: f32, cb: f32, cr: f32) -> [u8; 3] {
    let cb = cb - 128.0;
    let cr = cr - 128.0;
    let r = y + 1.402 * cr;
    let g = y - 0.344_136 * cb - 0.714_136 * cr;
    let b = y + 1.772 * cb;
    [
        r.round().clamp(0.0, 255.0) as u8,
        g.round().clamp(0.0, 255.0) as u8,
        b.round().clamp(0.0, 255.0) as u8,
    ]
}
