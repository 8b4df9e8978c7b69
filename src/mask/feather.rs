use image::GrayImage;
use imageproc::morphology::{grayscale_dilate, Mask as Footprint};
use rayon::prelude::*;

use crate::mask::types::Mask;

/// Softens a mask edge: grow the foreground, then blur the boundary
#[derive(Debug, Clone)]
pub struct MaskFeatherer {
    dilation_iterations: u8,
    kernel: Vec<f32>,
}

impl MaskFeatherer {
    /// `blur_kernel` must be odd; even sizes are rounded up.
    /// Dilation is capped at 255 iterations.
    pub fn new(dilation_iterations: u32, blur_kernel: u32) -> Self {
        let size = if blur_kernel % 2 == 0 { blur_kernel + 1 } else { blur_kernel };
        Self {
            dilation_iterations: u8::try_from(dilation_iterations).unwrap_or(u8::MAX),
            kernel: gaussian_kernel(size as usize),
        }
    }

    pub fn kernel_size(&self) -> usize {
        self.kernel.len()
    }

    pub fn feather(&self, mask: &Mask) -> Mask {
        let (width, height) = mask.dimensions();
        if width == 0 || height == 0 {
            return mask.clone();
        }

        let dilated = dilate(mask.as_image(), self.dilation_iterations);
        let blurred = blur(dilated.as_raw(), width as usize, height as usize, &self.kernel);

        Mask::from_values(width, height, blurred).unwrap_or_else(|| mask.clone())
    }
}

impl Default for MaskFeatherer {
    fn default() -> Self {
        Self::new(5, 15)
    }
}

/// Normalized 1-D Gaussian; sigma follows the usual size-derived rule
fn gaussian_kernel(size: usize) -> Vec<f32> {
    if size <= 1 {
        return vec![1.0];
    }
    let sigma = 0.3 * ((size as f64 - 1.0) * 0.5 - 1.0) + 0.8;
    let center = (size / 2) as f64;
    let raw: Vec<f64> = (0..size)
        .map(|i| {
            let d = i as f64 - center;
            (-(d * d) / (2.0 * sigma * sigma)).exp()
        })
        .collect();
    let sum: f64 = raw.iter().sum();
    raw.into_iter().map(|w| (w / sum) as f32).collect()
}

/// Mirror an out-of-range index without repeating the edge sample
fn reflect_101(index: isize, len: usize) -> usize {
    let len = len as isize;
    if len == 1 {
        return 0;
    }
    let mut i = index;
    while i < 0 || i >= len {
        if i < 0 {
            i = -i;
        }
        if i >= len {
            i = 2 * len - 2 - i;
        }
    }
    i as usize
}

/// `iterations` passes of a 3x3 max filter
///
/// Iterating a 3x3 square equals one square of radius `iterations`.
/// Neighbours outside the image are ignored.
fn dilate(mask: &GrayImage, iterations: u8) -> GrayImage {
    if iterations == 0 {
        return mask.clone();
    }
    grayscale_dilate(mask, &Footprint::square(iterations))
}

/// Separable convolution with reflect-101 borders
///
/// `imageproc::filter` clamps at the edges and cannot reflect.
fn blur(values: &[u8], width: usize, height: usize, kernel: &[f32]) -> Vec<u8> {
    if kernel.len() <= 1 {
        return values.to_vec();
    }
    let half = (kernel.len() / 2) as isize;

    let mut horizontal = vec![0f32; values.len()];
    horizontal.par_chunks_mut(width).enumerate().for_each(|(y, out)| {
        let src = &values[y * width..(y + 1) * width];
        for (x, slot) in out.iter_mut().enumerate() {
            *slot = kernel
                .iter()
                .enumerate()
                .map(|(k, w)| w * src[reflect_101(x as isize + k as isize - half, width)] as f32)
                .sum();
        }
    });

    let mut out = vec![0u8; values.len()];
    out.par_chunks_mut(width).enumerate().for_each(|(y, dst)| {
        for (x, slot) in dst.iter_mut().enumerate() {
            let sum: f32 = kernel
                .iter()
                .enumerate()
                .map(|(k, w)| {
                    let row = reflect_101(y as isize + k as isize - half, height);
                    w * horizontal[row * width + x]
                })
                .sum();
            *slot = sum.round().clamp(0.0, 255.0) as u8;
        }
    });
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square_mask(size: u32, lo: u32, hi: u32) -> Mask {
        let values = (0..size * size)
            .map(|i| {
                let (x, y) = (i % size, i / size);
                if (lo..hi).contains(&x) && (lo..hi).contains(&y) { 255 } else { 0 }
            })
            .collect();
        Mask::from_values(size, size, values).unwrap()
    }

    #[test]
    fn test_kernel_is_normalized_and_symmetric() {
        let kernel = gaussian_kernel(15);
        assert_eq!(kernel.len(), 15);
        assert!((kernel.iter().sum::<f32>() - 1.0).abs() < 1e-5);
        assert_eq!(kernel[0], kernel[14]);
        assert!(kernel[7] > kernel[6]);
    }

    #[test]
    fn test_reflect_101() {
        assert_eq!(reflect_101(-1, 5), 1);
        assert_eq!(reflect_101(-2, 5), 2);
        assert_eq!(reflect_101(5, 5), 3);
        assert_eq!(reflect_101(6, 5), 2);
        assert_eq!(reflect_101(3, 1), 0);
    }

    #[test]
    fn test_uniform_masks_keep_their_value() {
        let featherer = MaskFeatherer::default();
        for value in [0u8, 204, 255] {
            let out = featherer.feather(&Mask::filled(40, 30, value));
            assert_eq!(out.dimensions(), (40, 30));
            assert!(out.values().iter().all(|&v| v == value), "value {}", value);
        }
    }

    #[test]
    fn test_dilation_grows_by_iteration_count() {
        let mut image = GrayImage::new(21, 21);
        image.put_pixel(10, 10, image::Luma([255]));
        let dilated = dilate(&image, 5);
        assert_eq!(dilated.get_pixel(5, 5)[0], 255);
        assert_eq!(dilated.get_pixel(15, 15)[0], 255);
        assert_eq!(dilated.get_pixel(10, 4)[0], 0);
        assert_eq!(dilated.get_pixel(16, 10)[0], 0);
    }

    #[test]
    fn test_dilation_keeps_graded_values() {
        let mut image = GrayImage::from_pixel(9, 9, image::Luma([10]));
        image.put_pixel(0, 0, image::Luma([204]));
        image.put_pixel(8, 8, image::Luma([90]));
        let dilated = dilate(&image, 2);
        assert_eq!(dilated.get_pixel(2, 2)[0], 204);
        assert_eq!(dilated.get_pixel(3, 3)[0], 10);
        assert_eq!(dilated.get_pixel(6, 6)[0], 90);
        assert_eq!(dilated.get_pixel(4, 8)[0], 10);
    }

    #[test]
    fn test_large_iteration_counts_saturate() {
        let featherer = MaskFeatherer::new(1000, 3);
        assert_eq!(featherer.dilation_iterations, u8::MAX);
    }

    #[test]
    fn test_edges_are_graded_and_interior_saturated() {
        let mask = square_mask(100, 30, 70);
        let out = MaskFeatherer::default().feather(&mask);

        assert_eq!(out.dimensions(), (100, 100));
        assert_eq!(out.get(50, 50), 255);
        assert_eq!(out.get(0, 0), 0);

        // Dilated foreground starts at x = 25; the blur grades a band around it
        let edge = out.get(24, 50);
        assert!(edge > 0 && edge < 255, "edge value {}", edge);
        let row: Vec<u8> = (0..50).map(|x| out.get(x, 50)).collect();
        assert!(row.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_zero_iterations_and_unit_kernel_are_identity() {
        let mask = square_mask(20, 5, 10);
        let out = MaskFeatherer::new(0, 1).feather(&mask);
        assert_eq!(out, mask);
    }

    #[test]
    fn test_even_kernel_rounds_up() {
        assert_eq!(MaskFeatherer::new(1, 14).kernel_size(), 15);
    }
}
