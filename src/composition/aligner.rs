use image::imageops::{self, FilterType};
use tracing::debug;

use crate::error::{CompositionError, Result};
use crate::video::types::Frame;

/// Rectangle inside the background that is kept before resizing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Center-crops a background to the target aspect ratio and scales it to the target size
#[derive(Debug, Clone)]
pub struct BackgroundAligner {
    filter: FilterType,
}

impl BackgroundAligner {
    pub fn new() -> Self {
        Self { filter: FilterType::Triangle }
    }

    /// Compute the centered crop whose aspect ratio matches the target
    pub fn crop_region(
        background: (u32, u32),
        target_width: u32,
        target_height: u32,
    ) -> Result<CropRegion> {
        let (bg_w, bg_h) = background;
        if bg_w == 0 || bg_h == 0 || target_width == 0 || target_height == 0 {
            return Err(CompositionError::InvalidGeometry {
                details: format!(
                    "cannot align {}x{} background to {}x{}",
                    bg_w, bg_h, target_width, target_height
                ),
            }
            .into());
        }

        let (bw, bh) = (bg_w as u64, bg_h as u64);
        let (tw, th) = (target_width as u64, target_height as u64);

        let region = if bw * th > tw * bh {
            // Wider than the target: keep full height
            let width = round_div(bh * tw, th).clamp(1, bw) as u32;
            CropRegion { x: (bg_w - width) / 2, y: 0, width, height: bg_h }
        } else {
            let height = round_div(bw * th, tw).clamp(1, bh) as u32;
            CropRegion { x: 0, y: (bg_h - height) / 2, width: bg_w, height }
        };
        Ok(region)
    }

    pub fn align(&self, background: &Frame, target_width: u32, target_height: u32) -> Result<Frame> {
        let region = Self::crop_region(background.dimensions(), target_width, target_height)?;

        if region.width == background.width()
            && region.height == background.height()
            && (region.width, region.height) == (target_width, target_height)
        {
            return Ok(background.clone());
        }

        let cropped = imageops::crop_imm(
            background.as_image(),
            region.x,
            region.y,
            region.width,
            region.height,
        )
        .to_image();

        if (region.width, region.height) == (target_width, target_height) {
            return Ok(Frame::new(cropped));
        }

        debug!(
            "Aligning background: crop {}x{}+{}+{} -> {}x{}",
            region.width, region.height, region.x, region.y, target_width, target_height
        );
        Ok(Frame::new(imageops::resize(&cropped, target_width, target_height, self.filter)))
    }
}

impl Default for BackgroundAligner {
    fn default() -> Self {
        Self::new()
    }
}

fn round_div(numerator: u64, denominator: u64) -> u64 {
    (2 * numerator + denominator) / (2 * denominator)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CompositorError;
    use image::{Rgb, RgbImage};
    use rand::{rngs::SmallRng, Rng, SeedableRng};

    #[test]
    fn test_wider_background_crops_width() {
        let region = BackgroundAligner::crop_region((200, 100), 100, 100).unwrap();
        assert_eq!(region, CropRegion { x: 50, y: 0, width: 100, height: 100 });
    }

    #[test]
    fn test_taller_background_crops_height() {
        let region = BackgroundAligner::crop_region((1080, 1920), 1920, 1080).unwrap();
        // 1080 * 1080 / 1920 = 607.5
        assert_eq!(region.width, 1080);
        assert_eq!(region.height, 608);
        assert_eq!(region.y, (1920 - 608) / 2);
    }

    #[test]
    fn test_crop_keeps_the_center() {
        // Left and right thirds red, middle third blue
        let image = RgbImage::from_fn(300, 100, |x, _| {
            if (100..200).contains(&x) { Rgb([0, 0, 255]) } else { Rgb([255, 0, 0]) }
        });
        let aligned = BackgroundAligner::new().align(&Frame::new(image), 100, 100).unwrap();
        assert_eq!(aligned.dimensions(), (100, 100));
        assert!(aligned.as_image().pixels().all(|p| p.0 == [0, 0, 255]));
    }

    #[test]
    fn test_matching_background_is_unchanged() {
        let frame = Frame::new_filled(64, 48, [9, 8, 7]);
        let aligned = BackgroundAligner::new().align(&frame, 64, 48).unwrap();
        assert_eq!(aligned, frame);
    }

    #[test]
    fn test_zero_geometry_is_rejected() {
        let frame = Frame::new_filled(64, 48, [0, 0, 0]);
        let result = BackgroundAligner::new().align(&frame, 0, 48);
        assert!(matches!(
            result,
            Err(CompositorError::Composition(CompositionError::InvalidGeometry { .. }))
        ));
    }

    #[test]
    fn test_random_geometry_hits_target() {
        let mut rng = SmallRng::seed_from_u64(7);
        let aligner = BackgroundAligner::new();

        for _ in 0..40 {
            let bg = (rng.gen_range(1..320), rng.gen_range(1..320));
            let target = (rng.gen_range(1..160), rng.gen_range(1..160));

            let region = BackgroundAligner::crop_region(bg, target.0, target.1).unwrap();
            assert!(region.x + region.width <= bg.0);
            assert!(region.y + region.height <= bg.1);
            assert!(region.width == bg.0 || region.height == bg.1);

            // Crop aspect ratio matches the target up to rounding of one side
            if region.width > 1 && region.height > 1 {
                let cross = (region.width * target.1) as i64 - (region.height * target.0) as i64;
                assert!(
                    cross.unsigned_abs() <= target.0.max(target.1) as u64 / 2,
                    "bg {:?} target {:?} region {:?}",
                    bg,
                    target,
                    region
                );
            }

            let aligned = aligner.align(&Frame::new_black(bg.0, bg.1), target.0, target.1).unwrap();
            assert_eq!(aligned.dimensions(), target);
        }
    }
}
