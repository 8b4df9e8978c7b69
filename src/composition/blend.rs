use rayon::prelude::*;

use crate::error::{CompositorError, Result};
use crate::mask::types::AlphaMap;
use crate::video::types::Frame;

/// Per-pixel linear blend of foreground over background
#[derive(Debug, Clone, Default)]
pub struct Compositor;

impl Compositor {
    pub fn new() -> Self {
        Self
    }

    /// `foreground * alpha + background * (1 - alpha)` on every channel
    pub fn composite(&self, foreground: &Frame, background: &Frame, alpha: &AlphaMap) -> Result<Frame> {
        let dims = foreground.dimensions();
        if background.dimensions() != dims {
            return Err(CompositorError::dimension_mismatch("composite background", dims, background.dimensions()));
        }
        if alpha.dimensions() != dims {
            return Err(CompositorError::dimension_mismatch("composite alpha", dims, alpha.dimensions()));
        }

        let (width, height) = dims;
        let row_len = width as usize * 3;
        let fg = foreground.as_rgb_bytes();
        let bg = background.as_rgb_bytes();
        let weights = alpha.weights();

        let mut out = vec![0u8; Frame::byte_len(width, height)];
        if row_len > 0 {
            out.par_chunks_mut(row_len).enumerate().for_each(|(y, row)| {
                let offset = y * row_len;
                let row_weights = &weights[y * width as usize..(y + 1) * width as usize];
                for (x, &a) in row_weights.iter().enumerate() {
                    for c in 0..3 {
                        let i = x * 3 + c;
                        let value = fg[offset + i] as f32 * a + bg[offset + i] as f32 * (1.0 - a);
                        row[i] = value.round().clamp(0.0, 255.0) as u8;
                    }
                }
            });
        }

        Frame::from_rgb_bytes(width, height, out)
            .ok_or_else(|| CompositorError::dimension_mismatch("composite output", dims, (0, 0)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CompositionError;
    use crate::mask::types::Mask;

    #[test]
    fn test_full_alpha_reproduces_foreground() {
        let fg = Frame::new_filled(16, 8, [0, 255, 0]);
        let bg = Frame::new_filled(16, 8, [0, 0, 200]);
        let alpha = AlphaMap::from_mask(&Mask::filled(16, 8, 255));
        assert_eq!(Compositor::new().composite(&fg, &bg, &alpha).unwrap(), fg);
    }

    #[test]
    fn test_zero_alpha_reproduces_background() {
        let fg = Frame::new_filled(16, 8, [0, 255, 0]);
        let bg = Frame::new_filled(16, 8, [13, 50, 200]);
        let alpha = AlphaMap::from_mask(&Mask::filled(16, 8, 0));
        assert_eq!(Compositor::new().composite(&fg, &bg, &alpha).unwrap(), bg);
    }

    #[test]
    fn test_partial_alpha_rounds() {
        let fg = Frame::new_filled(2, 2, [255, 255, 0]);
        let bg = Frame::new_filled(2, 2, [0, 100, 0]);
        let alpha = AlphaMap::from_mask(&Mask::filled(2, 2, 204));
        let out = Compositor::new().composite(&fg, &bg, &alpha).unwrap();
        // 255 * 0.8 = 204, 255 * 0.8 + 100 * 0.2 = 224
        assert_eq!(out.get_pixel(1, 1), [204, 224, 0]);
    }

    #[test]
    fn test_dimension_mismatch() {
        let fg = Frame::new_filled(4, 4, [0, 0, 0]);
        let bg = Frame::new_filled(4, 3, [0, 0, 0]);
        let alpha = AlphaMap::from_mask(&Mask::filled(4, 4, 0));
        let result = Compositor::new().composite(&fg, &bg, &alpha);
        assert!(matches!(
            result,
            Err(CompositorError::Composition(CompositionError::DimensionMismatch { .. }))
        ));

        let bg = Frame::new_filled(4, 4, [0, 0, 0]);
        let alpha = AlphaMap::from_mask(&Mask::filled(5, 4, 0));
        assert!(Compositor::new().composite(&fg, &bg, &alpha).is_err());
    }
}
