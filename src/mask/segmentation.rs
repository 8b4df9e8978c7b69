use tracing::debug;

use crate::error::{Result, SegmentationError};
use crate::mask::types::{Mask, ProbabilityMap};
use crate::video::types::Frame;

/// Foreground/background classifier
///
/// Allows swapping between backends (ONNX models, scripted stubs in tests, etc.)
pub trait SegmentationProvider: Send {
    /// Returns the unique name of this provider
    fn name(&self) -> &str;

    /// Compute the foreground probability of every pixel
    ///
    /// # Returns
    /// A map with the frame's dimensions and values in [0, 1]
    fn segment(&mut self, frame: &Frame) -> Result<ProbabilityMap>;

    /// Reset internal state (for models with temporal/recurrent components)
    ///
    /// Called when a new video starts in batch mode.
    fn reset_state(&mut self) {}
}

impl<T: SegmentationProvider + ?Sized> SegmentationProvider for Box<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn segment(&mut self, frame: &Frame) -> Result<ProbabilityMap> {
        (**self).segment(frame)
    }

    fn reset_state(&mut self) {
        (**self).reset_state()
    }
}

/// Runs a provider and turns its probabilities into a binary mask
pub struct MaskSegmenter<P> {
    provider: P,
    threshold: f32,
}

impl<P: SegmentationProvider> MaskSegmenter<P> {
    pub fn new(provider: P, threshold: f32) -> Self {
        Self { provider, threshold }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn provider_mut(&mut self) -> &mut P {
        &mut self.provider
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Segment `frame` into a 0/255 mask. Values above the threshold are foreground.
    pub fn binary_mask(&mut self, frame: &Frame) -> Result<Mask> {
        let probabilities = self.provider.segment(frame)?;
        validate(&probabilities, frame.dimensions())?;
        Ok(threshold(&probabilities, self.threshold))
    }
}

/// Reject maps that do not match the frame or leave [0, 1]
pub fn validate(map: &ProbabilityMap, expected: (u32, u32)) -> Result<()> {
    let actual = map.dimensions();
    if actual != expected {
        return Err(SegmentationError::DimensionMismatch {
            expected_width: expected.0,
            expected_height: expected.1,
            actual_width: actual.0,
            actual_height: actual.1,
        }
        .into());
    }

    // NaN fails the range check too
    if let Some((index, &value)) = map
        .values()
        .iter()
        .enumerate()
        .find(|(_, v)| !(0.0..=1.0).contains(*v))
    {
        return Err(SegmentationError::ValueOutOfRange { value, index }.into());
    }
    Ok(())
}

/// Binary threshold: `p > threshold` is 255, everything else 0
pub fn threshold(map: &ProbabilityMap, threshold: f32) -> Mask {
    let (width, height) = map.dimensions();
    let values: Vec<u8> = map
        .values()
        .iter()
        .map(|&p| if p > threshold { 255 } else { 0 })
        .collect();

    let foreground = values.iter().filter(|&&v| v == 255).count();
    debug!(
        "Thresholded at {:.2}: {:.1}% foreground",
        threshold,
        100.0 * foreground as f32 / values.len().max(1) as f32
    );

    // Length always matches the map's own dimensions
    Mask::from_values(width, height, values).unwrap_or_else(|| Mask::filled(width, height, 0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CompositorError;

    struct FixedProvider(ProbabilityMap);

    impl SegmentationProvider for FixedProvider {
        fn name(&self) -> &str {
            "fixed"
        }

        fn segment(&mut self, _frame: &Frame) -> Result<ProbabilityMap> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn test_threshold_boundary_is_background() {
        let map = ProbabilityMap::from_values(4, 1, vec![0.0, 0.1, 0.1001, 1.0]).unwrap();
        let mask = threshold(&map, 0.1);
        assert_eq!(mask.values(), &[0, 0, 255, 255]);
        assert!(mask.is_binary());
    }

    #[test]
    fn test_binary_mask_matches_frame_dimensions() {
        let provider = FixedProvider(ProbabilityMap::filled(8, 6, 0.7));
        let mut segmenter = MaskSegmenter::new(provider, 0.1);
        let mask = segmenter.binary_mask(&Frame::new_black(8, 6)).unwrap();
        assert_eq!(mask.dimensions(), (8, 6));
        assert!(mask.values().iter().all(|&v| v == 255));
    }

    #[test]
    fn test_wrong_dimensions_rejected() {
        let provider = FixedProvider(ProbabilityMap::filled(8, 8, 0.7));
        let mut segmenter = MaskSegmenter::new(provider, 0.1);
        let result = segmenter.binary_mask(&Frame::new_black(8, 6));
        assert!(matches!(
            result,
            Err(CompositorError::Segmentation(SegmentationError::DimensionMismatch { .. }))
        ));
    }

    #[test]
    fn test_out_of_range_and_nan_rejected() {
        let over = ProbabilityMap::from_values(2, 1, vec![0.5, 1.2]).unwrap();
        assert!(matches!(
            validate(&over, (2, 1)),
            Err(CompositorError::Segmentation(SegmentationError::ValueOutOfRange { index: 1, .. }))
        ));

        let nan = ProbabilityMap::from_values(2, 1, vec![f32::NAN, 0.5]).unwrap();
        assert!(validate(&nan, (2, 1)).is_err());
    }
}
