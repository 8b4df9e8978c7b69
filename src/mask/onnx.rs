use std::path::Path;
use std::time::Instant;

use image::{imageops, ImageBuffer, Luma};
use ndarray::Array4;
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Value;
use tracing::{debug, info};

use crate::error::{Result, SegmentationError};
use crate::mask::segmentation::SegmentationProvider;
use crate::mask::types::ProbabilityMap;
use crate::video::types::Frame;

/// Person segmentation through an ONNX model
///
/// The model takes a `[1, 3, H, W]` RGB tensor in [0, 1] and returns a single
/// probability channel, either `[1, 1, H, W]`, `[1, H, W, 1]` or `[1, H, W]`.
/// The output is resized back to the frame's dimensions.
pub struct OnnxSegmenter {
    session: Session,
    input_width: u32,
    input_height: u32,
}

impl OnnxSegmenter {
    pub fn load(model_path: &Path, input_width: u32, input_height: u32, threads: usize) -> Result<Self> {
        if !model_path.exists() {
            return Err(SegmentationError::ModelUnavailable {
                reason: format!("model file not found: {}", model_path.display()),
            }
            .into());
        }

        let session = Session::builder()
            .map_err(unavailable)?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(unavailable)?
            .with_intra_threads(threads.max(1))
            .map_err(unavailable)?
            .commit_from_file(model_path)
            .map_err(unavailable)?;

        info!(
            "🧠 Loaded segmentation model {} ({}x{} input)",
            model_path.display(),
            input_width,
            input_height
        );

        Ok(Self {
            session,
            input_width: input_width.max(1),
            input_height: input_height.max(1),
        })
    }

    fn preprocess(&self, frame: &Frame) -> Array4<f32> {
        let resized = if frame.dimensions() != (self.input_width, self.input_height) {
            imageops::resize(
                frame.as_image(),
                self.input_width,
                self.input_height,
                imageops::FilterType::Triangle,
            )
        } else {
            frame.as_image().clone()
        };

        let (width, height) = resized.dimensions();
        let mut tensor = Array4::<f32>::zeros((1, 3, height as usize, width as usize));
        for (x, y, pixel) in resized.enumerate_pixels() {
            for c in 0..3 {
                tensor[[0, c, y as usize, x as usize]] = pixel[c] as f32 / 255.0;
            }
        }
        tensor
    }
}

fn unavailable(reason: impl ToString) -> SegmentationError {
    SegmentationError::ModelUnavailable { reason: reason.to_string() }
}

fn failed(reason: impl ToString) -> SegmentationError {
    SegmentationError::ModelFailed { reason: reason.to_string() }
}

/// Reject raw model output that is not a probability
///
/// Models exporting logits instead of a sigmoid output land here.
fn check_probabilities(values: &[f32]) -> Result<()> {
    if let Some(index) = values.iter().position(|v| v.is_nan()) {
        return Err(failed(format!("output contains NaN at index {}", index)).into());
    }
    match values.iter().position(|v| !(0.0..=1.0).contains(v)) {
        Some(index) => Err(SegmentationError::ValueOutOfRange { value: values[index], index }.into()),
        None => Ok(()),
    }
}

/// Height and width of a single-channel output shape
fn output_dimensions(shape: &[usize]) -> Option<(usize, usize)> {
    match shape {
        [1, 1, h, w] => Some((*h, *w)),
        [1, h, w, 1] => Some((*h, *w)),
        [1, h, w] => Some((*h, *w)),
        _ => None,
    }
}

impl SegmentationProvider for OnnxSegmenter {
    fn name(&self) -> &str {
        "onnx"
    }

    fn segment(&mut self, frame: &Frame) -> Result<ProbabilityMap> {
        let start = Instant::now();
        let input = Value::from_array(self.preprocess(frame)).map_err(failed)?;

        let (height, width, values) = {
            let outputs = self.session.run(ort::inputs![input]).map_err(failed)?;
            let tensor = outputs[0].try_extract_array::<f32>().map_err(failed)?;
            let (height, width) = output_dimensions(tensor.shape())
                .ok_or_else(|| failed(format!("unexpected output shape {:?}", tensor.shape())))?;
            let values: Vec<f32> = tensor.iter().copied().collect();
            check_probabilities(&values)?;
            (height, width, values)
        };

        let small: ImageBuffer<Luma<f32>, Vec<f32>> =
            ImageBuffer::from_raw(width as u32, height as u32, values)
                .ok_or_else(|| failed("output tensor length does not match its shape"))?;

        let (frame_width, frame_height) = frame.dimensions();
        let mut full = if small.dimensions() != (frame_width, frame_height) {
            imageops::resize(&small, frame_width, frame_height, imageops::FilterType::Triangle)
        } else {
            small
        };
        // Triangle weights are convex, so only float rounding can leave [0, 1]
        for pixel in full.pixels_mut() {
            pixel[0] = pixel[0].clamp(0.0, 1.0);
        }

        debug!("Segmentation inference took {:.1}ms", start.elapsed().as_secs_f64() * 1000.0);
        Ok(ProbabilityMap::from_image(full))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_shapes() {
        assert_eq!(output_dimensions(&[1, 1, 144, 256]), Some((144, 256)));
        assert_eq!(output_dimensions(&[1, 144, 256, 1]), Some((144, 256)));
        assert_eq!(output_dimensions(&[1, 144, 256]), Some((144, 256)));
        assert_eq!(output_dimensions(&[1, 3, 144, 256]), None);
        assert_eq!(output_dimensions(&[144, 256]), None);
    }

    #[test]
    fn test_probabilities_accept_unit_interval() {
        assert!(check_probabilities(&[0.0, 0.25, 1.0]).is_ok());
        assert!(check_probabilities(&[]).is_ok());
    }

    #[test]
    fn test_nan_output_is_a_model_failure() {
        assert!(matches!(
            check_probabilities(&[0.5, f32::NAN, 3.0]),
            Err(crate::error::CompositorError::Segmentation(SegmentationError::ModelFailed { .. }))
        ));
    }

    #[test]
    fn test_logit_output_is_out_of_range() {
        match check_probabilities(&[0.2, 5.0, -1.0]) {
            Err(crate::error::CompositorError::Segmentation(SegmentationError::ValueOutOfRange { value, index })) => {
                assert_eq!(value, 5.0);
                assert_eq!(index, 1);
            }
            other => panic!("expected out-of-range error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_missing_model_is_unavailable() {
        let result = OnnxSegmenter::load(Path::new("/nonexistent/model.onnx"), 256, 256, 1);
        assert!(matches!(
            result,
            Err(crate::error::CompositorError::Segmentation(SegmentationError::ModelUnavailable { .. }))
        ));
    }
}
