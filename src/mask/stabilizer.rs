use crate::error::{CompositorError, Result};
use crate::mask::types::Mask;

/// First-order temporal low-pass filter over the mask sequence
///
/// Each call blends the new mask with the previous stabilized one:
/// `alpha * previous + (1 - alpha) * current`. A high `alpha` trades
/// responsiveness for smoothness. One instance belongs to one run.
#[derive(Debug, Clone)]
pub struct MaskStabilizer {
    alpha: f32,
    previous: Option<Mask>,
}

impl MaskStabilizer {
    pub fn new(alpha: f32) -> Self {
        Self { alpha: alpha.clamp(0.0, 1.0), previous: None }
    }

    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    /// The last stabilized mask, absent before the first frame
    pub fn previous(&self) -> Option<&Mask> {
        self.previous.as_ref()
    }

    /// Forget history; the next mask passes through unchanged
    pub fn reset(&mut self) {
        self.previous = None;
    }

    pub fn stabilize(&mut self, current: &Mask) -> Result<Mask> {
        let stabilized = match &self.previous {
            None => current.clone(),
            Some(previous) => {
                if previous.dimensions() != current.dimensions() {
                    return Err(CompositorError::dimension_mismatch(
                        "stabilize",
                        previous.dimensions(),
                        current.dimensions(),
                    ));
                }

                let keep = self.alpha;
                let take = 1.0 - self.alpha;
                let values = previous
                    .values()
                    .iter()
                    .zip(current.values())
                    .map(|(&p, &c)| (keep * p as f32 + take * c as f32).round().clamp(0.0, 255.0) as u8)
                    .collect();

                let (width, height) = current.dimensions();
                Mask::from_values(width, height, values)
                    .ok_or_else(|| CompositorError::dimension_mismatch("stabilize", (width, height), (0, 0)))?
            }
        };

        self.previous = Some(stabilized.clone());
        Ok(stabilized)
    }
}

impl Default for MaskStabilizer {
    fn default() -> Self {
        Self::new(0.8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_frame_passes_through() {
        let mut stabilizer = MaskStabilizer::default();
        let raw = Mask::from_values(3, 1, vec![0, 255, 255]).unwrap();
        assert!(stabilizer.previous().is_none());

        let stabilized = stabilizer.stabilize(&raw).unwrap();
        assert_eq!(stabilized, raw);
        assert_eq!(stabilizer.previous(), Some(&raw));
    }

    #[test]
    fn test_blend_formula() {
        let mut stabilizer = MaskStabilizer::new(0.8);
        let previous = Mask::from_values(4, 1, vec![255, 0, 100, 255]).unwrap();
        let current = Mask::from_values(4, 1, vec![0, 255, 50, 255]).unwrap();

        stabilizer.stabilize(&previous).unwrap();
        let out = stabilizer.stabilize(&current).unwrap();

        // 0.8 * P + 0.2 * C
        assert_eq!(out.values(), &[204, 51, 90, 255]);
        assert_eq!(stabilizer.previous(), Some(&out));
    }

    #[test]
    fn test_history_chains() {
        let mut stabilizer = MaskStabilizer::default();
        let full = Mask::filled(2, 2, 255);
        let empty = Mask::filled(2, 2, 0);

        stabilizer.stabilize(&full).unwrap();
        assert_eq!(stabilizer.stabilize(&empty).unwrap().get(0, 0), 204);
        // 0.8 * 204 + 0.2 * 255 = 214.2
        assert_eq!(stabilizer.stabilize(&full).unwrap().get(0, 0), 214);
    }

    #[test]
    fn test_reset_and_dimension_change() {
        let mut stabilizer = MaskStabilizer::default();
        stabilizer.stabilize(&Mask::filled(2, 2, 255)).unwrap();
        assert!(stabilizer.stabilize(&Mask::filled(3, 2, 0)).is_err());

        stabilizer.reset();
        let raw = Mask::filled(3, 2, 0);
        assert_eq!(stabilizer.stabilize(&raw).unwrap(), raw);
    }
}
