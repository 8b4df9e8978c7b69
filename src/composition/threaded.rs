//! Three-stage variant of the frame loop.
//!
//! A decode thread reads foreground/background pairs and an encode thread
//! writes composites. The calling thread owns the [`FrameProcessor`], so the
//! mask history never crosses threads. Bounded queues keep the stages in
//! step and preserve frame order.

use std::thread;

use crossbeam_channel::bounded;
use tracing::debug;

use crate::{
    composition::engine::{log_progress, BackgroundCursor, CancellationToken, FrameProcessor, FrameReport, LoopOutcome, PipelineObserver},
    config::PipelineConfig,
    error::{CompositionError, CompositorError, Result},
    mask::SegmentationProvider,
    video::{Frame, FrameSink, FrameSource},
};

struct DecodedPair {
    index: usize,
    foreground: Frame,
    background: Frame,
    background_index: usize,
    background_loops: usize,
}

pub(crate) fn drive<P: SegmentationProvider>(
    processor: &mut FrameProcessor<P>,
    observer: &mut Option<Box<dyn PipelineObserver>>,
    cancel: &CancellationToken,
    foreground: &mut dyn FrameSource,
    background: &mut dyn FrameSource,
    sink: &mut dyn FrameSink,
    config: &PipelineConfig,
) -> Result<LoopOutcome> {
    let total = foreground.descriptor().frame_count;
    let depth = config.queue_depth.max(1);

    thread::scope(|scope| {
        let (pair_tx, pair_rx) = bounded::<DecodedPair>(depth);
        let (frame_tx, frame_rx) = bounded::<Frame>(depth);

        let decode_cancel = cancel.clone();
        let decoder = scope.spawn(move || -> Result<()> {
            let mut cursor = BackgroundCursor::default();
            let mut index = 0usize;
            while !decode_cancel.is_cancelled() && (total == 0 || (index as u64) < total) {
                let Some(fg) = foreground.read_frame()? else {
                    debug!("Foreground ended at frame {}", index);
                    break;
                };
                let (bg, background_index) = cursor.next(background)?;
                let pair = DecodedPair {
                    index,
                    foreground: fg,
                    background: bg,
                    background_index,
                    background_loops: cursor.loops(),
                };
                if pair_tx.send(pair).is_err() {
                    // Processing stopped early
                    break;
                }
                index += 1;
            }
            Ok(())
        });

        let encoder = scope.spawn(move || -> Result<usize> {
            for frame in frame_rx.iter() {
                sink.write_frame(&frame)?;
            }
            Ok(sink.frames_written())
        });

        // Counters follow processed pairs; read-ahead pairs are dropped
        let mut processed = 0usize;
        let mut loops = 0usize;
        let mut cancelled = false;
        let mut process_result: Result<()> = Ok(());

        for pair in pair_rx.iter() {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            let (composite, stabilized) = match processor.process(&pair.foreground, &pair.background) {
                Ok(result) => result,
                Err(e) => {
                    process_result = Err(e);
                    break;
                }
            };

            if frame_tx.send(composite).is_err() {
                // Encoder failed; its error is reported on join
                break;
            }

            if let Some(observer) = observer.as_mut() {
                observer.on_frame(&FrameReport {
                    index: pair.index,
                    background_index: pair.background_index,
                    stabilized_mask: &stabilized,
                });
            }

            processed += 1;
            loops = pair.background_loops;
            log_progress(processed, total, config.progress_interval);
        }

        drop(pair_rx);
        drop(frame_tx);

        let decoded = decoder.join().map_err(|_| stage_panicked("decode"))?;
        let encoded = encoder.join().map_err(|_| stage_panicked("encode"))?;

        process_result?;
        decoded?;
        let frames_written = encoded?;

        Ok(LoopOutcome {
            frames_written,
            background_frames_consumed: processed,
            background_loops: loops,
            cancelled: cancelled || cancel.is_cancelled(),
        })
    })
}

fn stage_panicked(stage: &str) -> CompositorError {
    CompositionError::StageFailed { reason: format!("{} thread panicked", stage) }.into()
}

#[cfg(test)]
mod tests {
    use crate::composition::engine::tests::{backgrounds, AlternatingProvider, Recorder};
    use crate::composition::engine::{CancellationToken, PipelineDriver};
    use crate::config::{CancelPolicy, Config};
    use crate::error::{CompositorError, EncodeError, Result};
    use crate::mask::{ProbabilityMap, SegmentationProvider};
    use crate::video::{Frame, FrameSink, MemoryFrameSink, MemoryFrameSource};
    use image::{Rgb, RgbImage};

    /// Soft left-to-right ramp that drifts with each call
    struct RampProvider {
        calls: u32,
    }

    impl SegmentationProvider for RampProvider {
        fn name(&self) -> &str {
            "ramp"
        }

        fn segment(&mut self, frame: &Frame) -> Result<ProbabilityMap> {
            let (w, h) = frame.dimensions();
            let shift = self.calls;
            self.calls += 1;
            let values = (0..w * h).map(|i| ((i % w + shift) % w) as f32 / w as f32).collect();
            Ok(ProbabilityMap::from_values(w, h, values).unwrap())
        }
    }

    fn textured(width: u32, height: u32, seed: u8) -> Frame {
        Frame::new(RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x as u8).wrapping_mul(3).wrapping_add(seed), (y as u8).wrapping_mul(5), seed])
        }))
    }

    fn sources() -> (MemoryFrameSource, MemoryFrameSource) {
        let fg = MemoryFrameSource::new((0..12).map(|i| textured(48, 32, i * 10)).collect(), 25.0);
        let bg = MemoryFrameSource::new((0..5).map(|i| textured(64, 40, 200 - i * 7)).collect(), 25.0);
        (fg, bg)
    }

    fn run(threaded: bool) -> Vec<Frame> {
        let mut config = Config::default();
        config.pipeline.threaded = threaded;
        config.pipeline.queue_depth = 2;
        let mut driver = PipelineDriver::new(config, RampProvider { calls: 0 }).unwrap();

        let (mut fg, mut bg) = sources();
        let mut sink = MemoryFrameSink::new();
        let summary = driver.run_streams(&mut fg, &mut bg, &mut sink).unwrap();
        assert_eq!(summary.frames_written, 12);
        assert_eq!(summary.background_loops, 2);
        sink.into_frames()
    }

    #[test]
    fn test_threaded_matches_sequential() {
        let sequential = run(false);
        let threaded = run(true);
        assert_eq!(sequential.len(), threaded.len());
        assert!(sequential == threaded);
    }

    #[test]
    fn test_threaded_background_loops() {
        let mut config = Config::default();
        config.pipeline.threaded = true;
        let mut driver = PipelineDriver::new(config, AlternatingProvider::new()).unwrap();

        let mut fg = MemoryFrameSource::solid(20, 20, [0, 255, 0], 7, 30.0);
        let mut bg = MemoryFrameSource::solid(20, 20, [0, 0, 255], 3, 30.0);
        let mut sink = MemoryFrameSink::new();

        let summary = driver.run_streams(&mut fg, &mut bg, &mut sink).unwrap();
        assert_eq!(summary.frames_written, 7);
        assert_eq!(summary.background_frames_consumed, 7);
        assert_eq!(bg.rewinds(), 2);
        assert_eq!(sink.frames()[0].get_pixel(0, 0), [0, 255, 0]);
    }

    struct FailingSink {
        written: usize,
    }

    impl FrameSink for FailingSink {
        fn write_frame(&mut self, _frame: &Frame) -> Result<()> {
            if self.written == 2 {
                return Err(EncodeError::WriteFailed { index: 2, reason: "disk full".to_string() }.into());
            }
            self.written += 1;
            Ok(())
        }

        fn finish(&mut self) -> Result<()> {
            Ok(())
        }

        fn frames_written(&self) -> usize {
            self.written
        }
    }

    #[test]
    fn test_threaded_surfaces_encoder_error() {
        let mut config = Config::default();
        config.pipeline.threaded = true;
        let mut driver = PipelineDriver::new(config, AlternatingProvider::new()).unwrap();

        let mut fg = MemoryFrameSource::solid(16, 16, [0, 255, 0], 20, 30.0);
        let mut bg = MemoryFrameSource::solid(16, 16, [0, 0, 255], 3, 30.0);
        let mut sink = FailingSink { written: 0 };

        let result = driver.run_streams(&mut fg, &mut bg, &mut sink);
        assert!(matches!(result, Err(CompositorError::Encode(EncodeError::WriteFailed { index: 2, .. }))));
    }

    fn cancelling_driver(policy: CancelPolicy, after: usize) -> (PipelineDriver<AlternatingProvider>, Recorder) {
        let mut config = Config::default();
        config.pipeline.threaded = true;
        config.pipeline.queue_depth = 4;
        config.pipeline.on_cancel = policy;

        let token = CancellationToken::new();
        let recorder = Recorder { cancel_after: Some((after, token.clone())), ..Recorder::default() };
        let driver = PipelineDriver::new(config, AlternatingProvider::new())
            .unwrap()
            .with_observer(Box::new(recorder.clone()))
            .with_cancellation(token);
        (driver, recorder)
    }

    #[test]
    fn test_threaded_cancel_finalize() {
        let (mut driver, recorder) = cancelling_driver(CancelPolicy::Finalize, 4);

        let mut fg = MemoryFrameSource::solid(20, 20, [0, 255, 0], 10, 30.0);
        let mut bg = backgrounds();
        let mut sink = MemoryFrameSink::new();

        let summary = driver.run_streams(&mut fg, &mut bg, &mut sink).unwrap();
        assert!(summary.cancelled);
        assert_eq!(summary.frames_written, 4);
        assert_eq!(sink.frames().len(), 4);
        assert!(sink.is_finished());

        // Decoded-ahead pairs do not count as consumed
        assert_eq!(summary.background_frames_consumed, 4);
        assert_eq!(summary.background_loops, 1);
        let indices: Vec<usize> = recorder.reports.lock().unwrap().iter().map(|r| r.1).collect();
        assert_eq!(indices, vec![0, 1, 2, 0]);
    }

    #[test]
    fn test_threaded_cancel_discard() {
        let (mut driver, recorder) = cancelling_driver(CancelPolicy::Discard, 3);

        let mut fg = MemoryFrameSource::solid(20, 20, [0, 255, 0], 10, 30.0);
        let mut bg = backgrounds();
        let mut sink = MemoryFrameSink::new();

        let result = driver.run_streams(&mut fg, &mut bg, &mut sink);
        assert!(matches!(result, Err(CompositorError::Cancelled { frames_written: 3 })));
        assert_eq!(sink.frames().len(), 3);
        assert!(!sink.is_finished());
        assert_eq!(recorder.reports.lock().unwrap().len(), 3);
    }
}
