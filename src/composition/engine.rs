use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::{
    composition::{aligner::BackgroundAligner, blend::Compositor, threaded},
    config::{CancelPolicy, Config},
    error::{CompositorError, Result, StreamError},
    mask::{AlphaMap, ContrastEnhancer, Mask, MaskFeatherer, MaskSegmenter, MaskStabilizer, SegmentationProvider},
    video::{
        intermediate_path, AudioRemuxer, FfmpegFrameReader, FfmpegFrameWriter, FfmpegRemuxer, Frame,
        FrameSink, FrameSource,
    },
};

/// Lifecycle of one driver run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Init,
    Running,
    Finalizing,
    Done,
    Failed,
}

/// Per-frame notification handed to a [`PipelineObserver`]
#[derive(Debug)]
pub struct FrameReport<'a> {
    /// Foreground frame index
    pub index: usize,

    /// Position in the background stream that was composited under this frame
    pub background_index: usize,

    pub stabilized_mask: &'a Mask,
}

/// Hooks into a running pipeline, e.g. for progress bars or diagnostics
pub trait PipelineObserver: Send {
    fn on_frame(&mut self, report: &FrameReport<'_>);

    fn on_stage(&mut self, _stage: PipelineStage) {}
}

/// Shared flag checked between frames
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Result of a completed (or cleanly cancelled) run
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub frames_written: usize,
    pub background_frames_consumed: usize,
    pub background_loops: usize,
    pub cancelled: bool,

    /// Final file, absent for stream-only runs
    pub output_path: Option<PathBuf>,

    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Counters produced by the frame loop
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct LoopOutcome {
    pub frames_written: usize,
    pub background_frames_consumed: usize,
    pub background_loops: usize,
    pub cancelled: bool,
}

/// Reads the background in order, rewinding at end of stream
#[derive(Debug, Default)]
pub(crate) struct BackgroundCursor {
    position: usize,
    consumed: usize,
    loops: usize,
}

impl BackgroundCursor {
    pub fn next(&mut self, source: &mut dyn FrameSource) -> Result<(Frame, usize)> {
        let frame = match source.read_frame()? {
            Some(frame) => frame,
            None => {
                if self.position == 0 {
                    return Err(StreamError::Empty { path: source.label() }.into());
                }
                debug!("Background exhausted after {} frames, looping", self.position);
                source.rewind()?;
                self.position = 0;
                self.loops += 1;
                source
                    .read_frame()?
                    .ok_or_else(|| StreamError::Empty { path: source.label() })?
            }
        };

        let index = self.position;
        self.position += 1;
        self.consumed += 1;
        Ok((frame, index))
    }

    pub fn consumed(&self) -> usize {
        self.consumed
    }

    pub fn loops(&self) -> usize {
        self.loops
    }
}

/// The per-frame chain: enhance, segment, stabilize, feather, align, composite
pub struct FrameProcessor<P> {
    enhancer: Option<ContrastEnhancer>,
    segmenter: MaskSegmenter<P>,
    stabilizer: MaskStabilizer,
    featherer: MaskFeatherer,
    aligner: BackgroundAligner,
    compositor: Compositor,
}

impl<P: SegmentationProvider> FrameProcessor<P> {
    pub fn from_config(config: &Config, provider: P) -> Self {
        let enhancer = config
            .enhance
            .enabled
            .then(|| ContrastEnhancer::new(config.enhance.clip_limit, config.enhance.tile_grid));

        Self {
            enhancer,
            segmenter: MaskSegmenter::new(provider, config.segmentation.threshold),
            stabilizer: MaskStabilizer::new(config.stabilizer.alpha),
            featherer: MaskFeatherer::new(config.feather.dilation_iterations, config.feather.blur_kernel),
            aligner: BackgroundAligner::new(),
            compositor: Compositor::new(),
        }
    }

    /// Composite one frame pair; also returns the stabilized mask
    pub fn process(&mut self, foreground: &Frame, background: &Frame) -> Result<(Frame, Mask)> {
        let segmentation_input = match &self.enhancer {
            Some(enhancer) => Cow::Owned(enhancer.enhance(foreground)),
            None => Cow::Borrowed(foreground),
        };

        let raw = self.segmenter.binary_mask(&segmentation_input)?;
        let stabilized = self.stabilizer.stabilize(&raw)?;
        let feathered = self.featherer.feather(&stabilized);

        let aligned = self.aligner.align(background, foreground.width(), foreground.height())?;
        let composite = self
            .compositor
            .composite(foreground, &aligned, &AlphaMap::from_mask(&feathered))?;

        Ok((composite, stabilized))
    }

    /// Start a new video: drop mask history and any model state
    pub fn reset(&mut self) {
        self.stabilizer.reset();
        self.segmenter.provider_mut().reset_state();
    }

    pub fn provider_name(&self) -> &str {
        self.segmenter.provider().name()
    }
}

pub(crate) fn log_progress(frames: usize, total: u64, interval: usize) {
    if interval > 0 && frames % interval == 0 {
        if total > 0 {
            info!("   Processed {}/{} frames ({:.0}%)", frames, total, 100.0 * frames as f64 / total as f64);
        } else {
            info!("   Processed {} frames", frames);
        }
    }
}

/// Main driver replacing the background of one video
///
/// A run moves through `Init -> Running -> Finalizing -> Done`; any failure
/// moves it to `Failed`. The mask history lives in the driver's
/// [`FrameProcessor`] and is never shared between drivers.
pub struct PipelineDriver<P> {
    config: Config,
    processor: FrameProcessor<P>,
    remuxer: Box<dyn AudioRemuxer>,
    observer: Option<Box<dyn PipelineObserver>>,
    cancel: CancellationToken,
    stage: PipelineStage,
}

impl<P: SegmentationProvider> PipelineDriver<P> {
    /// Create a driver with the ffmpeg remuxer; the config is validated here
    pub fn new(config: Config, provider: P) -> Result<Self> {
        config.validate()?;
        let processor = FrameProcessor::from_config(&config, provider);
        let remuxer = Box::new(FfmpegRemuxer::new(config.audio.clone()));

        Ok(Self {
            config,
            processor,
            remuxer,
            observer: None,
            cancel: CancellationToken::new(),
            stage: PipelineStage::Init,
        })
    }

    pub fn with_remuxer(mut self, remuxer: Box<dyn AudioRemuxer>) -> Self {
        self.remuxer = remuxer;
        self
    }

    pub fn with_observer(mut self, observer: Box<dyn PipelineObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn stage(&self) -> PipelineStage {
        self.stage
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn processor_mut(&mut self) -> &mut FrameProcessor<P> {
        &mut self.processor
    }

    /// Process `foreground` over `background` and write `output` with the original audio
    pub fn run<Q: AsRef<Path>>(&mut self, foreground: Q, background: Q, output: Q) -> Result<RunSummary> {
        let (foreground, background, output) = (foreground.as_ref(), background.as_ref(), output.as_ref());
        let started_at = Utc::now();

        info!("🎬 Starting background replacement");
        info!("   Input: {:?}", foreground);
        info!("   Background: {:?}", background);
        info!("   Output: {:?}", output);
        info!("   Segmentation: {}", self.processor.provider_name());

        self.enter(PipelineStage::Init);
        let temp_path = intermediate_path(output);
        let opened = self.open(foreground, background, &temp_path);
        let (mut fg, mut bg, mut writer) = self.fail_on_err(opened)?;

        let outcome = self.drive(&mut fg, &mut bg, &mut writer);
        drop(fg);
        drop(bg);
        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(e) => {
                drop(writer);
                warn!("Run failed; intermediate kept at {:?}", temp_path);
                return self.fail(e);
            }
        };

        if outcome.cancelled && self.config.pipeline.on_cancel == CancelPolicy::Discard {
            drop(writer);
            self.discard(&temp_path);
            info!("🛑 Cancelled after {} frames, output discarded", outcome.frames_written);
            return self.fail(CompositorError::Cancelled { frames_written: outcome.frames_written });
        }

        let finalized = self.finalize(&mut writer, &temp_path, foreground, output);
        self.fail_on_err(finalized)?;

        self.enter(PipelineStage::Done);
        info!("🎉 Background replacement complete! Output saved to: {:?}", output);
        Ok(self.summary(outcome, Some(output.to_path_buf()), started_at))
    }

    /// Run the frame loop over arbitrary streams; no file handling or remux
    pub fn run_streams(
        &mut self,
        foreground: &mut dyn FrameSource,
        background: &mut dyn FrameSource,
        sink: &mut dyn FrameSink,
    ) -> Result<RunSummary> {
        let started_at = Utc::now();
        self.enter(PipelineStage::Init);

        let outcome = match self.drive(foreground, background, sink) {
            Ok(outcome) => outcome,
            Err(e) => return self.fail(e),
        };

        if outcome.cancelled && self.config.pipeline.on_cancel == CancelPolicy::Discard {
            return self.fail(CompositorError::Cancelled { frames_written: outcome.frames_written });
        }

        self.enter(PipelineStage::Finalizing);
        let finished = sink.finish();
        self.fail_on_err(finished)?;

        self.enter(PipelineStage::Done);
        Ok(self.summary(outcome, None, started_at))
    }

    fn open(
        &self,
        foreground: &Path,
        background: &Path,
        temp_path: &Path,
    ) -> Result<(FfmpegFrameReader, FfmpegFrameReader, FfmpegFrameWriter)> {
        let fg = FfmpegFrameReader::open(foreground)?;
        let bg = FfmpegFrameReader::open(background)?;

        let descriptor = fg.descriptor();
        info!(
            "📹 Foreground: {}x{} @ {:.2} fps, {} frames",
            descriptor.width, descriptor.height, descriptor.fps, descriptor.frame_count
        );
        let bg_descriptor = bg.descriptor();
        info!(
            "   Background: {}x{}, {} frames",
            bg_descriptor.width, bg_descriptor.height, bg_descriptor.frame_count
        );

        let writer = FfmpegFrameWriter::create(temp_path, &descriptor, &self.config.output)?;
        Ok((fg, bg, writer))
    }

    /// The Running stage
    fn drive(
        &mut self,
        foreground: &mut dyn FrameSource,
        background: &mut dyn FrameSource,
        sink: &mut dyn FrameSink,
    ) -> Result<LoopOutcome> {
        self.enter(PipelineStage::Running);
        let pipeline = self.config.pipeline.clone();

        if pipeline.threaded {
            info!("🎨 Processing frames on decode/process/encode threads (queue depth {})", pipeline.queue_depth);
            return threaded::drive(
                &mut self.processor,
                &mut self.observer,
                &self.cancel,
                foreground,
                background,
                sink,
                &pipeline,
            );
        }

        info!("🎨 Processing frames...");
        let total = foreground.descriptor().frame_count;
        let mut cursor = BackgroundCursor::default();
        let mut outcome = LoopOutcome::default();
        let mut index = 0usize;

        loop {
            if self.cancel.is_cancelled() {
                outcome.cancelled = true;
                break;
            }
            if total > 0 && index as u64 >= total {
                break;
            }

            let Some(fg_frame) = foreground.read_frame()? else {
                debug!("Foreground ended at frame {}", index);
                break;
            };
            let (bg_frame, background_index) = cursor.next(background)?;

            let (composite, stabilized) = self.processor.process(&fg_frame, &bg_frame)?;
            sink.write_frame(&composite)?;

            if let Some(observer) = self.observer.as_mut() {
                observer.on_frame(&FrameReport { index, background_index, stabilized_mask: &stabilized });
            }

            index += 1;
            log_progress(index, total, pipeline.progress_interval);
        }

        outcome.frames_written = index;
        outcome.background_frames_consumed = cursor.consumed();
        outcome.background_loops = cursor.loops();
        info!("   ✅ {} frames composited, background looped {} times", index, outcome.background_loops);
        Ok(outcome)
    }

    /// The Finalizing stage: close the writer, attach audio, clean up
    fn finalize(
        &mut self,
        writer: &mut dyn FrameSink,
        temp_path: &Path,
        original: &Path,
        output: &Path,
    ) -> Result<()> {
        self.enter(PipelineStage::Finalizing);
        writer.finish()?;

        info!("🔊 Attaching original audio...");
        if let Err(e) = self.remuxer.attach(temp_path, original, output) {
            warn!("Audio remux failed; silent video kept at {:?}", temp_path);
            return Err(e);
        }

        if self.config.pipeline.keep_intermediate {
            debug!("Keeping intermediate {:?}", temp_path);
        } else {
            self.discard(temp_path);
        }
        Ok(())
    }

    fn discard(&self, temp_path: &Path) {
        if let Err(e) = std::fs::remove_file(temp_path) {
            warn!("Could not remove intermediate {:?}: {}", temp_path, e);
        }
    }

    fn summary(&self, outcome: LoopOutcome, output_path: Option<PathBuf>, started_at: DateTime<Utc>) -> RunSummary {
        RunSummary {
            frames_written: outcome.frames_written,
            background_frames_consumed: outcome.background_frames_consumed,
            background_loops: outcome.background_loops,
            cancelled: outcome.cancelled,
            output_path,
            started_at,
            finished_at: Utc::now(),
        }
    }

    fn enter(&mut self, stage: PipelineStage) {
        debug!("Pipeline stage: {:?}", stage);
        self.stage = stage;
        if let Some(observer) = self.observer.as_mut() {
            observer.on_stage(stage);
        }
    }

    fn fail<T>(&mut self, error: CompositorError) -> Result<T> {
        self.enter(PipelineStage::Failed);
        Err(error)
    }

    fn fail_on_err<T>(&mut self, result: Result<T>) -> Result<T> {
        match result {
            Ok(value) => Ok(value),
            Err(e) => self.fail(e),
        }
    }
}
