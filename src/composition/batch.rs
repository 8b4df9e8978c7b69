use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::{
    composition::engine::{PipelineDriver, RunSummary},
    config::{BatchConfig, CancelPolicy},
    error::{CompositionError, CompositorError, Result},
    mask::SegmentationProvider,
};

/// What happened to one input of a batch
#[derive(Debug)]
pub enum BatchOutcome {
    Completed(RunSummary),
    Failed(String),
}

#[derive(Debug)]
pub struct BatchEntry {
    pub input: PathBuf,
    pub output: PathBuf,
    pub outcome: BatchOutcome,
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub entries: Vec<BatchEntry>,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e.outcome, BatchOutcome::Completed(_)))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.entries.len() - self.succeeded()
    }
}

/// Applies one background to every video in a directory
///
/// Each file starts with empty mask history and a reset provider.
pub struct BatchRunner<P> {
    driver: PipelineDriver<P>,
    settings: BatchConfig,
}

impl<P: SegmentationProvider> BatchRunner<P> {
    pub fn new(driver: PipelineDriver<P>) -> Self {
        let settings = driver.config().batch.clone();
        Self { driver, settings }
    }

    pub fn process_directory<Q: AsRef<Path>>(
        &mut self,
        input_dir: Q,
        background: Q,
        output_dir: Q,
    ) -> Result<BatchReport> {
        let (input_dir, background, output_dir) = (input_dir.as_ref(), background.as_ref(), output_dir.as_ref());

        let inputs = discover_inputs(input_dir, &self.settings.extensions)?;
        let total = inputs.len();
        std::fs::create_dir_all(output_dir)?;

        info!("📂 Batch: {} videos from {:?} into {:?}", inputs.len(), input_dir, output_dir);

        let mut report = BatchReport::default();
        for (offset, input) in inputs.into_iter().enumerate() {
            // A finalized cancel returns Ok, so the token is the only stop signal
            if self.driver.cancellation_token().is_cancelled() {
                warn!("Batch cancelled, {} videos not started", total - offset);
                if self.driver.config().pipeline.on_cancel == CancelPolicy::Discard {
                    return Err(CompositorError::Cancelled { frames_written: 0 });
                }
                break;
            }

            let index = self.settings.start_index as usize + offset;
            let output = output_dir.join(output_name(&self.settings.output_prefix, index));
            info!("▶️  [{}] {:?} -> {:?}", index, input, output);

            self.driver.processor_mut().reset();
            let outcome = match self.driver.run(input.as_path(), background, output.as_path()) {
                Ok(summary) => BatchOutcome::Completed(summary),
                Err(e @ CompositorError::Cancelled { .. }) => return Err(e),
                Err(e) if !self.settings.continue_on_error => return Err(e),
                Err(e) => {
                    warn!("Skipping {:?}: {}", input, e.user_message());
                    BatchOutcome::Failed(e.to_string())
                }
            };
            report.entries.push(BatchEntry { input, output, outcome });
        }

        info!("   ✅ Batch complete: {} succeeded, {} failed", report.succeeded(), report.failed());
        Ok(report)
    }
}

/// Video files directly inside `dir`, sorted by name
pub fn discover_inputs(dir: &Path, extensions: &[String]) -> Result<Vec<PathBuf>> {
    let no_inputs = || -> CompositorError {
        CompositionError::NoInputsFound { path: dir.display().to_string() }.into()
    };

    if !dir.is_dir() {
        return Err(no_inputs());
    }

    let mut inputs: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| {
            let hidden = path
                .file_name()
                .and_then(|n| n.to_str())
                .map_or(true, |n| n.starts_with('.'));
            let recognized = path
                .extension()
                .and_then(|e| e.to_str())
                .map_or(false, |e| extensions.iter().any(|known| known.eq_ignore_ascii_case(e)));
            !hidden && recognized
        })
        .collect();

    if inputs.is_empty() {
        return Err(no_inputs());
    }

    inputs.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(inputs)
}

pub fn output_name(prefix: &str, index: usize) -> String {
    format!("{}_{}.mp4", prefix, index)
}
