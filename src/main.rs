use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use backdrop_compositor::{
    composition::{BatchOutcome, BatchRunner, CancellationToken, PipelineDriver},
    config::Config,
    mask::SegmentationProvider,
};

#[derive(Parser)]
#[command(
    name = "backdrop-compositor",
    version,
    about = "Replace the background of a video with another video",
    long_about = "Backdrop-Compositor segments the person in each frame, smooths and feathers the mask, and blends them over a looping background video while keeping the original audio.\n\nSegmentation runs an ONNX model and needs a build with `--features onnx` plus --model or segmentation.model_path. Without the feature, `replace` and `batch` exit with a model-unavailable error."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Configuration file (optional)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// ONNX segmentation model, overrides segmentation.model_path
    #[arg(short, long, global = true)]
    model: Option<PathBuf>,

    /// Decode, process and encode on separate threads
    #[arg(long, global = true)]
    threaded: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Replace the background of one video
    Replace {
        input: PathBuf,
        background: PathBuf,
        output: PathBuf,
    },

    /// Replace the background of every video in a directory
    Batch {
        input_dir: PathBuf,
        background: PathBuf,
        output_dir: PathBuf,
    },

    /// Write the default configuration to a file
    InitConfig { path: PathBuf },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins unless --verbose is given
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting Backdrop-Compositor v{}", env!("CARGO_PKG_VERSION"));

    if let Command::InitConfig { path } = &cli.command {
        Config::default().save_to_file(path)?;
        info!("Default configuration written to {:?}", path);
        return Ok(());
    }

    let mut config = match &cli.config {
        Some(config_path) => {
            info!("Loading configuration from {:?}", config_path);
            Config::from_file(config_path)?
        }
        None => {
            info!("Using default configuration");
            Config::default()
        }
    };
    if let Some(model) = cli.model {
        config.segmentation.model_path = Some(model);
    }
    if cli.threaded {
        config.pipeline.threaded = true;
    }

    let token = CancellationToken::new();
    let interrupt = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after the current frame");
            interrupt.cancel();
        }
    });

    let command = cli.command;
    tokio::task::spawn_blocking(move || execute(config, command, token)).await??;
    Ok(())
}

fn execute(config: Config, command: Command, token: CancellationToken) -> Result<()> {
    let provider = build_provider(&config)?;
    let driver = PipelineDriver::new(config, provider)?.with_cancellation(token);

    match command {
        Command::Replace { input, background, output } => {
            let mut driver = driver;
            let summary = driver.run(&input, &background, &output)?;
            let elapsed = (summary.finished_at - summary.started_at).num_milliseconds() as f64 / 1000.0;
            info!(
                "{} frames in {:.1}s (background looped {} times){}",
                summary.frames_written,
                elapsed,
                summary.background_loops,
                if summary.cancelled { ", cancelled early" } else { "" }
            );
        }
        Command::Batch { input_dir, background, output_dir } => {
            let report = BatchRunner::new(driver).process_directory(&input_dir, &background, &output_dir)?;
            for entry in &report.entries {
                match &entry.outcome {
                    BatchOutcome::Completed(summary) => {
                        info!("   {:?}: {} frames -> {:?}", entry.input, summary.frames_written, entry.output)
                    }
                    BatchOutcome::Failed(reason) => warn!("   {:?}: failed ({})", entry.input, reason),
                }
            }
            if report.failed() > 0 {
                anyhow::bail!("{} of {} videos failed", report.failed(), report.entries.len());
            }
        }
        Command::InitConfig { .. } => {}
    }
    Ok(())
}

#[cfg(feature = "onnx")]
fn build_provider(config: &Config) -> Result<Box<dyn SegmentationProvider>> {
    use backdrop_compositor::{error::SegmentationError, mask::OnnxSegmenter};

    let model_path = config.segmentation.model_path.as_ref().ok_or_else(|| SegmentationError::ModelUnavailable {
        reason: "no model given; pass --model or set segmentation.model_path".to_string(),
    })?;
    let segmenter = OnnxSegmenter::load(
        model_path,
        config.segmentation.input_width,
        config.segmentation.input_height,
        config.pipeline.processing_threads,
    )?;
    Ok(Box::new(segmenter))
}

#[cfg(not(feature = "onnx"))]
fn build_provider(_config: &Config) -> Result<Box<dyn SegmentationProvider>> {
    use backdrop_compositor::error::{CompositorError, SegmentationError};

    let err: CompositorError = SegmentationError::ModelUnavailable {
        reason: "built without the `onnx` feature; rebuild with --features onnx".to_string(),
    }
    .into();
    anyhow::bail!(err.user_message())
}
