// streamcv command line runner
// Drives one capture pipeline described by a TOML file

#[cfg_attr(not(feature = "opencv"), allow(dead_code))]
mod pipeline;

use clap::{Parser, Subcommand};
use pipeline::PipelineConfig;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "streamcv")]
#[command(about = "Run OpenCV capture pipelines", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a pipeline until its source ends
    Run {
        /// Pipeline file
        #[arg(long, short)]
        config: PathBuf,

        /// Log level (error, warn, info, debug, trace)
        #[arg(long, default_value = "info")]
        log_level: String,

        /// Stop after writing this many frames
        #[arg(long)]
        max_frames: Option<u64>,
    },

    /// Validate a pipeline file without running it
    Check {
        /// Pipeline file
        #[arg(long, short)]
        config: PathBuf,
    },
}

fn init_logging(log_level: &str) -> anyhow::Result<()> {
    let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
    if !valid_log_levels.contains(&log_level) {
        return Err(anyhow::anyhow!("Invalid log level: {}", log_level));
    }
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            log_level,
            max_frames,
        } => {
            init_logging(&log_level)?;
            let pipeline = PipelineConfig::load(&config)?;
            let frames = run_pipeline(&pipeline, max_frames)?;
            info!(frames, "Wrote frames to {}", pipeline.output.dir.display());
        }
        Commands::Check { config } => {
            let pipeline = PipelineConfig::load(&config)?;
            println!(
                "{} is valid: {} state(s), source {}",
                config.display(),
                pipeline.states.len(),
                pipeline.source.kind
            );
        }
    }

    Ok(())
}

#[cfg(feature = "opencv")]
fn run_pipeline(pipeline: &PipelineConfig, max_frames: Option<u64>) -> anyhow::Result<u64> {
    use std::sync::Arc;
    use streamcv_opencv::OpenCvBackend;

    pipeline::run(pipeline, Arc::new(OpenCvBackend::new()), max_frames)
}

#[cfg(not(feature = "opencv"))]
fn run_pipeline(_pipeline: &PipelineConfig, _max_frames: Option<u64>) -> anyhow::Result<u64> {
    Err(anyhow::anyhow!(
        "streamcv was built without a vision backend, rebuild with `--features opencv`"
    ))
}
