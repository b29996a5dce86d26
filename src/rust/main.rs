use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;
use clap::Parser;
use log::info;
use phenoscope::{logging, pipeline, AppConfig};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML configuration file [default: phenoscope.toml, if present]
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Embedding file to analyze, overriding the configuration
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Do not show charts in the terminal
    #[arg(long)]
    no_display: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = AppConfig::load(args.config.as_deref()).context("failed to load configuration")?;
    if let Some(input) = args.input {
        config.pipeline.input = input;
    }
    if args.no_display {
        config.pipeline.display = false;
    }

    let handle = logging::init(&config.logging).context("failed to initialize logging")?;
    info!("=== Starting phenoscope (log level {}) ===", handle.level);

    let start_time = Instant::now();
    let report = pipeline::run(&config.pipeline)?;
    info!(
        "=== Finished in {:.2?}: {} samples, {} classes, best k = {} ===",
        start_time.elapsed(),
        report.n_samples,
        report.n_classes,
        report.best_k
    );
    Ok(())
}
