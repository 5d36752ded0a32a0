//! CLI definition and the single `run` command for forecast-forge.
//!
//! A run loads and merges the YAML configuration, resolves the run versions
//! for the selected pipeline, executes it and finally writes the resolved
//! configuration next to the run's artefacts, whether the run succeeded or
//! not.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn};

use super::logging::RunLog;
use crate::config::{default_config_files, load_config_files, Config, DEFAULT_CONFIG_DIR};
use crate::pipeline::Outputs;
use crate::pipelines::{pipeline_names, run_pipeline};
use crate::versioning::{resolve, save_config_snapshot, RunInfo};

/// Default root for per-run configuration snapshots.
pub const DEFAULT_ARTEFACTS_ROOT: &str = "artefacts/output";

/// Versioned data processing and forecast model pipelines.
#[derive(Parser, Debug)]
#[command(name = "forecast-forge")]
#[command(about = "Run versioned data processing and forecast model pipelines")]
#[command(version)]
#[command(
    long_about = "forecast-forge runs a named pipeline against layered YAML configuration.\n\nRaw and processed data are read from and written to timestamped version\ndirectories; the resolved configuration is saved next to the run's outputs.\n\nExample usage:\n  forecast-forge --pipeline data_processing\n  forecast-forge -p forecast_model --config configs/base.yml --config local.yml"
)]
pub struct Cli {
    /// Configuration file; repeat to layer files, later files win.
    /// Defaults to every YAML file in `configs/`.
    #[arg(short = 'c', long = "config", value_name = "PATH")]
    pub config: Vec<PathBuf>,

    /// Pipeline to run (data_processing, forecast_model).
    #[arg(short, long, env = "FORECAST_FORGE_PIPELINE")]
    pub pipeline: String,

    /// Version of this run; defaults to the current time.
    #[arg(long)]
    pub run_version: Option<String>,

    /// Processed data version to write (data_processing) or read (forecast_model).
    #[arg(long)]
    pub processed_data_version: Option<String>,

    /// Raw data version to read.
    #[arg(long)]
    pub raw_data_version: Option<String>,

    /// Root directory of the configuration snapshots.
    #[arg(long, default_value = DEFAULT_ARTEFACTS_ROOT)]
    pub artefacts_root: PathBuf,

    /// Enable debug logging.
    #[arg(short, long)]
    pub verbose: bool,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info")]
    pub log_level: String,
}

impl Cli {
    /// The tracing filter requested on the command line; `--verbose` wins.
    pub fn log_filter(&self) -> String {
        if self.verbose {
            "debug".to_string()
        } else {
            self.log_level.clone()
        }
    }

    pub fn run_info(&self) -> RunInfo {
        RunInfo {
            pipeline: self.pipeline.clone(),
            run_version: self.run_version.clone(),
            raw_data_version: self.raw_data_version.clone(),
            processed_data_version: self.processed_data_version.clone(),
        }
    }

    fn config_files(&self) -> anyhow::Result<Vec<PathBuf>> {
        if !self.config.is_empty() {
            return Ok(self.config.clone());
        }
        default_config_files(Path::new(DEFAULT_CONFIG_DIR)).context("No --config given")
    }
}

/// Parse CLI arguments.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Parse CLI arguments and run the selected pipeline.
pub fn run() -> anyhow::Result<Outputs> {
    run_with_cli(parse_cli())
}

/// Run the pipeline selected by `cli`.
///
/// The configuration snapshot is written after the pipeline returns, on
/// success and on failure. Version resolution errors happen before a run
/// version exists, so nothing is written for them. When both the pipeline
/// and the snapshot fail, the pipeline error is returned.
pub fn run_with_cli(cli: Cli) -> anyhow::Result<Outputs> {
    execute(cli, None)
}

/// Like [`run_with_cli`], also writing the run's log file through `run_log`.
pub fn run_with_log(cli: Cli, run_log: &RunLog) -> anyhow::Result<Outputs> {
    execute(cli, Some(run_log))
}

fn execute(cli: Cli, run_log: Option<&RunLog>) -> anyhow::Result<Outputs> {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        pipeline = %cli.pipeline,
        "Starting forecast-forge"
    );
    let files = cli.config_files()?;
    info!(files = ?files, "Loading configuration");
    let config = load_config_files(&files).context("Failed to load configuration")?;

    let resolved = resolve(&cli.run_info(), &config).with_context(|| {
        format!(
            "Failed to resolve versions for pipeline '{}' (known pipelines: {})",
            cli.pipeline,
            pipeline_names().collect::<Vec<_>>().join(", ")
        )
    })?;
    if let Some(run_log) = run_log {
        run_log.attach(&resolved)?;
    }
    let resolved = Arc::new(resolved);

    let outcome = run_pipeline(&cli.pipeline, Arc::clone(&resolved));
    if let Err(err) = &outcome {
        error!(pipeline = %cli.pipeline, error = %err, "Pipeline failed");
    }

    let saved = finish_run(&resolved, &cli.artefacts_root);
    let outputs = outcome?;
    saved?;
    Ok(outputs)
}

fn finish_run(config: &Config, artefacts_root: &Path) -> anyhow::Result<PathBuf> {
    let saved = save_config_snapshot(config, artefacts_root);
    match &saved {
        Ok(path) => info!(path = %path.display(), "Saved run configuration"),
        Err(err) => error!(error = %err, "Failed to save run configuration"),
    }
    let details = &config.run_details;
    warn!(
        pipeline = ?details.pipeline,
        run_version = ?details.run_version,
        raw_data_version = ?details.raw_data_version,
        processed_data_version = ?details.processed_data_version,
        "Run details"
    );
    saved.with_context(|| {
        format!(
            "Failed to save run configuration under {}",
            artefacts_root.display()
        )
    })
}
