//! Logging setup: console output plus a per-run log file.
//!
//! The file layer starts empty and is installed through a reload handle once
//! the run version is known, because the file name contains it.

use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::{info, Subscriber};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::format::{DefaultFields, Format};
use tracing_subscriber::{fmt, prelude::*, reload, EnvFilter, Registry};

use crate::config::Config;

type FileLayer = fmt::Layer<Registry, DefaultFields, Format, RollingFileAppender>;

/// Handle for attaching the run's log file to an installed subscriber.
#[derive(Clone)]
pub struct RunLog {
    handle: reload::Handle<Option<FileLayer>, Registry>,
}

impl RunLog {
    /// Starts appending log lines to the file named by `log_details`.
    ///
    /// Returns `Ok(None)` when the configuration has no `log_details` section.
    pub fn attach(&self, config: &Config) -> anyhow::Result<Option<PathBuf>> {
        let Some(path) = config.log_file_path()? else {
            return Ok(None);
        };
        let (directory, file_name) = split_path(&path)?;
        std::fs::create_dir_all(directory)
            .with_context(|| format!("Failed to create log directory {}", directory.display()))?;

        let appender = RollingFileAppender::builder()
            .rotation(Rotation::NEVER)
            .filename_prefix(file_name)
            .build(directory)
            .with_context(|| format!("Failed to open log file {}", path.display()))?;
        let layer = fmt::layer().with_ansi(false).with_writer(appender);
        self.handle
            .reload(Some(layer))
            .context("Failed to install the run log file")?;

        info!(path = %path.display(), "Logging run to file");
        Ok(Some(path))
    }
}

fn split_path(path: &Path) -> anyhow::Result<(&Path, &str)> {
    let directory = path.parent().unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .with_context(|| format!("Invalid log file path {}", path.display()))?;
    Ok((directory, file_name))
}

/// Builds the subscriber: an optional run log file, console output and a
/// filter taken from `RUST_LOG`, falling back to `default_filter`.
pub fn subscriber(default_filter: &str) -> (impl Subscriber + Send + Sync + 'static, RunLog) {
    let (file_layer, handle) = reload::Layer::new(None::<FileLayer>);
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let subscriber = tracing_subscriber::registry()
        .with(file_layer)
        .with(fmt::layer())
        .with(filter);
    (subscriber, RunLog { handle })
}

/// Installs [`subscriber`] as the global default.
pub fn init_logging(default_filter: &str) -> RunLog {
    let (subscriber, run_log) = subscriber(default_filter);
    subscriber.init();
    run_log
}
