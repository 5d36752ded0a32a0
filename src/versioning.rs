//! Run versioning.
//!
//! Every run works against three version strings: the run itself, the raw
//! data it reads and the processed data it reads or writes. Versions are
//! `YYYYMMDD_HHMMSS` timestamps so that lexicographic order matches
//! recency. [`resolve`] stamps them into a new configuration snapshot
//! depending on the pipeline's category; [`save_config_snapshot`] persists
//! that snapshot next to the run's outputs.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use chrono::{Local, NaiveDateTime};
use regex::Regex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{Config, ConfigError};
use crate::error::VersioningError;
use crate::pipelines::{category_of, PipelineCategory};
use crate::storage::{write_dict, DataLocation};

/// `strftime` pattern of version strings.
pub const VERSION_FORMAT: &str = "%Y%m%d_%H%M%S";

/// File name of the per-run configuration snapshot.
pub const SNAPSHOT_FILE: &str = "config.yml";

/// What the caller asked for; absent versions are resolved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunInfo {
    pub pipeline: String,
    pub run_version: Option<String>,
    pub raw_data_version: Option<String>,
    pub processed_data_version: Option<String>,
}

impl RunInfo {
    pub fn new(pipeline: impl Into<String>) -> Self {
        Self {
            pipeline: pipeline.into(),
            ..Default::default()
        }
    }

    pub fn with_run_version(mut self, version: impl Into<String>) -> Self {
        self.run_version = Some(version.into());
        self
    }

    pub fn with_raw_data_version(mut self, version: impl Into<String>) -> Self {
        self.raw_data_version = Some(version.into());
        self
    }

    pub fn with_processed_data_version(mut self, version: impl Into<String>) -> Self {
        self.processed_data_version = Some(version.into());
        self
    }
}

/// The resolved versions of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionInfo {
    pub pipeline: String,
    pub run_version: String,
    pub raw_data_version: Option<String>,
    pub processed_data_version: String,
}

impl VersionInfo {
    /// Reads the versions stamped into `config.run_details`.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let details = &config.run_details;
        Ok(Self {
            pipeline: details.pipeline()?.to_string(),
            run_version: details.run_version()?.to_string(),
            raw_data_version: details.raw_data_version.clone(),
            processed_data_version: details.processed_data_version()?.to_string(),
        })
    }
}

/// Formats `now` as a version string.
pub fn timestamp_version(now: NaiveDateTime) -> String {
    now.format(VERSION_FORMAT).to_string()
}

fn version_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\d{8}_\d{6}$").expect("version pattern is valid"))
}

/// Whether `name` is a well-formed version string.
pub fn is_version_name(name: &str) -> bool {
    version_pattern().is_match(name) && NaiveDateTime::parse_from_str(name, VERSION_FORMAT).is_ok()
}

/// The most recent version directory under `root`.
///
/// Only immediate subdirectories named `YYYYMMDD_HHMMSS` are candidates;
/// anything else is skipped with a warning since it would break the
/// lexicographic ordering.
pub fn latest_version(root: &Path) -> Result<String, VersioningError> {
    let io_err = |source| VersioningError::Io {
        path: root.to_path_buf(),
        source,
    };

    let mut latest: Option<String> = None;
    for entry in std::fs::read_dir(root).map_err(io_err)? {
        let entry = entry.map_err(io_err)?;
        if !entry.file_type().map_err(io_err)?.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if !is_version_name(&name) {
            warn!(
                root = %root.display(),
                directory = %name,
                "Ignoring directory not named {}",
                VERSION_FORMAT
            );
            continue;
        }
        if latest.as_deref().map_or(true, |current| name.as_str() > current) {
            latest = Some(name);
        }
    }

    let latest = latest.ok_or_else(|| VersioningError::EmptyDataDirectory(root.to_path_buf()))?;
    debug!(root = %root.display(), version = %latest, "Resolved latest version");
    Ok(latest)
}

/// Resolves versions against the current local time.
pub fn resolve(run_info: &RunInfo, config: &Config) -> Result<Config, VersioningError> {
    resolve_at(run_info, config, Local::now().naive_local())
}

/// Returns a copy of `config` with `run_details` stamped for this run.
///
/// - `run_version`: explicit, else `now`.
/// - `data_processing`: `processed_data_version` is explicit, else `now`;
///   `raw_data_version` is explicit, else the configured value, else unset.
/// - `forecast_model`: `processed_data_version` is explicit, else the
///   latest directory under the processed-data root; `raw_data_version` is
///   left as configured.
pub fn resolve_at(
    run_info: &RunInfo,
    config: &Config,
    now: NaiveDateTime,
) -> Result<Config, VersioningError> {
    let category = category_of(&run_info.pipeline)
        .ok_or_else(|| VersioningError::UnknownPipeline(run_info.pipeline.clone()))?;

    let current_time = timestamp_version(now);
    let mut resolved = config.clone();
    let details = &mut resolved.run_details;

    details.pipeline = Some(run_info.pipeline.clone());
    details.run_version = Some(
        run_info
            .run_version
            .clone()
            .unwrap_or_else(|| current_time.clone()),
    );

    match category {
        PipelineCategory::DataProcessing => {
            details.processed_data_version = Some(
                run_info
                    .processed_data_version
                    .clone()
                    .unwrap_or(current_time),
            );
            details.raw_data_version = run_info
                .raw_data_version
                .clone()
                .or_else(|| details.raw_data_version.clone());
        }
        PipelineCategory::ForecastModel => {
            let processed = match &run_info.processed_data_version {
                Some(version) => version.clone(),
                None => latest_version(config.data.processed().base_directory()?)?,
            };
            details.processed_data_version = Some(processed);
            if run_info.raw_data_version.is_some() {
                warn!(
                    pipeline = %run_info.pipeline,
                    "Ignoring raw data version for a {} pipeline",
                    category
                );
            }
        }
    }

    info!(
        pipeline = %run_info.pipeline,
        category = %category,
        run_version = ?resolved.run_details.run_version,
        processed_data_version = ?resolved.run_details.processed_data_version,
        raw_data_version = ?resolved.run_details.raw_data_version,
        "Resolved run versions"
    );
    Ok(resolved)
}

/// Writes `config` to `<artefacts_root>/<category>/<run_version>/config.yml`.
pub fn save_config_snapshot(config: &Config, artefacts_root: &Path) -> Result<PathBuf, VersioningError> {
    let pipeline = config.run_details.pipeline()?;
    let category =
        category_of(pipeline).ok_or_else(|| VersioningError::UnknownPipeline(pipeline.to_string()))?;
    let run_version = config.run_details.run_version()?;

    let location = DataLocation::new(artefacts_root, SNAPSHOT_FILE)
        .with_pipeline(category.as_str())
        .with_time_connector(run_version);
    write_dict(&location, config)?;

    let path = location.path();
    info!(path = %path.display(), "Configuration snapshot saved");
    Ok(path)
}
