//! Layered run configuration.
//!
//! A run is driven by one or more YAML files deep-merged into a single
//! [`Config`] tree. The tree is read-only once loaded; the versioning
//! resolver produces a new snapshot with `run_details` stamped rather than
//! mutating the loaded one.
//!
//! Recognized top-level sections are `run_details`, `log_details`, `data`,
//! `pipelines` and `forecast_model`. Any other section is carried verbatim so the end-of-run
//! snapshot reproduces the input.

mod loader;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use loader::{default_config_files, load_config_files, merge_values, DEFAULT_CONFIG_DIR};

/// Errors that can occur while loading or querying configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A config file could not be read.
    #[error("Failed to read config file '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A config file is not valid YAML.
    #[error("Failed to parse config file '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// A config file does not hold a mapping at the top level.
    #[error("Config file '{0}' must contain a mapping at the top level")]
    NotAMapping(PathBuf),

    /// The merged tree does not match the expected shape.
    #[error("Invalid configuration: {0}")]
    Invalid(#[source] serde_yaml::Error),

    /// A key required by the caller is absent.
    #[error("Missing configuration key '{0}'")]
    MissingKey(String),

    /// A key holds a value outside its accepted range.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// No config files were given and none were found in the default directory.
    #[error("No configuration files found in '{0}'")]
    NoConfigFiles(PathBuf),
}

/// The merged configuration tree for a single run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub run_details: RunDetails,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_details: Option<LogDetails>,
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub pipelines: BTreeMap<String, PipelineSection>,
    #[serde(default)]
    pub forecast_model: ForecastModelConfig,
    /// Sections this crate does not interpret.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

impl Config {
    /// Parses a configuration from a single YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let value: serde_yaml::Value = serde_yaml::from_str(yaml).map_err(ConfigError::Invalid)?;
        Self::from_value(value)
    }

    /// Builds a configuration from an already-merged YAML value.
    pub fn from_value(value: serde_yaml::Value) -> Result<Self, ConfigError> {
        let value = match value {
            serde_yaml::Value::Null => serde_yaml::Value::Mapping(Default::default()),
            other => other,
        };
        let config: Config = serde_yaml::from_value(value).map_err(ConfigError::Invalid)?;
        config.validate()?;
        Ok(config)
    }

    /// Returns whether `task` is enabled in `pipelines.<pipeline>.tasks`.
    ///
    /// A flag that is absent is an error rather than an implicit `false`, so a
    /// typo in the YAML cannot silently drop a stage.
    pub fn task_enabled(&self, pipeline: &str, task: &str) -> Result<bool, ConfigError> {
        self.pipelines
            .get(pipeline)
            .and_then(|section| section.tasks.get(task))
            .copied()
            .ok_or_else(|| ConfigError::MissingKey(format!("pipelines.{pipeline}.tasks.{task}")))
    }

    /// Path of the per-run log file, or `None` without a `log_details` section.
    ///
    /// The layout is
    /// `<main_directory>/<logs_directory>/<pipeline>/<file_name>_<run_version><file_ext>`,
    /// so the run details must already be resolved.
    pub fn log_file_path(&self) -> Result<Option<PathBuf>, ConfigError> {
        let Some(log) = &self.log_details else {
            return Ok(None);
        };
        let file_name = format!(
            "{}_{}{}",
            required(&log.file_name, "log_details.file_name")?,
            self.run_details.run_version()?,
            log.file_ext
        );
        Ok(Some(
            Path::new(required(
                &log.base_directory.main_directory,
                "log_details.base_directory.main_directory",
            )?)
            .join(&log.base_directory.logs_directory)
            .join(self.run_details.pipeline()?)
            .join(file_name),
        ))
    }

    /// Looks up a value by dotted path, e.g. `data.raw_data.tables.dummy_data`.
    pub fn lookup(&self, path: &str) -> Option<serde_yaml::Value> {
        let mut current = serde_yaml::to_value(self).ok()?;
        for segment in path.split('.') {
            current = match current {
                serde_yaml::Value::Mapping(mut map) => map.remove(segment)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Validates value ranges that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let fm = &self.forecast_model;
        if !(fm.test_size > 0.0 && fm.test_size < 1.0) {
            return Err(ConfigError::InvalidValue {
                key: "forecast_model.test_size".to_string(),
                message: format!("must be between 0 and 1 (exclusive), got {}", fm.test_size),
            });
        }

        let hp = &fm.ml_model.hyperparameters;
        if hp.cv_splits < 2 {
            return Err(ConfigError::InvalidValue {
                key: "forecast_model.ml_model.hyperparameters.cv_splits".to_string(),
                message: format!("must be at least 2, got {}", hp.cv_splits),
            });
        }
        if hp.n_iter == 0 {
            return Err(ConfigError::InvalidValue {
                key: "forecast_model.ml_model.hyperparameters.n_iter".to_string(),
                message: "must be greater than 0".to_string(),
            });
        }

        Ok(())
    }
}

/// Per-run details stamped by the versioning resolver.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunDetails {
    #[serde(default)]
    pub pipeline: Option<String>,
    #[serde(default)]
    pub run_version: Option<String>,
    #[serde(default)]
    pub raw_data_version: Option<String>,
    #[serde(default)]
    pub processed_data_version: Option<String>,
}

impl RunDetails {
    pub fn pipeline(&self) -> Result<&str, ConfigError> {
        required(&self.pipeline, "run_details.pipeline")
    }

    pub fn run_version(&self) -> Result<&str, ConfigError> {
        required(&self.run_version, "run_details.run_version")
    }

    pub fn raw_data_version(&self) -> Result<&str, ConfigError> {
        required(&self.raw_data_version, "run_details.raw_data_version")
    }

    pub fn processed_data_version(&self) -> Result<&str, ConfigError> {
        required(&self.processed_data_version, "run_details.processed_data_version")
    }
}

/// The `log_details` section: where each run's log file is written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogDetails {
    #[serde(default)]
    pub base_directory: LogDirectories,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default = "default_log_ext")]
    pub file_ext: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogDirectories {
    #[serde(default)]
    pub main_directory: Option<String>,
    #[serde(default = "default_logs_directory")]
    pub logs_directory: String,
}

impl Default for LogDetails {
    fn default() -> Self {
        Self {
            base_directory: LogDirectories::default(),
            file_name: None,
            file_ext: default_log_ext(),
        }
    }
}

impl Default for LogDirectories {
    fn default() -> Self {
        Self {
            main_directory: None,
            logs_directory: default_logs_directory(),
        }
    }
}

fn default_log_ext() -> String {
    ".log".to_string()
}

fn default_logs_directory() -> String {
    "logs".to_string()
}

fn required<'a>(value: &'a Option<String>, key: &str) -> Result<&'a str, ConfigError> {
    value
        .as_deref()
        .ok_or_else(|| ConfigError::MissingKey(key.to_string()))
}

/// The `data` section: roots and file names for each storage area.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataConfig {
    #[serde(default)]
    pub raw_data: DataSection,
    #[serde(default)]
    pub processed_data: DataSection,
    #[serde(default)]
    pub output_data: DataSection,
}

impl DataConfig {
    pub fn raw(&self) -> DataArea<'_> {
        DataArea::new("data.raw_data", &self.raw_data)
    }

    pub fn processed(&self) -> DataArea<'_> {
        DataArea::new("data.processed_data", &self.processed_data)
    }

    pub fn output(&self) -> DataArea<'_> {
        DataArea::new("data.output_data", &self.output_data)
    }
}

/// One storage area: a base directory and named files grouped by payload kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSection {
    #[serde(default)]
    pub base_directory: Option<PathBuf>,
    #[serde(default)]
    pub tables: BTreeMap<String, String>,
    #[serde(default)]
    pub dicts: BTreeMap<String, String>,
    #[serde(default)]
    pub models: BTreeMap<String, String>,
    #[serde(default)]
    pub lists: BTreeMap<String, String>,
    #[serde(default)]
    pub figures: BTreeMap<String, String>,
}

/// A [`DataSection`] paired with its dotted path, for error messages.
#[derive(Debug, Clone, Copy)]
pub struct DataArea<'a> {
    path: &'static str,
    section: &'a DataSection,
}

impl<'a> DataArea<'a> {
    fn new(path: &'static str, section: &'a DataSection) -> Self {
        Self { path, section }
    }

    pub fn base_directory(&self) -> Result<&'a Path, ConfigError> {
        self.section
            .base_directory
            .as_deref()
            .ok_or_else(|| ConfigError::MissingKey(format!("{}.base_directory", self.path)))
    }

    pub fn table(&self, key: &str) -> Result<&'a str, ConfigError> {
        self.file("tables", &self.section.tables, key)
    }

    pub fn dict(&self, key: &str) -> Result<&'a str, ConfigError> {
        self.file("dicts", &self.section.dicts, key)
    }

    pub fn model(&self, key: &str) -> Result<&'a str, ConfigError> {
        self.file("models", &self.section.models, key)
    }

    /// Figures are optional outputs; `None` means "do not render".
    pub fn figure(&self, key: &str) -> Option<&'a str> {
        self.section.figures.get(key).map(String::as_str)
    }

    fn file(
        &self,
        group: &str,
        files: &'a BTreeMap<String, String>,
        key: &str,
    ) -> Result<&'a str, ConfigError> {
        files
            .get(key)
            .map(String::as_str)
            .ok_or_else(|| ConfigError::MissingKey(format!("{}.{group}.{key}", self.path)))
    }
}

/// Task flags for one pipeline: `pipelines.<name>.tasks`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineSection {
    #[serde(default)]
    pub tasks: BTreeMap<String, bool>,
}

/// The `forecast_model` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastModelConfig {
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default = "default_model_type")]
    pub model_type: String,
    #[serde(default = "default_test_size")]
    pub test_size: f64,
    #[serde(default = "default_random_state")]
    pub random_state: u64,
    #[serde(default)]
    pub features: FeatureLists,
    #[serde(default)]
    pub ml_model: MlModelConfig,
}

impl Default for ForecastModelConfig {
    fn default() -> Self {
        Self {
            target: None,
            model_type: default_model_type(),
            test_size: default_test_size(),
            random_state: default_random_state(),
            features: FeatureLists::default(),
            ml_model: MlModelConfig::default(),
        }
    }
}

impl ForecastModelConfig {
    pub fn target(&self) -> Result<&str, ConfigError> {
        required(&self.target, "forecast_model.target")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureLists {
    #[serde(default)]
    pub numeric: Vec<String>,
    #[serde(default)]
    pub categorical: Vec<String>,
}

/// Model selection and search settings: `forecast_model.ml_model`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MlModelConfig {
    #[serde(default)]
    pub model_name: Option<String>,
    #[serde(default = "default_scoring")]
    pub scoring: String,
    #[serde(default = "default_random_state")]
    pub random_state: u64,
    #[serde(default)]
    pub hyperparameters: HyperparameterConfig,
}

impl Default for MlModelConfig {
    fn default() -> Self {
        Self {
            model_name: None,
            scoring: default_scoring(),
            random_state: default_random_state(),
            hyperparameters: HyperparameterConfig::default(),
        }
    }
}

impl MlModelConfig {
    pub fn model_name(&self) -> Result<&str, ConfigError> {
        required(&self.model_name, "forecast_model.ml_model.model_name")
    }
}

/// Search settings plus one search space per model name.
///
/// ```yaml
/// hyperparameters:
///   cv_splits: 5
///   n_iter: 10
///   ridge:
///     alpha: [0.01, 0.1, 1.0]
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HyperparameterConfig {
    #[serde(default = "default_cv_splits")]
    pub cv_splits: usize,
    #[serde(default = "default_n_iter")]
    pub n_iter: usize,
    #[serde(flatten)]
    pub search_spaces: BTreeMap<String, BTreeMap<String, Vec<serde_json::Value>>>,
}

impl Default for HyperparameterConfig {
    fn default() -> Self {
        Self {
            cv_splits: default_cv_splits(),
            n_iter: default_n_iter(),
            search_spaces: BTreeMap::new(),
        }
    }
}

fn default_model_type() -> String {
    "ml_model".to_string()
}

fn default_test_size() -> f64 {
    0.33
}

fn default_random_state() -> u64 {
    42
}

fn default_scoring() -> String {
    "r2".to_string()
}

fn default_cv_splits() -> usize {
    5
}

fn default_n_iter() -> usize {
    10
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
run_details:
  raw_data_version: "20240101_000000"
data:
  raw_data:
    base_directory: data/raw
    tables:
      dummy_data: dummy_data.csv
pipelines:
  forecast_model:
    tasks:
      feature_engineering: true
      prepare_data: false
forecast_model:
  target: y
  ml_model:
    model_name: ridge
    hyperparameters:
      cv_splits: 3
      ridge:
        alpha: [0.1, 1.0]
notes:
  owner: forecasting
"#;

    #[test]
    fn test_parse_sample_config() {
        let config = Config::from_yaml_str(SAMPLE).expect("sample should parse");

        assert_eq!(
            config.run_details.raw_data_version.as_deref(),
            Some("20240101_000000")
        );
        assert_eq!(config.run_details.run_version, None);
        assert_eq!(
            config.data.raw().table("dummy_data").expect("table exists"),
            "dummy_data.csv"
        );
        assert_eq!(config.forecast_model.model_type, "ml_model");
        assert_eq!(config.forecast_model.ml_model.hyperparameters.cv_splits, 3);
        assert_eq!(config.forecast_model.ml_model.hyperparameters.n_iter, 10);
        assert_eq!(
            config.forecast_model.ml_model.hyperparameters.search_spaces["ridge"]["alpha"].len(),
            2
        );
        assert!(config.extra.contains_key("notes"));
    }

    #[test]
    fn test_log_file_path_layout() {
        let mut config = Config::from_yaml_str(
            "log_details:\n  base_directory:\n    main_directory: artefacts\n  file_name: forecast\n",
        )
        .expect("log details parse");
        assert!(matches!(
            config.log_file_path().unwrap_err(),
            ConfigError::MissingKey(ref key) if key == "run_details.run_version"
        ));

        config.run_details.pipeline = Some("forecast_model".to_string());
        config.run_details.run_version = Some("20240301_120000".to_string());
        assert_eq!(
            config.log_file_path().unwrap(),
            Some(PathBuf::from(
                "artefacts/logs/forecast_model/forecast_20240301_120000.log"
            ))
        );
    }

    #[test]
    fn test_log_file_path_is_optional() {
        let config = Config::from_yaml_str(SAMPLE).expect("sample should parse");
        assert_eq!(config.log_file_path().unwrap(), None);
        assert!(
            !serde_yaml::to_string(&config).unwrap().contains("log_details"),
            "an absent section stays absent in snapshots"
        );

        let mut partial = Config::from_yaml_str("log_details:\n  file_name: forecast\n").unwrap();
        partial.run_details.run_version = Some("v1".to_string());
        partial.run_details.pipeline = Some("forecast_model".to_string());
        assert!(matches!(
            partial.log_file_path().unwrap_err(),
            ConfigError::MissingKey(ref key) if key == "log_details.base_directory.main_directory"
        ));
    }

    #[test]
    fn test_task_enabled() {
        let config = Config::from_yaml_str(SAMPLE).expect("sample should parse");

        assert!(config.task_enabled("forecast_model", "feature_engineering").unwrap());
        assert!(!config.task_enabled("forecast_model", "prepare_data").unwrap());

        let err = config
            .task_enabled("forecast_model", "fit_model")
            .unwrap_err();
        assert!(err.to_string().contains("pipelines.forecast_model.tasks.fit_model"));
    }

    #[test]
    fn test_missing_keys_report_dotted_path() {
        let config = Config::default();

        let err = config.data.processed().table("dummy_data").unwrap_err();
        assert!(matches!(err, ConfigError::MissingKey(ref key) if key == "data.processed_data.tables.dummy_data"));

        let err = config.data.output().base_directory().unwrap_err();
        assert!(matches!(err, ConfigError::MissingKey(ref key) if key == "data.output_data.base_directory"));

        let err = config.run_details.run_version().unwrap_err();
        assert!(matches!(err, ConfigError::MissingKey(ref key) if key == "run_details.run_version"));
    }

    #[test]
    fn test_lookup_dotted_path() {
        let config = Config::from_yaml_str(SAMPLE).expect("sample should parse");

        assert_eq!(
            config.lookup("data.raw_data.tables.dummy_data"),
            Some(serde_yaml::Value::String("dummy_data.csv".to_string()))
        );
        assert_eq!(
            config.lookup("notes.owner"),
            Some(serde_yaml::Value::String("forecasting".to_string()))
        );
        assert_eq!(config.lookup("data.raw_data.tables.missing"), None);
        assert_eq!(config.lookup("forecast_model.target.deeper"), None);
    }

    #[test]
    fn test_validate_rejects_bad_test_size() {
        let err = Config::from_yaml_str("forecast_model:\n  test_size: 1.5\n").unwrap_err();
        assert!(err.to_string().contains("forecast_model.test_size"));
    }

    #[test]
    fn test_validate_rejects_single_fold() {
        let yaml = "forecast_model:\n  ml_model:\n    hyperparameters:\n      cv_splits: 1\n";
        let err = Config::from_yaml_str(yaml).unwrap_err();
        assert!(err.to_string().contains("cv_splits"));
    }

    #[test]
    fn test_empty_document_yields_defaults() {
        let config = Config::from_yaml_str("").expect("empty config is valid");
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_roundtrip_keeps_unknown_sections() {
        let config = Config::from_yaml_str(SAMPLE).expect("sample should parse");
        let yaml = serde_yaml::to_string(&config).expect("serialize");
        let reparsed = Config::from_yaml_str(&yaml).expect("reparse");
        assert_eq!(config, reparsed);
    }
}
