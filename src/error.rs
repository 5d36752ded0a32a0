//! Error types for forecast-forge operations.
//!
//! Defines error types for the major subsystems:
//! - Table manipulation and schema enforcement
//! - File storage (tables, dicts, models, figures)
//! - Model fitting and hyperparameter search
//! - Task lifecycle and parameter-bag extraction
//! - Pipeline execution and dispatch
//! - Run versioning

use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;

/// Errors raised while manipulating in-memory tables.
#[derive(Debug, Error)]
pub enum TableError {
    #[error("Column '{0}' not found")]
    ColumnNotFound(String),

    #[error("Duplicate column '{0}'")]
    DuplicateColumn(String),

    #[error("Column '{column}' has {actual} rows, expected {expected}")]
    LengthMismatch {
        column: String,
        expected: usize,
        actual: usize,
    },

    #[error("Column '{column}' is {actual}, expected {expected}")]
    TypeMismatch {
        column: String,
        expected: String,
        actual: String,
    },

    #[error("Failed to parse '{value}' in column '{column}' with format '{format}'")]
    DateParse {
        column: String,
        value: String,
        format: String,
    },

    #[error("{label} - Primary key {columns:?} is not unique")]
    PrimaryKeyViolation { label: String, columns: Vec<String> },

    #[error("{label} - Invalid values for column {column}: {values:?}")]
    EnumViolation {
        label: String,
        column: String,
        values: Vec<String>,
    },
}

/// Errors raised while reading or writing versioned files.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Format of '{file}' not supported for {kind}")]
    UnsupportedFormat { file: String, kind: String },

    #[error("Failed to access '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error in '{path}': {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("YAML error in '{path}': {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("Unsupported column type '{data_type}' for column '{column}'")]
    UnsupportedColumnType { column: String, data_type: String },

    #[error("Invalid table data in '{path}': {reason}")]
    InvalidData { path: PathBuf, reason: String },

    #[error("Table error: {0}")]
    Table(#[from] TableError),
}

impl StorageError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Errors raised while fitting or tuning a model.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Training set is empty")]
    EmptyTrainingSet,

    #[error("Expected {expected} features, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Normal equations are singular; features may be collinear")]
    Singular,

    #[error("Invalid hyperparameter '{name}': {reason}")]
    InvalidHyperparameter { name: String, reason: String },

    #[error("Unsupported scoring '{0}'")]
    UnsupportedScoring(String),

    #[error("Cannot split {samples} samples into {splits} folds")]
    InvalidFolds { samples: usize, splits: usize },
}

/// Errors raised by a task during construction or its lifecycle.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("Missing input '{key}' in parameter bag")]
    MissingInput { key: String },

    #[error("Input '{key}' is {found}, expected {expected}")]
    InputType {
        key: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Model '{0}' is not supported")]
    UnsupportedModel(String),

    #[error("Model type '{0}' not supported by this task")]
    UnsupportedModelType(String),

    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("{0}")]
    Failed(String),
}

impl From<TableError> for TaskError {
    fn from(err: TableError) -> Self {
        TaskError::Schema(err.to_string())
    }
}

/// Errors raised by the pipeline engine and registry.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Pipeline '{0}' is not implemented yet")]
    NotImplemented(String),

    #[error("Pipeline '{name}' already executed (state: {state})")]
    AlreadyRun { name: String, state: String },

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A task failure, passed through unchanged.
    #[error(transparent)]
    Task(#[from] TaskError),
}

impl PipelineError {
    /// Returns the underlying task error, if this failure came from a task.
    pub fn as_task_error(&self) -> Option<&TaskError> {
        match self {
            PipelineError::Task(err) => Some(err),
            _ => None,
        }
    }
}

/// Errors raised while resolving run versions.
#[derive(Debug, Error)]
pub enum VersioningError {
    #[error("Pipeline '{0}' isn't defined as a processing or modeling pipeline")]
    UnknownPipeline(String),

    #[error("Folder '{0}' has no version subdirectories")]
    EmptyDataDirectory(PathBuf),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to list '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write config snapshot: {0}")]
    Snapshot(#[from] StorageError),
}
