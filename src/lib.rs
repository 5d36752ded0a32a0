//! forecast-forge: versioned, config-driven forecasting pipelines.
//!
//! A run is a named pipeline (`data_processing` or `forecast_model`) made of
//! tasks that are enabled per configuration and executed in order, each
//! seeing the outputs of the tasks before it through a shared parameter bag.
//! Inputs and outputs live in timestamped version directories resolved
//! before the run starts.

pub mod cli;
pub mod config;
pub mod error;
pub mod model;
pub mod pipeline;
pub mod pipelines;
pub mod storage;
pub mod tasks;
pub mod versioning;

// Re-export commonly used error types
pub use config::ConfigError;
pub use error::{ModelError, PipelineError, StorageError, TableError, TaskError, VersioningError};
