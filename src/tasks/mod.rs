//! Task bodies of the registered pipelines.
//!
//! Each task reads its paths from the run configuration:
//!
//! - raw and processed data live under `<root>/<version>/<file>`;
//! - outputs live under `<root>/<pipeline>/<run_version>/<file>`.

pub mod data_processing;
pub mod forecast_model;

use crate::config::{Config, ConfigError};
use crate::storage::DataLocation;

/// `<raw root>/<raw_data_version>/<file>`
pub(crate) fn raw_location(config: &Config, file_name: &str) -> Result<DataLocation, ConfigError> {
    Ok(DataLocation::new(config.data.raw().base_directory()?, file_name)
        .with_time_connector(config.run_details.raw_data_version()?))
}

/// `<processed root>/<processed_data_version>/<file>`
pub(crate) fn processed_location(
    config: &Config,
    file_name: &str,
) -> Result<DataLocation, ConfigError> {
    Ok(DataLocation::new(config.data.processed().base_directory()?, file_name)
        .with_time_connector(config.run_details.processed_data_version()?))
}

/// `<output root>/<pipeline>/<run_version>/<file>`
pub(crate) fn output_location(config: &Config, file_name: &str) -> Result<DataLocation, ConfigError> {
    Ok(DataLocation::new(config.data.output().base_directory()?, file_name)
        .with_pipeline(config.run_details.pipeline()?)
        .with_time_connector(config.run_details.run_version()?))
}
