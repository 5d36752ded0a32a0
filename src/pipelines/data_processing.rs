//! Raw-to-processed data pipeline.

use std::sync::Arc;

use crate::config::Config;
use crate::error::PipelineError;
use crate::pipeline::{Pipeline, TaskSpec};
use crate::tasks::data_processing::ProcessDummyData;

pub const DATA_PROCESSING: &str = "data_processing";

/// Task flags are read from `pipelines.data_processing.tasks`.
pub fn data_processing_pipeline(config: Arc<Config>) -> Result<Pipeline, PipelineError> {
    let specs = vec![TaskSpec::configured::<ProcessDummyData>(&config, DATA_PROCESSING)?];
    Ok(Pipeline::new(DATA_PROCESSING, config, specs))
}
