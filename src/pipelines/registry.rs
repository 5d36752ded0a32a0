//! Static table of known pipelines.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::Config;
use crate::error::PipelineError;
use crate::pipeline::{Outputs, Pipeline};

use super::data_processing::{data_processing_pipeline, DATA_PROCESSING};
use super::forecast_model::{forecast_model_pipeline, FORECAST_MODEL};

/// Whether a pipeline produces processed data or consumes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineCategory {
    DataProcessing,
    ForecastModel,
}

impl PipelineCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineCategory::DataProcessing => "data_processing",
            PipelineCategory::ForecastModel => "forecast_model",
        }
    }
}

impl fmt::Display for PipelineCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A registered pipeline.
pub struct PipelineEntry {
    pub name: &'static str,
    pub category: PipelineCategory,
    pub build: fn(Arc<Config>) -> Result<Pipeline, PipelineError>,
}

impl fmt::Debug for PipelineEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineEntry")
            .field("name", &self.name)
            .field("category", &self.category)
            .finish_non_exhaustive()
    }
}

pub static PIPELINES: &[PipelineEntry] = &[
    PipelineEntry {
        name: DATA_PROCESSING,
        category: PipelineCategory::DataProcessing,
        build: data_processing_pipeline,
    },
    PipelineEntry {
        name: FORECAST_MODEL,
        category: PipelineCategory::ForecastModel,
        build: forecast_model_pipeline,
    },
];

pub fn lookup(name: &str) -> Option<&'static PipelineEntry> {
    PIPELINES.iter().find(|entry| entry.name == name)
}

pub fn category_of(name: &str) -> Option<PipelineCategory> {
    lookup(name).map(|entry| entry.category)
}

pub fn pipeline_names() -> impl Iterator<Item = &'static str> {
    PIPELINES.iter().map(|entry| entry.name)
}

/// Builds the named pipeline; unknown names are not implemented.
pub fn build_pipeline(name: &str, config: Arc<Config>) -> Result<Pipeline, PipelineError> {
    let entry = lookup(name).ok_or_else(|| PipelineError::NotImplemented(name.to_string()))?;
    (entry.build)(config)
}

/// Builds and runs the named pipeline end to end.
pub fn run_pipeline(name: &str, config: Arc<Config>) -> Result<Outputs, PipelineError> {
    let mut pipeline = build_pipeline(name, config)?;
    let outputs = pipeline.run()?;

    let total_ms: u64 = pipeline.timings().iter().map(|t| t.duration_ms).sum();
    info!(
        pipeline = name,
        tasks = pipeline.timings().len(),
        duration_ms = total_ms,
        "Pipeline completed"
    );
    Ok(outputs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories() {
        assert_eq!(category_of("data_processing"), Some(PipelineCategory::DataProcessing));
        assert_eq!(category_of("forecast_model"), Some(PipelineCategory::ForecastModel));
        assert_eq!(category_of("training"), None);
        assert_eq!(PipelineCategory::ForecastModel.to_string(), "forecast_model");
    }

    #[test]
    fn test_names_are_unique() {
        let mut names: Vec<_> = pipeline_names().collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), PIPELINES.len());
    }

    #[test]
    fn test_unknown_pipeline_is_not_implemented() {
        let err = build_pipeline("training", Arc::new(Config::default())).unwrap_err();
        assert!(matches!(err, PipelineError::NotImplemented(ref name) if name == "training"));
    }

    #[test]
    fn test_missing_task_flags_fail_construction() {
        let err = build_pipeline("forecast_model", Arc::new(Config::default())).unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }
}
