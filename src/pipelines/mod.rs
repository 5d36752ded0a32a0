//! Concrete pipelines and the registry that dispatches to them by name.

pub mod data_processing;
pub mod forecast_model;
pub mod registry;

pub use data_processing::{data_processing_pipeline, DATA_PROCESSING};
pub use forecast_model::{forecast_model_pipeline, FORECAST_MODEL};
pub use registry::{
    build_pipeline, category_of, lookup, pipeline_names, run_pipeline, PipelineCategory,
    PipelineEntry, PIPELINES,
};
