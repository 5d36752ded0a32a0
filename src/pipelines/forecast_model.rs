//! Feature engineering, training and evaluation on processed data.

use std::sync::Arc;

use crate::config::Config;
use crate::error::PipelineError;
use crate::pipeline::{Pipeline, TaskSpec};
use crate::tasks::forecast_model::{EvaluateModel, FeatureEngineering, PrepareData, TrainMlModel};

pub const FORECAST_MODEL: &str = "forecast_model";

/// Task flags are read from `pipelines.forecast_model.tasks`.
pub fn forecast_model_pipeline(config: Arc<Config>) -> Result<Pipeline, PipelineError> {
    let specs = vec![
        TaskSpec::configured::<FeatureEngineering>(&config, FORECAST_MODEL)?,
        TaskSpec::configured::<PrepareData>(&config, FORECAST_MODEL)?,
        TaskSpec::configured::<TrainMlModel>(&config, FORECAST_MODEL)?,
        TaskSpec::configured::<EvaluateModel>(&config, FORECAST_MODEL)?,
    ];
    Ok(Pipeline::new(FORECAST_MODEL, config, specs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_order_and_flags() {
        let config = Config::from_yaml_str(
            "pipelines:\n  forecast_model:\n    tasks:\n      feature_engineering: true\n      prepare_data: true\n      train_ml_model: false\n      evaluate_model: true\n",
        )
        .unwrap();
        let pipeline = forecast_model_pipeline(Arc::new(config)).unwrap();

        let specs: Vec<_> = pipeline
            .specs()
            .iter()
            .map(|s| (s.name(), s.enabled()))
            .collect();
        assert_eq!(
            specs,
            vec![
                ("feature_engineering", true),
                ("prepare_data", true),
                ("train_ml_model", false),
                ("evaluate_model", true),
            ]
        );
        assert!(pipeline.parameters().contains_key("config"));
    }
}
