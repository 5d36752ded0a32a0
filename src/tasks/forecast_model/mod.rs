//! Tasks of the `forecast_model` pipeline, in execution order.

mod evaluate_model;
mod feature_engineering;
mod prepare_data;
mod train_ml_model;

pub use evaluate_model::{EvaluateModel, Evaluation, FitMetrics};
pub use feature_engineering::{single_point_haversine, FeatureEngineering};
pub use prepare_data::PrepareData;
pub use train_ml_model::TrainMlModel;
