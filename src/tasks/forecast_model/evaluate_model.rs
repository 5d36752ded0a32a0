use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{info, warn};

use crate::config::Config;
use crate::error::TaskError;
use crate::model::{AccuracyMetrics, FittedModel, TrainData};
use crate::pipeline::{FromBag, Outputs, ParameterBag, Payload, Task};
use crate::storage::{read_model, read_typed_dict, write_dict, write_figure, Figure};
use crate::tasks::output_location;

use super::prepare_data::TRAIN_DATA_KEY;
use super::train_ml_model::{ML_MODEL_FILE_KEY, MODEL_FIT_KEY};

pub(crate) const FIT_METRICS_KEY: &str = "fit_metrics";
const PRED_VS_ACTUAL_KEY: &str = "pred_vs_actual";

/// Metrics per evaluation mode (`train`, `test`).
pub type FitMetrics = BTreeMap<String, AccuracyMetrics>;

#[derive(Debug, Clone)]
pub struct Evaluation {
    pub metrics: FitMetrics,
    pub figure: Figure,
}

/// Scores the fitted model on both splits.
#[derive(Debug)]
pub struct EvaluateModel {
    config: Arc<Config>,
    model: Option<FittedModel>,
    train_data: Option<TrainData>,
}

impl EvaluateModel {
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            config,
            model: None,
            train_data: None,
        }
    }

    pub fn with_model(mut self, model: FittedModel) -> Self {
        self.model = Some(model);
        self
    }

    pub fn with_train_data(mut self, data: TrainData) -> Self {
        self.train_data = Some(data);
        self
    }
}

impl Task for EvaluateModel {
    type Inputs = (FittedModel, TrainData);
    type Output = Evaluation;

    fn name(&self) -> &str {
        Self::NAME
    }

    fn load_inputs(&mut self) -> Result<Self::Inputs, TaskError> {
        let output = self.config.data.output();
        let model = match self.model.take() {
            Some(model) => model,
            None => {
                info!("Loading model fit");
                read_model(&output_location(&self.config, output.model(ML_MODEL_FILE_KEY)?)?)?
            }
        };
        let train_data = match self.train_data.take() {
            Some(data) => data,
            None => {
                info!("Loading training data dict");
                read_typed_dict(&output_location(&self.config, output.dict(TRAIN_DATA_KEY)?)?)?
            }
        };
        Ok((model, train_data))
    }

    fn process(&mut self, (model, data): Self::Inputs) -> Result<Evaluation, TaskError> {
        info!("Predicting on train and test sets");
        let y_train_pred = model.predict(data.x_train()?.view())?.to_vec();
        let y_test_pred = model.predict(data.x_test()?.view())?.to_vec();

        info!("Calculating fit metrics");
        let mut metrics = FitMetrics::new();
        for (mode, truth, predicted) in [
            ("train", &data.y_train, &y_train_pred),
            ("test", &data.y_test, &y_test_pred),
        ] {
            let accuracy = AccuracyMetrics::compute(truth, predicted);
            warn!(
                mode,
                r2 = accuracy.r2,
                mae = accuracy.mae,
                mape = accuracy.mape,
                bias = accuracy.bias,
                "Model fit metrics"
            );
            metrics.insert(mode.to_string(), accuracy);
        }

        let figure = Figure::predicted_vs_actual(
            &format!("{} predicted vs actual: {}", model.kind, data.target),
            &[
                ("train", data.y_train.as_slice(), y_train_pred.as_slice()),
                ("test", data.y_test.as_slice(), y_test_pred.as_slice()),
            ],
        );
        Ok(Evaluation { metrics, figure })
    }

    fn save_results(&mut self, evaluation: &Evaluation) -> Result<(), TaskError> {
        let output = self.config.data.output();

        info!("Writing fit metrics to file");
        let location = output_location(&self.config, output.dict(FIT_METRICS_KEY)?)?;
        write_dict(&location, &evaluation.metrics)?;

        if let Some(file_name) = output.figure(PRED_VS_ACTUAL_KEY) {
            info!("Writing predicted vs actual figure");
            write_figure(&output_location(&self.config, file_name)?, &evaluation.figure)?;
        }
        Ok(())
    }

    fn into_outputs(self, evaluation: Evaluation) -> Outputs {
        let metrics = evaluation
            .metrics
            .into_iter()
            .map(|(mode, accuracy)| (mode, metrics_json(&accuracy)))
            .collect::<serde_json::Map<_, _>>();

        let mut outputs = Outputs::new();
        outputs.insert(
            FIT_METRICS_KEY.to_string(),
            Payload::Dict(serde_json::Value::Object(metrics)),
        );
        outputs
    }
}

fn metrics_json(accuracy: &AccuracyMetrics) -> serde_json::Value {
    serde_json::json!({
        "r2": accuracy.r2,
        "mae": accuracy.mae,
        "mape": accuracy.mape,
        "bias": accuracy.bias,
    })
}

impl FromBag for EvaluateModel {
    const NAME: &'static str = "evaluate_model";

    fn from_bag(bag: &ParameterBag) -> Result<Self, TaskError> {
        let mut task = Self::new(bag.config()?);
        if let Some(model) = bag.model(MODEL_FIT_KEY)? {
            task = task.with_model(model);
        }
        if let Some(data) = bag.train_data(TRAIN_DATA_KEY)? {
            task = task.with_train_data(data);
        }
        Ok(task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ModelKind, ModelParams};
    use crate::storage::{read_dict, DataLocation};
    use crate::tasks::test_support;
    use ndarray::{array, Array1};
    use tempfile::TempDir;

    fn exact_fit() -> (FittedModel, TrainData) {
        let x = array![[0.0], [1.0], [2.0], [3.0], [4.0], [5.0]];
        let y: Array1<f64> = x.column(0).mapv(|v| 2.0 * v + 1.0);
        let model = FittedModel::fit(
            ModelKind::LinReg,
            ModelParams::defaults(ModelKind::LinReg, 0),
            x.view(),
            y.view(),
        )
        .unwrap();
        let data = TrainData {
            feature_names: vec!["x".to_string()],
            target: "y".to_string(),
            x_train: vec![vec![0.0], vec![1.0], vec![2.0], vec![3.0]],
            x_test: vec![vec![4.0], vec![5.0]],
            y_train: vec![1.0, 3.0, 5.0, 7.0],
            y_test: vec![9.0, 11.0],
        };
        (model, data)
    }

    fn run_dir(dir: &TempDir) -> std::path::PathBuf {
        dir.path().join("output/forecast_model/20240301_120000")
    }

    #[test]
    fn test_metrics_saved_and_figure_rendered() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let config = Arc::new(test_support::config(dir.path(), "forecast_model"));
        let (model, data) = exact_fit();

        let task = EvaluateModel::new(config)
            .with_model(model)
            .with_train_data(data);
        let outputs = Task::run(task).unwrap();

        let Some(Payload::Dict(metrics)) = outputs.get(FIT_METRICS_KEY) else {
            panic!("fit_metrics should be a dict");
        };
        for mode in ["train", "test"] {
            let r2 = metrics[mode]["r2"].as_f64().unwrap();
            assert!((r2 - 1.0).abs() < 1e-9, "{mode} r2 was {r2}");
            assert!(metrics[mode]["mae"].as_f64().unwrap() < 1e-9);
        }

        let saved = read_dict(
            &DataLocation::new(dir.path().join("output"), "fit_metrics.json")
                .with_pipeline("forecast_model")
                .with_time_connector("20240301_120000"),
        )
        .unwrap();
        assert_eq!(&saved, metrics);

        let svg = std::fs::read_to_string(run_dir(&dir).join("pred_vs_actual.svg")).unwrap();
        assert!(svg.starts_with("<svg"));
    }

    #[test]
    fn test_figure_skipped_when_not_configured() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let mut config = test_support::config(dir.path(), "forecast_model");
        config.data.output_data.figures.clear();
        let (model, data) = exact_fit();

        let task = EvaluateModel::new(Arc::new(config))
            .with_model(model)
            .with_train_data(data);
        Task::run(task).unwrap();

        assert!(run_dir(&dir).join("fit_metrics.json").is_file());
        assert!(!run_dir(&dir).join("pred_vs_actual.svg").exists());
    }

    #[test]
    fn test_loads_inputs_from_disk() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let config = Arc::new(test_support::config(dir.path(), "forecast_model"));

        let bag = ParameterBag::seeded(Arc::clone(&config));
        let err = Task::run(EvaluateModel::from_bag(&bag).unwrap()).unwrap_err();
        assert!(matches!(err, TaskError::Storage(_)), "got {err:?}");
    }
}
