use std::sync::Arc;

use ndarray::Array1;
use tracing::info;

use crate::config::Config;
use crate::error::TaskError;
use crate::model::{FittedModel, ModelKind, RandomizedSearch, Scoring, TrainData};
use crate::pipeline::{FromBag, Outputs, ParameterBag, Payload, Task};
use crate::storage::{read_typed_dict, write_model};
use crate::tasks::output_location;

use super::prepare_data::TRAIN_DATA_KEY;

pub(crate) const MODEL_FIT_KEY: &str = "model_fit";
pub(crate) const ML_MODEL_FILE_KEY: &str = "ml_model";

/// Tunes and fits the configured regressor on the training split.
#[derive(Debug)]
pub struct TrainMlModel {
    config: Arc<Config>,
    train_data: Option<TrainData>,
}

impl TrainMlModel {
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            config,
            train_data: None,
        }
    }

    pub fn with_train_data(mut self, data: TrainData) -> Self {
        self.train_data = Some(data);
        self
    }
}

impl Task for TrainMlModel {
    type Inputs = TrainData;
    type Output = FittedModel;

    fn name(&self) -> &str {
        Self::NAME
    }

    fn load_inputs(&mut self) -> Result<TrainData, TaskError> {
        if let Some(data) = self.train_data.take() {
            return Ok(data);
        }
        info!("Loading training data dict");
        let location =
            output_location(&self.config, self.config.data.output().dict(TRAIN_DATA_KEY)?)?;
        Ok(read_typed_dict(&location)?)
    }

    fn process(&mut self, data: TrainData) -> Result<FittedModel, TaskError> {
        let settings = &self.config.forecast_model.ml_model;
        let model_name = settings.model_name()?;
        let kind = ModelKind::from_name(model_name)
            .ok_or_else(|| TaskError::UnsupportedModel(model_name.to_string()))?;
        let hyperparameters = &settings.hyperparameters;
        let space = hyperparameters
            .search_spaces
            .get(model_name)
            .cloned()
            .unwrap_or_default();

        info!(model = %kind, "Hyperparameter tuning");
        let search = RandomizedSearch::new(kind, space)
            .with_scoring(Scoring::from_name(&settings.scoring)?)
            .with_n_iter(hyperparameters.n_iter)
            .with_cv_splits(hyperparameters.cv_splits)
            .with_random_state(settings.random_state);
        let x_train = data.x_train()?;
        let y_train = Array1::from_vec(data.y_train.clone());
        let result = search.fit(&x_train, &y_train)?;

        info!(
            model = %kind,
            params = ?result.best_params,
            score = result.best_score,
            evaluated = result.evaluated,
            "Fitted machine learning model"
        );
        Ok(result.model.with_feature_names(data.feature_names))
    }

    fn save_results(&mut self, model: &FittedModel) -> Result<(), TaskError> {
        info!("Writing model fit to file");
        let location =
            output_location(&self.config, self.config.data.output().model(ML_MODEL_FILE_KEY)?)?;
        write_model(&location, model)?;
        Ok(())
    }

    fn into_outputs(self, model: FittedModel) -> Outputs {
        let mut outputs = Outputs::new();
        outputs.insert(MODEL_FIT_KEY.to_string(), Payload::Model(model));
        outputs
    }
}

impl FromBag for TrainMlModel {
    const NAME: &'static str = "train_ml_model";

    fn from_bag(bag: &ParameterBag) -> Result<Self, TaskError> {
        let task = Self::new(bag.config()?);
        Ok(match bag.train_data(TRAIN_DATA_KEY)? {
            Some(data) => task.with_train_data(data),
            None => task,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{read_model, DataLocation};
    use crate::tasks::test_support;
    use serde_json::json;
    use tempfile::TempDir;

    /// y = 3·a - 2·b + 5 on a small grid.
    fn linear_data() -> TrainData {
        let mut x = Vec::new();
        let mut y = Vec::new();
        for a in 0..6 {
            for b in 0..4 {
                let (a, b) = (a as f64, b as f64 * 1.5);
                x.push(vec![a, b]);
                y.push(3.0 * a - 2.0 * b + 5.0);
            }
        }
        TrainData {
            feature_names: vec!["a".to_string(), "b".to_string()],
            target: "y".to_string(),
            x_test: x[..4].to_vec(),
            y_test: y[..4].to_vec(),
            x_train: x,
            y_train: y,
        }
    }

    #[test]
    fn test_fits_and_saves_model() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let config = Arc::new(test_support::config(dir.path(), "forecast_model"));

        let task = TrainMlModel::new(config).with_train_data(linear_data());
        let outputs = Task::run(task).unwrap();
        let Some(Payload::Model(model)) = outputs.get(MODEL_FIT_KEY) else {
            panic!("model_fit should be a model");
        };

        assert_eq!(model.kind, ModelKind::Ridge);
        assert_eq!(model.feature_names, vec!["a", "b"]);
        assert!(model.cv_score.is_some());
        let fit = model.linear().expect("ridge is linear");
        assert!((fit.coefficients[0] - 3.0).abs() < 0.05);
        assert!((fit.coefficients[1] + 2.0).abs() < 0.05);

        let saved: FittedModel = read_model(
            &DataLocation::new(dir.path().join("output"), "ml_model.json")
                .with_pipeline("forecast_model")
                .with_time_connector("20240301_120000"),
        )
        .unwrap();
        assert_eq!(&saved, model);
    }

    #[test]
    fn test_unknown_model_name() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let mut config = test_support::config(dir.path(), "forecast_model");
        config.forecast_model.ml_model.model_name = Some("xgboost".to_string());

        let err = TrainMlModel::new(Arc::new(config))
            .process(linear_data())
            .unwrap_err();
        assert!(matches!(err, TaskError::UnsupportedModel(ref name) if name == "xgboost"));
    }

    #[test]
    fn test_unknown_scoring() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let mut config = test_support::config(dir.path(), "forecast_model");
        config.forecast_model.ml_model.scoring = "accuracy".to_string();

        let err = TrainMlModel::new(Arc::new(config))
            .process(linear_data())
            .unwrap_err();
        assert!(matches!(err, TaskError::Model(_)), "got {err:?}");
    }

    #[test]
    fn test_lin_reg_without_search_space() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let mut config = test_support::config(dir.path(), "forecast_model");
        config.forecast_model.ml_model.model_name = Some("lin_reg".to_string());

        let model = TrainMlModel::new(Arc::new(config))
            .process(linear_data())
            .unwrap();
        assert_eq!(model.kind, ModelKind::LinReg);
        assert!((model.linear().expect("linear").intercept - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_random_forest_search_and_fit() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let mut config = test_support::config(dir.path(), "forecast_model");
        let ml_model = &mut config.forecast_model.ml_model;
        ml_model.model_name = Some("random_forest".to_string());
        ml_model.hyperparameters.search_spaces.insert(
            "random_forest".to_string(),
            [
                ("n_estimators".to_string(), vec![json!(5), json!(20)]),
                ("max_depth".to_string(), vec![json!(4), json!(null)]),
            ]
            .into_iter()
            .collect(),
        );

        let data = linear_data();
        let model = TrainMlModel::new(Arc::new(config))
            .process(data.clone())
            .unwrap();
        assert_eq!(model.kind, ModelKind::RandomForest);
        assert!(model.linear().is_none());
        assert!(model.cv_score.is_some());

        let pred = model.predict(data.x_train().unwrap().view()).unwrap();
        let r2 = crate::model::metrics::r2_score(&data.y_train, &pred.to_vec());
        assert!(r2 > 0.9, "trees fit the training grid, r2 = {r2}");
    }
}
