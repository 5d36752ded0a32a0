use std::sync::Arc;

use ndarray::Array2;
use tracing::{info, warn};

use crate::config::{Config, ConfigError};
use crate::error::{ModelError, TaskError};
use crate::model::preprocessing::{array_to_rows, rows_to_array};
use crate::model::{train_test_split, StandardScaler, TrainData};
use crate::pipeline::{FromBag, Outputs, ParameterBag, Payload, Task};
use crate::storage::{read_table, write_dict, Table};
use crate::tasks::output_location;

use super::feature_engineering::FEATURE_DATA_KEY;

pub(crate) const TRAIN_DATA_KEY: &str = "train_data";

/// Complete rows of the selected columns, plus how many were dropped.
fn complete_rows(table: &Table, columns: &[String]) -> Result<(Vec<Vec<f64>>, usize), TaskError> {
    let values = columns
        .iter()
        .map(|name| table.float_values(name))
        .collect::<Result<Vec<_>, _>>()?;

    let mut rows = Vec::with_capacity(table.n_rows());
    for row in 0..table.n_rows() {
        let cells: Option<Vec<f64>> = values.iter().map(|column| column[row]).collect();
        if let Some(cells) = cells {
            rows.push(cells);
        }
    }
    let dropped = table.n_rows() - rows.len();
    Ok((rows, dropped))
}

/// Splits and scales the feature table into model-ready train/test sets.
#[derive(Debug)]
pub struct PrepareData {
    config: Arc<Config>,
    feature_data: Option<Table>,
}

impl PrepareData {
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            config,
            feature_data: None,
        }
    }

    /// Uses `table` instead of reading the feature table from disk.
    pub fn with_feature_data(mut self, table: Table) -> Self {
        self.feature_data = Some(table);
        self
    }

    fn format_output(&self, train_data: TrainData) -> Result<TrainData, TaskError> {
        match self.config.forecast_model.model_type.as_str() {
            "ml_model" => Ok(train_data),
            other => Err(TaskError::UnsupportedModelType(other.to_string())),
        }
    }
}

impl Task for PrepareData {
    type Inputs = Table;
    type Output = TrainData;

    fn name(&self) -> &str {
        Self::NAME
    }

    fn load_inputs(&mut self) -> Result<Table, TaskError> {
        if let Some(table) = self.feature_data.take() {
            return Ok(table);
        }
        info!("Loading feature data table");
        let location =
            output_location(&self.config, self.config.data.output().table(FEATURE_DATA_KEY)?)?;
        Ok(read_table(&location)?)
    }

    fn process(&mut self, table: Table) -> Result<TrainData, TaskError> {
        let settings = &self.config.forecast_model;
        let target = settings.target()?.to_string();
        let features = settings.features.numeric.clone();
        if features.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "forecast_model.features.numeric".to_string(),
                message: "at least one feature is required".to_string(),
            }
            .into());
        }
        if !settings.features.categorical.is_empty() {
            warn!(
                features = ?settings.features.categorical,
                "Categorical features are not encoded and will be ignored"
            );
        }

        info!(features = ?features, target = %target, "Selecting feature variables");
        let mut columns = features.clone();
        columns.push(target.clone());
        let (rows, dropped) = complete_rows(&table, &columns)?;
        if dropped > 0 {
            warn!(dropped, kept = rows.len(), "Dropped rows with missing values");
        }
        if rows.is_empty() {
            return Err(ModelError::EmptyTrainingSet.into());
        }

        info!(test_size = settings.test_size, "Splitting into train and test sets");
        let (train_idx, test_idx) =
            train_test_split(rows.len(), settings.test_size, settings.random_state);
        let n_features = features.len();
        let split = |indices: &[usize]| -> Result<(Array2<f64>, Vec<f64>), ModelError> {
            let x: Vec<Vec<f64>> = indices.iter().map(|&i| rows[i][..n_features].to_vec()).collect();
            let y = indices.iter().map(|&i| rows[i][n_features]).collect();
            Ok((rows_to_array(&x, n_features)?, y))
        };
        let (x_train, y_train) = split(&train_idx)?;
        let (x_test, y_test) = split(&test_idx)?;

        info!("Scaling numeric predictor variables");
        let scaler = StandardScaler::fit(x_train.view())?;
        let x_train = scaler.transform(x_train.view())?;
        let x_test = scaler.transform(x_test.view())?;

        info!(
            model_type = %settings.model_type,
            train = y_train.len(),
            test = y_test.len(),
            "Formatting output for model type"
        );
        self.format_output(TrainData {
            feature_names: features,
            target,
            x_train: array_to_rows(x_train.view()),
            x_test: array_to_rows(x_test.view()),
            y_train,
            y_test,
        })
    }

    fn save_results(&mut self, train_data: &TrainData) -> Result<(), TaskError> {
        info!("Writing training data dict to file");
        let location =
            output_location(&self.config, self.config.data.output().dict(TRAIN_DATA_KEY)?)?;
        write_dict(&location, train_data)?;
        Ok(())
    }

    fn into_outputs(self, train_data: TrainData) -> Outputs {
        let mut outputs = Outputs::new();
        outputs.insert(TRAIN_DATA_KEY.to_string(), Payload::TrainData(train_data));
        outputs
    }
}

impl FromBag for PrepareData {
    const NAME: &'static str = "prepare_data";

    fn from_bag(bag: &ParameterBag) -> Result<Self, TaskError> {
        let task = Self::new(bag.config()?);
        Ok(match bag.table(FEATURE_DATA_KEY)? {
            Some(table) => task.with_feature_data(table),
            None => task,
        })
    }
}
