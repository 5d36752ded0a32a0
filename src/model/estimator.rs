//! The fitted model handed between training and evaluation.

use std::collections::BTreeMap;
use std::fmt;

use ndarray::{Array1, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::error::ModelError;

use super::forest::{ForestParams, RandomForest};
use super::linear::{LinearFit, LinearParams};

/// Supported regressors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    /// Ordinary least squares.
    LinReg,
    /// L2-penalized least squares.
    Ridge,
    /// Bagged regression trees.
    RandomForest,
}

impl ModelKind {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "lin_reg" => Some(Self::LinReg),
            "ridge" => Some(Self::Ridge),
            "random_forest" => Some(Self::RandomForest),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::LinReg => "lin_reg",
            Self::Ridge => "ridge",
            Self::RandomForest => "random_forest",
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Hyperparameters for one of the [`ModelKind`]s.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelParams {
    Linear(LinearParams),
    Forest(ForestParams),
}

impl ModelParams {
    pub fn defaults(kind: ModelKind, random_state: u64) -> Self {
        match kind {
            ModelKind::LinReg | ModelKind::Ridge => Self::Linear(LinearParams::defaults(kind)),
            ModelKind::RandomForest => Self::Forest(ForestParams::defaults(random_state)),
        }
    }

    /// Builds parameters from a search candidate; `random_state` seeds
    /// models that draw random numbers.
    pub fn from_map(
        kind: ModelKind,
        values: &BTreeMap<String, serde_json::Value>,
        random_state: u64,
    ) -> Result<Self, ModelError> {
        Ok(match kind {
            ModelKind::LinReg | ModelKind::Ridge => {
                Self::Linear(LinearParams::from_map(kind, values)?)
            }
            ModelKind::RandomForest => Self::Forest(ForestParams::from_map(values, random_state)?),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Estimator {
    Linear(LinearFit),
    Forest(RandomForest),
}

/// A fitted regressor plus what it was trained on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedModel {
    pub kind: ModelKind,
    pub params: ModelParams,
    #[serde(default)]
    pub feature_names: Vec<String>,
    pub estimator: Estimator,
    /// Mean cross-validation score of the chosen parameters, when tuned.
    #[serde(default)]
    pub cv_score: Option<f64>,
}

impl FittedModel {
    /// Fits `kind` on `x` (rows are samples) and `y`.
    pub fn fit(
        kind: ModelKind,
        params: ModelParams,
        x: ArrayView2<'_, f64>,
        y: ArrayView1<'_, f64>,
    ) -> Result<Self, ModelError> {
        let estimator = match (kind, &params) {
            (ModelKind::LinReg | ModelKind::Ridge, ModelParams::Linear(p)) => {
                Estimator::Linear(LinearFit::fit(p, x, y)?)
            }
            (ModelKind::RandomForest, ModelParams::Forest(p)) => {
                Estimator::Forest(RandomForest::fit(p, x, y)?)
            }
            _ => {
                return Err(ModelError::InvalidHyperparameter {
                    name: kind.name().to_string(),
                    reason: "parameters belong to a different model".to_string(),
                })
            }
        };
        Ok(Self {
            kind,
            params,
            feature_names: Vec::new(),
            estimator,
            cv_score: None,
        })
    }

    pub fn with_feature_names(mut self, names: Vec<String>) -> Self {
        self.feature_names = names;
        self
    }

    pub fn with_cv_score(mut self, score: f64) -> Self {
        self.cv_score = Some(score);
        self
    }

    pub fn n_features(&self) -> usize {
        match &self.estimator {
            Estimator::Linear(fit) => fit.n_features(),
            Estimator::Forest(forest) => forest.n_features,
        }
    }

    /// Coefficients and intercept, for linear models.
    pub fn linear(&self) -> Option<&LinearFit> {
        match &self.estimator {
            Estimator::Linear(fit) => Some(fit),
            Estimator::Forest(_) => None,
        }
    }

    pub fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Array1<f64>, ModelError> {
        if x.ncols() != self.n_features() {
            return Err(ModelError::DimensionMismatch {
                expected: self.n_features(),
                actual: x.ncols(),
            });
        }
        Ok(match &self.estimator {
            Estimator::Linear(fit) => fit.predict(x),
            Estimator::Forest(forest) => forest.predict(x),
        })
    }
}
