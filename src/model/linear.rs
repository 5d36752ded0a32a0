//! Linear regressors solved through the normal equations.

use std::collections::BTreeMap;

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use crate::error::ModelError;

use super::estimator::ModelKind;

/// Relative pivot size below which the system is treated as singular.
const SINGULAR_TOLERANCE: f64 = 1e-12;

/// Hyperparameters shared by the linear regressors.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinearParams {
    pub alpha: f64,
    pub fit_intercept: bool,
}

impl LinearParams {
    pub fn defaults(kind: ModelKind) -> Self {
        Self {
            alpha: match kind {
                ModelKind::Ridge => 1.0,
                _ => 0.0,
            },
            fit_intercept: true,
        }
    }

    /// Builds parameters from a search candidate, starting from the defaults.
    pub fn from_map(
        kind: ModelKind,
        values: &BTreeMap<String, serde_json::Value>,
    ) -> Result<Self, ModelError> {
        let mut params = Self::defaults(kind);
        for (name, value) in values {
            match (kind, name.as_str()) {
                (_, "fit_intercept") => {
                    params.fit_intercept = value.as_bool().ok_or_else(|| {
                        ModelError::InvalidHyperparameter {
                            name: name.clone(),
                            reason: format!("expected a boolean, got {value}"),
                        }
                    })?;
                }
                (ModelKind::Ridge, "alpha") => {
                    let alpha = value.as_f64().filter(|a| *a >= 0.0).ok_or_else(|| {
                        ModelError::InvalidHyperparameter {
                            name: name.clone(),
                            reason: format!("expected a non-negative number, got {value}"),
                        }
                    })?;
                    params.alpha = alpha;
                }
                _ => {
                    return Err(ModelError::InvalidHyperparameter {
                        name: name.clone(),
                        reason: format!("not a parameter of {kind}"),
                    })
                }
            }
        }
        Ok(params)
    }
}

/// Coefficients of a fitted linear model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearFit {
    pub coefficients: Vec<f64>,
    pub intercept: f64,
}

impl LinearFit {
    /// Fits on `x` (rows are samples) and `y`.
    pub fn fit(
        params: &LinearParams,
        x: ArrayView2<'_, f64>,
        y: ArrayView1<'_, f64>,
    ) -> Result<Self, ModelError> {
        let (n_samples, n_features) = x.dim();
        if n_samples == 0 {
            return Err(ModelError::EmptyTrainingSet);
        }
        if y.len() != n_samples {
            return Err(ModelError::DimensionMismatch {
                expected: n_samples,
                actual: y.len(),
            });
        }

        let (x_offset, y_offset) = if params.fit_intercept {
            (
                x.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(n_features)),
                y.mean().unwrap_or(0.0),
            )
        } else {
            (Array1::zeros(n_features), 0.0)
        };
        let xc = &x - &x_offset;
        let yc = &y - y_offset;

        let mut gram = xc.t().dot(&xc);
        for i in 0..n_features {
            gram[[i, i]] += params.alpha;
        }
        let rhs = xc.t().dot(&yc);
        let coefficients = solve(gram, rhs)?;
        let intercept = y_offset - x_offset.dot(&coefficients);

        Ok(Self {
            coefficients: coefficients.to_vec(),
            intercept,
        })
    }

    pub fn n_features(&self) -> usize {
        self.coefficients.len()
    }

    pub fn predict(&self, x: ArrayView2<'_, f64>) -> Array1<f64> {
        let coefficients = ArrayView1::from(self.coefficients.as_slice());
        x.dot(&coefficients) + self.intercept
    }
}

/// Solves `a · x = b` by Gaussian elimination with partial pivoting.
fn solve(mut a: Array2<f64>, mut b: Array1<f64>) -> Result<Array1<f64>, ModelError> {
    let n = b.len();
    let scale = a.iter().fold(0.0_f64, |m, v| m.max(v.abs())).max(1.0);

    for col in 0..n {
        let pivot = (col..n)
            .max_by(|&i, &j| a[[i, col]].abs().total_cmp(&a[[j, col]].abs()))
            .unwrap_or(col);
        if a[[pivot, col]].abs() <= SINGULAR_TOLERANCE * scale {
            return Err(ModelError::Singular);
        }
        if pivot != col {
            for k in 0..n {
                a.swap([col, k], [pivot, k]);
            }
            b.swap(col, pivot);
        }

        for row in col + 1..n {
            let factor = a[[row, col]] / a[[col, col]];
            if factor == 0.0 {
                continue;
            }
            for k in col..n {
                a[[row, k]] -= factor * a[[col, k]];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = Array1::zeros(n);
    for row in (0..n).rev() {
        let tail: f64 = (row + 1..n).map(|k| a[[row, k]] * x[k]).sum();
        x[row] = (b[row] - tail) / a[[row, row]];
    }
    Ok(x)
}
