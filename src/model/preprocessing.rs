//! Train/test splitting, feature scaling and the serialized training set.

use ndarray::{Array1, Array2, ArrayView2, Axis};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// Shuffles `0..n` with a seeded ChaCha8 stream and splits it.
///
/// The test set takes `ceil(n * test_size)` rows; returns `(train, test)`.
pub fn train_test_split(n: usize, test_size: f64, seed: u64) -> (Vec<usize>, Vec<usize>) {
    let n_test = ((n as f64) * test_size).ceil() as usize;
    let n_test = n_test.min(n);

    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let train = indices.split_off(n_test);
    (train, indices)
}

/// Standardizes features to zero mean and unit variance.
#[derive(Debug, Clone, PartialEq)]
pub struct StandardScaler {
    mean: Array1<f64>,
    scale: Array1<f64>,
}

impl StandardScaler {
    /// Fits on `x` using the population variance; constant columns get scale 1.
    pub fn fit(x: ArrayView2<'_, f64>) -> Result<Self, ModelError> {
        let mean = x.mean_axis(Axis(0)).ok_or(ModelError::EmptyTrainingSet)?;
        let scale = x
            .var_axis(Axis(0), 0.0)
            .mapv(|v| if v > 0.0 { v.sqrt() } else { 1.0 });
        Ok(Self { mean, scale })
    }

    pub fn transform(&self, x: ArrayView2<'_, f64>) -> Result<Array2<f64>, ModelError> {
        if x.ncols() != self.mean.len() {
            return Err(ModelError::DimensionMismatch {
                expected: self.mean.len(),
                actual: x.ncols(),
            });
        }
        Ok((&x - &self.mean) / &self.scale)
    }

    pub fn mean(&self) -> &Array1<f64> {
        &self.mean
    }

    pub fn scale(&self) -> &Array1<f64> {
        &self.scale
    }
}

/// Scaled train/test matrices for a tabular regressor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainData {
    pub feature_names: Vec<String>,
    pub target: String,
    pub x_train: Vec<Vec<f64>>,
    pub x_test: Vec<Vec<f64>>,
    pub y_train: Vec<f64>,
    pub y_test: Vec<f64>,
}

impl TrainData {
    pub fn x_train(&self) -> Result<Array2<f64>, ModelError> {
        rows_to_array(&self.x_train, self.feature_names.len())
    }

    pub fn x_test(&self) -> Result<Array2<f64>, ModelError> {
        rows_to_array(&self.x_test, self.feature_names.len())
    }

    pub fn n_train(&self) -> usize {
        self.y_train.len()
    }

    pub fn n_test(&self) -> usize {
        self.y_test.len()
    }
}

pub fn rows_to_array(rows: &[Vec<f64>], n_cols: usize) -> Result<Array2<f64>, ModelError> {
    let mut flat = Vec::with_capacity(rows.len() * n_cols);
    for row in rows {
        if row.len() != n_cols {
            return Err(ModelError::DimensionMismatch {
                expected: n_cols,
                actual: row.len(),
            });
        }
        flat.extend_from_slice(row);
    }
    Array2::from_shape_vec((rows.len(), n_cols), flat).map_err(|_| ModelError::DimensionMismatch {
        expected: rows.len() * n_cols,
        actual: rows.len() * n_cols,
    })
}

pub fn array_to_rows(x: ArrayView2<'_, f64>) -> Vec<Vec<f64>> {
    x.rows().into_iter().map(|row| row.to_vec()).collect()
}
