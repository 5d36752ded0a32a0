//! Randomized hyperparameter search with K-fold cross-validation.

use std::collections::BTreeMap;
use std::fmt;

use ndarray::{Array1, Array2, Axis};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info};

use crate::error::ModelError;

use super::estimator::{FittedModel, ModelKind, ModelParams};
use super::metrics::{mean_absolute_error, r2_score};

/// One point of the search space.
pub type Candidate = BTreeMap<String, serde_json::Value>;

/// Cross-validation score; higher is better.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scoring {
    R2,
    NegMeanAbsoluteError,
}

impl Scoring {
    pub fn from_name(name: &str) -> Result<Self, ModelError> {
        match name {
            "r2" => Ok(Self::R2),
            "neg_mean_absolute_error" => Ok(Self::NegMeanAbsoluteError),
            other => Err(ModelError::UnsupportedScoring(other.to_string())),
        }
    }

    pub fn score(&self, y_true: &[f64], y_pred: &[f64]) -> f64 {
        match self {
            Self::R2 => r2_score(y_true, y_pred),
            Self::NegMeanAbsoluteError => -mean_absolute_error(y_true, y_pred),
        }
    }
}

impl fmt::Display for Scoring {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::R2 => write!(f, "r2"),
            Self::NegMeanAbsoluteError => write!(f, "neg_mean_absolute_error"),
        }
    }
}

/// Every combination of the listed values, in key then value order.
///
/// An empty space yields a single empty candidate.
pub fn parameter_grid(space: &BTreeMap<String, Vec<serde_json::Value>>) -> Vec<Candidate> {
    let mut grid = vec![Candidate::new()];
    for (name, values) in space {
        grid = grid
            .into_iter()
            .flat_map(|candidate| {
                values.iter().map(move |value| {
                    let mut next = candidate.clone();
                    next.insert(name.clone(), value.clone());
                    next
                })
            })
            .collect();
    }
    grid
}

/// Contiguous, unshuffled folds; the first `n % k` folds get one extra row.
///
/// Returns `(train, validation)` index pairs.
pub fn kfold_indices(n: usize, k: usize) -> Result<Vec<(Vec<usize>, Vec<usize>)>, ModelError> {
    if k < 2 || k > n {
        return Err(ModelError::InvalidFolds {
            samples: n,
            splits: k,
        });
    }
    let mut folds = Vec::with_capacity(k);
    let mut start = 0;
    for fold in 0..k {
        let size = n / k + usize::from(fold < n % k);
        let validation: Vec<usize> = (start..start + size).collect();
        let train: Vec<usize> = (0..start).chain(start + size..n).collect();
        folds.push((train, validation));
        start += size;
    }
    Ok(folds)
}

/// Outcome of a search.
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub best_params: Candidate,
    pub best_score: f64,
    pub evaluated: usize,
    pub model: FittedModel,
}

/// Randomized search over a discrete parameter grid.
#[derive(Debug, Clone)]
pub struct RandomizedSearch {
    kind: ModelKind,
    space: BTreeMap<String, Vec<serde_json::Value>>,
    scoring: Scoring,
    n_iter: usize,
    cv_splits: usize,
    random_state: u64,
}

impl RandomizedSearch {
    pub fn new(kind: ModelKind, space: BTreeMap<String, Vec<serde_json::Value>>) -> Self {
        Self {
            kind,
            space,
            scoring: Scoring::R2,
            n_iter: 10,
            cv_splits: 5,
            random_state: 42,
        }
    }

    pub fn with_scoring(mut self, scoring: Scoring) -> Self {
        self.scoring = scoring;
        self
    }

    pub fn with_n_iter(mut self, n_iter: usize) -> Self {
        self.n_iter = n_iter;
        self
    }

    pub fn with_cv_splits(mut self, cv_splits: usize) -> Self {
        self.cv_splits = cv_splits;
        self
    }

    pub fn with_random_state(mut self, random_state: u64) -> Self {
        self.random_state = random_state;
        self
    }

    /// Candidates to evaluate: the whole grid when it has at most `n_iter`
    /// points, otherwise `n_iter` distinct points drawn with the seeded rng.
    pub fn candidates(&self) -> Vec<Candidate> {
        let grid = parameter_grid(&self.space);
        if grid.len() <= self.n_iter {
            return grid;
        }
        let mut order: Vec<usize> = (0..grid.len()).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(self.random_state);
        order.shuffle(&mut rng);
        order.truncate(self.n_iter);
        order.into_iter().map(|i| grid[i].clone()).collect()
    }

    /// Scores every candidate by cross-validation and refits the best one on
    /// all of `x`/`y`. Ties keep the earlier candidate.
    pub fn fit(&self, x: &Array2<f64>, y: &Array1<f64>) -> Result<SearchResult, ModelError> {
        if x.nrows() == 0 {
            return Err(ModelError::EmptyTrainingSet);
        }
        let folds = kfold_indices(x.nrows(), self.cv_splits)?;
        let candidates = self.candidates();
        info!(
            model = %self.kind,
            candidates = candidates.len(),
            folds = folds.len(),
            scoring = %self.scoring,
            "Running randomized search"
        );

        let mut best: Option<(Candidate, ModelParams, f64)> = None;
        for candidate in &candidates {
            let params = ModelParams::from_map(self.kind, candidate, self.random_state)?;
            let score = self.cross_validate(params, x, y, &folds)?;
            debug!(params = ?candidate, score, "Candidate scored");

            if best.as_ref().map_or(true, |(_, _, s)| score > *s) {
                best = Some((candidate.clone(), params, score));
            }
        }

        let (best_params, params, best_score) = best.ok_or(ModelError::EmptyTrainingSet)?;
        info!(params = ?best_params, "Grid search of best parameters");
        info!(score = best_score, "Grid search best score");

        let model = FittedModel::fit(self.kind, params, x.view(), y.view())?.with_cv_score(best_score);
        Ok(SearchResult {
            best_params,
            best_score,
            evaluated: candidates.len(),
            model,
        })
    }

    fn cross_validate(
        &self,
        params: ModelParams,
        x: &Array2<f64>,
        y: &Array1<f64>,
        folds: &[(Vec<usize>, Vec<usize>)],
    ) -> Result<f64, ModelError> {
        let mut total = 0.0;
        for (train, validation) in folds {
            let model = FittedModel::fit(
                self.kind,
                params,
                x.select(Axis(0), train).view(),
                y.select(Axis(0), train).view(),
            )?;
            let pred = model.predict(x.select(Axis(0), validation).view())?;
            let truth = y.select(Axis(0), validation);
            total += self.scoring.score(&truth.to_vec(), &pred.to_vec());
        }
        Ok(total / folds.len() as f64)
    }
}
