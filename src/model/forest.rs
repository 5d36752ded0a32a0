//! Random forest regression: bagged CART trees split on squared error.

use std::collections::BTreeMap;

use ndarray::{Array1, ArrayView1, ArrayView2};
use rand::seq::SliceRandom;
use rand::{RngExt, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// Hyperparameters of [`RandomForest`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForestParams {
    pub n_estimators: usize,
    /// `None` grows trees until leaves are pure or too small to split.
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Features considered per split; `None` considers all of them.
    pub max_features: Option<usize>,
    pub bootstrap: bool,
    pub random_state: u64,
}

impl ForestParams {
    pub fn defaults(random_state: u64) -> Self {
        Self {
            n_estimators: 100,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
            bootstrap: true,
            random_state,
        }
    }

    /// Builds parameters from a search candidate, starting from the defaults.
    pub fn from_map(
        values: &BTreeMap<String, serde_json::Value>,
        random_state: u64,
    ) -> Result<Self, ModelError> {
        let mut params = Self::defaults(random_state);
        for (name, value) in values {
            let count = |min: u64| {
                value
                    .as_u64()
                    .filter(|v| *v >= min)
                    .and_then(|v| usize::try_from(v).ok())
                    .ok_or_else(|| ModelError::InvalidHyperparameter {
                        name: name.clone(),
                        reason: format!("expected an integer of at least {min}, got {value}"),
                    })
            };
            match name.as_str() {
                "n_estimators" => params.n_estimators = count(1)?,
                "max_depth" if value.is_null() => params.max_depth = None,
                "max_depth" => params.max_depth = Some(count(1)?),
                "min_samples_split" => params.min_samples_split = count(2)?,
                "min_samples_leaf" => params.min_samples_leaf = count(1)?,
                "max_features" if value.is_null() => params.max_features = None,
                "max_features" => params.max_features = Some(count(1)?),
                "bootstrap" => {
                    params.bootstrap =
                        value
                            .as_bool()
                            .ok_or_else(|| ModelError::InvalidHyperparameter {
                                name: name.clone(),
                                reason: format!("expected a boolean, got {value}"),
                            })?;
                }
                "random_state" => params.random_state = count(0)? as u64,
                _ => {
                    return Err(ModelError::InvalidHyperparameter {
                        name: name.clone(),
                        reason: "not a parameter of random_forest".to_string(),
                    })
                }
            }
        }
        Ok(params)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// A single regression tree stored as a flat node list; node 0 is the root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    nodes: Vec<Node>,
}

impl RegressionTree {
    fn predict_row(&self, row: ArrayView1<'_, f64>) -> f64 {
        let mut index = 0;
        loop {
            match &self.nodes[index] {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    index = if row[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], index: usize) -> usize {
            match &nodes[index] {
                Node::Leaf { .. } => 0,
                Node::Split { left, right, .. } => 1 + walk(nodes, *left).max(walk(nodes, *right)),
            }
        }
        walk(&self.nodes, 0)
    }
}

struct TreeBuilder<'a> {
    x: ArrayView2<'a, f64>,
    y: ArrayView1<'a, f64>,
    params: &'a ForestParams,
    nodes: Vec<Node>,
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    gain: f64,
}

impl TreeBuilder<'_> {
    fn build(&mut self, rows: &mut [usize], depth: usize, rng: &mut ChaCha8Rng) -> usize {
        let index = self.nodes.len();
        let mean = rows.iter().map(|&r| self.y[r]).sum::<f64>() / rows.len() as f64;
        self.nodes.push(Node::Leaf { value: mean });

        let depth_reached = self.params.max_depth.is_some_and(|max| depth >= max);
        if depth_reached || rows.len() < self.params.min_samples_split {
            return index;
        }
        let Some(split) = self.best_split(rows, rng) else {
            return index;
        };

        let (feature, threshold) = (split.feature, split.threshold);
        rows.sort_by(|&a, &b| {
            (self.x[[a, feature]] > threshold).cmp(&(self.x[[b, feature]] > threshold))
        });
        let n_left = rows
            .iter()
            .take_while(|&&r| self.x[[r, feature]] <= threshold)
            .count();
        let (left_rows, right_rows) = rows.split_at_mut(n_left);
        let left = self.build(left_rows, depth + 1, rng);
        let right = self.build(right_rows, depth + 1, rng);
        self.nodes[index] = Node::Split {
            feature,
            threshold,
            left,
            right,
        };
        index
    }

    /// Split maximizing `sum_l²/n_l + sum_r²/n_r`, which minimizes the
    /// children's summed squared error.
    fn best_split(&self, rows: &[usize], rng: &mut ChaCha8Rng) -> Option<BestSplit> {
        let n_features = self.x.ncols();
        let mut features: Vec<usize> = (0..n_features).collect();
        if let Some(k) = self.params.max_features.filter(|k| *k < n_features) {
            features.shuffle(rng);
            features.truncate(k);
        }

        let n = rows.len();
        let min_leaf = self.params.min_samples_leaf.max(1);
        let total: f64 = rows.iter().map(|&r| self.y[r]).sum();
        let parent = total * total / n as f64;

        let mut best: Option<BestSplit> = None;
        let mut sorted = rows.to_vec();
        for feature in features {
            sorted.sort_by(|&a, &b| self.x[[a, feature]].total_cmp(&self.x[[b, feature]]));
            let mut left_sum = 0.0;
            for i in 1..n {
                left_sum += self.y[sorted[i - 1]];
                let (lo, hi) = (self.x[[sorted[i - 1], feature]], self.x[[sorted[i], feature]]);
                if i < min_leaf || n - i < min_leaf || lo >= hi {
                    continue;
                }
                let right_sum = total - left_sum;
                let gain = left_sum * left_sum / i as f64
                    + right_sum * right_sum / (n - i) as f64
                    - parent;
                if gain > 1e-12 && best.as_ref().map_or(true, |b| gain > b.gain) {
                    best = Some(BestSplit {
                        feature,
                        threshold: lo + (hi - lo) / 2.0,
                        gain,
                    });
                }
            }
        }
        best
    }
}

/// Fitted random forest; predictions average the trees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    pub n_features: usize,
    pub trees: Vec<RegressionTree>,
}

impl RandomForest {
    pub fn fit(
        params: &ForestParams,
        x: ArrayView2<'_, f64>,
        y: ArrayView1<'_, f64>,
    ) -> Result<Self, ModelError> {
        let n_samples = x.nrows();
        if n_samples == 0 {
            return Err(ModelError::EmptyTrainingSet);
        }
        if y.len() != n_samples {
            return Err(ModelError::DimensionMismatch {
                expected: n_samples,
                actual: y.len(),
            });
        }
        let mut rng = ChaCha8Rng::seed_from_u64(params.random_state);
        let mut trees = Vec::with_capacity(params.n_estimators);

        for _ in 0..params.n_estimators {
            let mut rows: Vec<usize> = if params.bootstrap {
                (0..n_samples)
                    .map(|_| rng.random_range(0..n_samples))
                    .collect()
            } else {
                (0..n_samples).collect()
            };
            let mut builder = TreeBuilder {
                x,
                y,
                params,
                nodes: Vec::new(),
            };
            builder.build(&mut rows, 0, &mut rng);
            trees.push(RegressionTree {
                nodes: builder.nodes,
            });
        }

        Ok(Self {
            n_features: x.ncols(),
            trees,
        })
    }

    pub fn predict(&self, x: ArrayView2<'_, f64>) -> Array1<f64> {
        let n_trees = self.trees.len().max(1) as f64;
        x.rows()
            .into_iter()
            .map(|row| self.trees.iter().map(|t| t.predict_row(row)).sum::<f64>() / n_trees)
            .collect()
    }
}
