//! Regression models, preprocessing and evaluation metrics.
//!
//! Linear models are solved in closed form on `ndarray` matrices and the
//! random forest grows seeded CART trees; tuning is a seeded randomized
//! search scored by K-fold cross-validation.

pub mod estimator;
pub mod forest;
pub mod linear;
pub mod metrics;
pub mod preprocessing;
pub mod tuning;

pub use estimator::{Estimator, FittedModel, ModelKind, ModelParams};
pub use forest::{ForestParams, RandomForest};
pub use linear::{LinearFit, LinearParams};
pub use metrics::AccuracyMetrics;
pub use preprocessing::{train_test_split, StandardScaler, TrainData};
pub use tuning::{RandomizedSearch, Scoring, SearchResult};
