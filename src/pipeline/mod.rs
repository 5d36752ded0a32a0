//! Pipeline execution engine.
//!
//! # Architecture
//!
//! - **Task**: a load → process → save unit of work ([`Task`]), built from
//!   the parameter bag through [`FromBag`] and run by the engine through
//!   the object-safe [`RunnableTask`]
//! - **TaskSpec**: a named, enable-flagged constructor for one task
//! - **ParameterBag**: named [`Payload`]s accumulated across a run
//! - **Pipeline**: runs its specs in order, once
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use forecast_forge::pipeline::{Pipeline, TaskSpec};
//!
//! let specs = vec![
//!     TaskSpec::configured::<FeatureEngineering>(&config, "forecast_model")?,
//!     TaskSpec::configured::<PrepareData>(&config, "forecast_model")?,
//! ];
//! let mut pipeline = Pipeline::new("forecast_model", Arc::new(config), specs);
//! let outputs = pipeline.run()?;
//! ```

pub mod bag;
pub mod runner;
pub mod task;

pub use bag::{Outputs, ParameterBag, Payload, CONFIG_KEY};
pub use runner::{Pipeline, PipelineState, TaskTiming};
pub use task::{FromBag, RunnableTask, Task, TaskSpec};
