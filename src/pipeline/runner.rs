//! Sequential pipeline execution.
//!
//! A [`Pipeline`] owns an ordered list of [`TaskSpec`]s and a
//! [`ParameterBag`] seeded with the run configuration. Each enabled task is
//! built from the whole bag, run through its lifecycle, and its outputs are
//! merged back before the next task is built.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use tracing::{info, trace, warn};

use crate::config::Config;
use crate::error::PipelineError;

use super::bag::{Outputs, ParameterBag};
use super::task::TaskSpec;

/// Lifecycle of a pipeline instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Constructed,
    Running,
    Completed,
    Failed,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineState::Constructed => write!(f, "constructed"),
            PipelineState::Running => write!(f, "running"),
            PipelineState::Completed => write!(f, "completed"),
            PipelineState::Failed => write!(f, "failed"),
        }
    }
}

/// Wall-clock duration of one executed task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskTiming {
    pub name: String,
    pub duration_ms: u64,
}

/// A fixed, ordered task list run once with a shared parameter bag.
#[derive(Debug)]
pub struct Pipeline {
    name: String,
    specs: Vec<TaskSpec>,
    bag: ParameterBag,
    state: PipelineState,
    timings: Vec<TaskTiming>,
}

impl Pipeline {
    /// Creates a pipeline whose bag is seeded with `config`.
    pub fn new(name: impl Into<String>, config: Arc<Config>, specs: Vec<TaskSpec>) -> Self {
        Self::with_bag(name, ParameterBag::seeded(config), specs)
    }

    /// Creates a pipeline with an arbitrary initial bag.
    pub fn with_bag(name: impl Into<String>, bag: ParameterBag, specs: Vec<TaskSpec>) -> Self {
        Self {
            name: name.into(),
            specs,
            bag,
            state: PipelineState::Constructed,
            timings: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn specs(&self) -> &[TaskSpec] {
        &self.specs
    }

    /// The accumulated bag: the seed plus every executed task's outputs.
    pub fn parameters(&self) -> &ParameterBag {
        &self.bag
    }

    pub fn timings(&self) -> &[TaskTiming] {
        &self.timings
    }

    /// Runs every enabled task in order and returns the last executed
    /// task's outputs, or an empty mapping if no task ran.
    ///
    /// The first task error stops the run and is returned unchanged. A
    /// pipeline can only be run once.
    pub fn run(&mut self) -> Result<Outputs, PipelineError> {
        if self.state != PipelineState::Constructed {
            return Err(PipelineError::AlreadyRun {
                name: self.name.clone(),
                state: self.state.to_string(),
            });
        }
        self.state = PipelineState::Running;

        let enabled = self.specs.iter().filter(|s| s.enabled()).count();
        info!(
            pipeline = %self.name,
            tasks = self.specs.len(),
            enabled,
            "Running pipeline"
        );

        let mut last = Outputs::new();
        for spec in &self.specs {
            if !spec.enabled() {
                trace!(pipeline = %self.name, task = spec.name(), "Skipping disabled task");
                continue;
            }

            info!(pipeline = %self.name, task = spec.name(), "[START]");
            let start = Instant::now();
            let result = spec.build(&self.bag).and_then(|task| task.run());
            let duration_ms = start.elapsed().as_millis() as u64;

            let outputs = match result {
                Ok(outputs) => outputs,
                Err(err) => {
                    self.state = PipelineState::Failed;
                    warn!(
                        pipeline = %self.name,
                        task = spec.name(),
                        duration_ms,
                        error = %err,
                        "[FAILED]"
                    );
                    return Err(err.into());
                }
            };

            info!(
                pipeline = %self.name,
                task = spec.name(),
                duration_ms,
                outputs = ?outputs.keys().collect::<Vec<_>>(),
                "[END]"
            );
            self.timings.push(TaskTiming {
                name: spec.name().to_string(),
                duration_ms,
            });
            self.bag.merge(outputs.clone());
            last = outputs;
        }

        self.state = PipelineState::Completed;
        Ok(last)
    }
}
