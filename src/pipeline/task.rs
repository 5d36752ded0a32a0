//! The task lifecycle contract and the specs a pipeline is built from.

use std::fmt;

use crate::config::{Config, ConfigError};
use crate::error::TaskError;

use super::bag::{Outputs, ParameterBag};

/// A unit of work with a load → process → save lifecycle.
pub trait Task {
    /// What `load_inputs` hands to `process`.
    type Inputs;
    /// What `process` produces and `save_results` persists.
    type Output;

    fn name(&self) -> &str;

    fn load_inputs(&mut self) -> Result<Self::Inputs, TaskError>;

    fn process(&mut self, inputs: Self::Inputs) -> Result<Self::Output, TaskError>;

    fn save_results(&mut self, output: &Self::Output) -> Result<(), TaskError>;

    /// Names the results for the parameter bag.
    fn into_outputs(self, output: Self::Output) -> Outputs;

    fn run(mut self) -> Result<Outputs, TaskError>
    where
        Self: Sized,
    {
        let inputs = self.load_inputs()?;
        let output = self.process(inputs)?;
        self.save_results(&output)?;
        Ok(self.into_outputs(output))
    }
}

/// A task that copies what it needs out of the parameter bag.
pub trait FromBag: Task + Sized {
    const NAME: &'static str;

    fn from_bag(bag: &ParameterBag) -> Result<Self, TaskError>;
}

/// Object-safe view of a [`Task`] used by the engine.
pub trait RunnableTask {
    fn name(&self) -> &str;

    fn run(self: Box<Self>) -> Result<Outputs, TaskError>;
}

impl<T: Task> RunnableTask for T {
    fn name(&self) -> &str {
        Task::name(self)
    }

    fn run(self: Box<Self>) -> Result<Outputs, TaskError> {
        Task::run(*self)
    }
}

type BuildFn = dyn Fn(&ParameterBag) -> Result<Box<dyn RunnableTask>, TaskError>;

/// One entry of a pipeline's task list.
pub struct TaskSpec {
    name: String,
    enabled: bool,
    build: Box<BuildFn>,
}

impl TaskSpec {
    pub fn new<F>(name: impl Into<String>, enabled: bool, build: F) -> Self
    where
        F: Fn(&ParameterBag) -> Result<Box<dyn RunnableTask>, TaskError> + 'static,
    {
        Self {
            name: name.into(),
            enabled,
            build: Box::new(build),
        }
    }

    /// Spec for a task constructed through [`FromBag`].
    pub fn of<T: FromBag + 'static>(enabled: bool) -> Self {
        Self::new(T::NAME, enabled, |bag| {
            let task: Box<dyn RunnableTask> = Box::new(T::from_bag(bag)?);
            Ok(task)
        })
    }

    /// Spec whose flag is read from `pipelines.<pipeline>.tasks.<task>`.
    pub fn configured<T: FromBag + 'static>(
        config: &Config,
        pipeline: &str,
    ) -> Result<Self, ConfigError> {
        Ok(Self::of::<T>(config.task_enabled(pipeline, T::NAME)?))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn build(&self, bag: &ParameterBag) -> Result<Box<dyn RunnableTask>, TaskError> {
        (self.build)(bag)
    }
}

impl fmt::Debug for TaskSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskSpec")
            .field("name", &self.name)
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Payload;
    use serde_json::json;

    struct Doubler {
        value: i64,
        saved: bool,
    }

    impl Task for Doubler {
        type Inputs = i64;
        type Output = i64;

        fn name(&self) -> &str {
            Self::NAME
        }

        fn load_inputs(&mut self) -> Result<i64, TaskError> {
            Ok(self.value)
        }

        fn process(&mut self, inputs: i64) -> Result<i64, TaskError> {
            Ok(inputs * 2)
        }

        fn save_results(&mut self, _output: &i64) -> Result<(), TaskError> {
            self.saved = true;
            Ok(())
        }

        fn into_outputs(self, output: i64) -> Outputs {
            assert!(self.saved, "save_results runs before outputs are named");
            let mut outputs = Outputs::new();
            outputs.insert("doubled".to_string(), Payload::Dict(json!(output)));
            outputs
        }
    }

    impl FromBag for Doubler {
        const NAME: &'static str = "doubler";

        fn from_bag(bag: &ParameterBag) -> Result<Self, TaskError> {
            let value = bag
                .dict("value")?
                .and_then(|v| v.as_i64())
                .ok_or_else(|| TaskError::MissingInput {
                    key: "value".to_string(),
                })?;
            Ok(Self {
                value,
                saved: false,
            })
        }
    }

    #[test]
    fn test_lifecycle_runs_in_order() {
        let task = Doubler {
            value: 21,
            saved: false,
        };
        let outputs = Task::run(task).unwrap();
        assert!(matches!(outputs.get("doubled"), Some(Payload::Dict(v)) if *v == json!(42)));
    }

    #[test]
    fn test_spec_builds_from_bag() {
        let spec = TaskSpec::of::<Doubler>(true);
        assert_eq!(spec.name(), "doubler");
        assert!(spec.enabled());

        let mut bag = ParameterBag::new();
        assert!(matches!(
            spec.build(&bag).err(),
            Some(TaskError::MissingInput { .. })
        ));

        bag.insert("value", Payload::Dict(json!(5)));
        let task = spec.build(&bag).unwrap();
        assert_eq!(task.name(), "doubler");
        let outputs = task.run().unwrap();
        assert_eq!(outputs.len(), 1);
    }

    #[test]
    fn test_configured_reads_flag() {
        let config = Config::from_yaml_str("pipelines:\n  demo:\n    tasks:\n      doubler: false\n")
            .unwrap();
        let spec = TaskSpec::configured::<Doubler>(&config, "demo").unwrap();
        assert!(!spec.enabled());

        let err = TaskSpec::configured::<Doubler>(&config, "other").unwrap_err();
        assert!(matches!(err, ConfigError::MissingKey(ref key) if key == "pipelines.other.tasks.doubler"));
    }
}
