//! Integration tests for the pipeline engine.
//!
//! Fake tasks record their lifecycle calls into a shared log so ordering,
//! skipping and failure behavior can be observed from outside.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use forecast_forge::config::Config;
use forecast_forge::pipeline::{
    Outputs, ParameterBag, Payload, Pipeline, PipelineState, RunnableTask, Task, TaskSpec,
    CONFIG_KEY,
};
use forecast_forge::{PipelineError, TaskError};
use serde_json::json;

type Log = Rc<RefCell<Vec<String>>>;

/// Emits fixed dict values; optionally adds one to a value read from the bag.
struct Recording {
    name: &'static str,
    log: Log,
    emits: Vec<(&'static str, i64)>,
    input: Option<i64>,
    fail: bool,
}

impl Task for Recording {
    type Inputs = Option<i64>;
    type Output = Outputs;

    fn name(&self) -> &str {
        self.name
    }

    fn load_inputs(&mut self) -> Result<Option<i64>, TaskError> {
        self.log.borrow_mut().push(format!("{}:load", self.name));
        Ok(self.input)
    }

    fn process(&mut self, input: Option<i64>) -> Result<Outputs, TaskError> {
        self.log.borrow_mut().push(format!("{}:process", self.name));
        if self.fail {
            return Err(TaskError::Failed(format!("{} exploded", self.name)));
        }
        let mut outputs = Outputs::new();
        for (key, value) in &self.emits {
            outputs.insert(key.to_string(), Payload::Dict(json!(value + input.unwrap_or(0))));
        }
        Ok(outputs)
    }

    fn save_results(&mut self, _output: &Outputs) -> Result<(), TaskError> {
        self.log.borrow_mut().push(format!("{}:save", self.name));
        Ok(())
    }

    fn into_outputs(self, output: Outputs) -> Outputs {
        output
    }
}

struct Fake {
    name: &'static str,
    enabled: bool,
    emits: Vec<(&'static str, i64)>,
    reads: Option<&'static str>,
    fail: bool,
}

impl Fake {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            enabled: true,
            emits: Vec::new(),
            reads: None,
            fail: false,
        }
    }

    fn emits(mut self, key: &'static str, value: i64) -> Self {
        self.emits.push((key, value));
        self
    }

    fn reads(mut self, key: &'static str) -> Self {
        self.reads = Some(key);
        self
    }

    fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    fn spec(self, log: &Log) -> TaskSpec {
        let log = Rc::clone(log);
        let Fake {
            name,
            enabled,
            emits,
            reads,
            fail,
        } = self;
        TaskSpec::new(name, enabled, move |bag: &ParameterBag| {
            log.borrow_mut().push(format!("{name}:build"));
            let input = match reads {
                Some(key) => Some(
                    bag.dict(key)?
                        .and_then(|v| v.as_i64())
                        .ok_or_else(|| TaskError::MissingInput {
                            key: key.to_string(),
                        })?,
                ),
                None => None,
            };
            let task: Box<dyn RunnableTask> = Box::new(Recording {
                name,
                log: Rc::clone(&log),
                emits: emits.clone(),
                input,
                fail,
            });
            Ok(task)
        })
    }
}

fn pipeline(specs: Vec<TaskSpec>) -> Pipeline {
    Pipeline::new("engine_test", Arc::new(Config::default()), specs)
}

fn new_log() -> Log {
    Rc::new(RefCell::new(Vec::new()))
}

fn entries(log: &Log) -> Vec<String> {
    log.borrow().clone()
}

#[test]
fn test_all_disabled_runs_nothing() {
    let log = new_log();
    let mut p = pipeline(vec![
        Fake::new("a").emits("x", 1).disabled().spec(&log),
        Fake::new("b").emits("y", 2).disabled().spec(&log),
    ]);

    let outputs = p.run().expect("pipeline should succeed");
    assert!(outputs.is_empty(), "no task ran, so no outputs");
    assert!(entries(&log).is_empty(), "disabled tasks are never built");
    assert_eq!(p.state(), PipelineState::Completed);
    assert_eq!(p.parameters().keys().collect::<Vec<_>>(), vec![CONFIG_KEY]);
}

#[test]
fn test_enabled_tasks_run_in_order_with_full_lifecycle() {
    let log = new_log();
    let mut p = pipeline(vec![
        Fake::new("a").emits("x", 1).spec(&log),
        Fake::new("b").emits("y", 2).disabled().spec(&log),
        Fake::new("c").emits("z", 3).spec(&log),
    ]);
    p.run().expect("pipeline should succeed");

    assert_eq!(
        entries(&log),
        vec![
            "a:build", "a:load", "a:process", "a:save", "c:build", "c:load", "c:process", "c:save",
        ]
    );
    let timed: Vec<_> = p.timings().iter().map(|t| t.name.clone()).collect();
    assert_eq!(timed, vec!["a", "c"]);
}

#[test]
fn test_later_tasks_see_earlier_outputs() {
    let log = new_log();
    let mut p = pipeline(vec![
        Fake::new("producer").emits("x", 41).spec(&log),
        Fake::new("consumer").reads("x").emits("y", 1).spec(&log),
    ]);

    let outputs = p.run().expect("pipeline should succeed");
    assert_eq!(
        outputs.keys().collect::<Vec<_>>(),
        vec!["y"],
        "the result holds only the last task's outputs"
    );
    assert!(matches!(outputs.get("y"), Some(Payload::Dict(v)) if *v == json!(42)));

    let bag = p.parameters();
    assert_eq!(bag.keys().collect::<Vec<_>>(), vec![CONFIG_KEY, "x", "y"]);
    assert!(bag.config().is_ok(), "config stays in the bag");
}

#[test]
fn test_later_writes_overwrite_earlier_ones() {
    let log = new_log();
    let mut p = pipeline(vec![
        Fake::new("first").emits("shared", 1).spec(&log),
        Fake::new("second").emits("shared", 2).spec(&log),
    ]);
    p.run().expect("pipeline should succeed");

    assert_eq!(p.parameters().dict("shared").unwrap(), Some(json!(2)));
}

#[test]
fn test_task_failure_stops_the_run_unchanged() {
    let log = new_log();
    let mut p = pipeline(vec![
        Fake::new("ok").emits("x", 1).spec(&log),
        Fake::new("broken").failing().spec(&log),
        Fake::new("never").emits("z", 3).spec(&log),
    ]);

    let err = p.run().expect_err("pipeline should fail");
    assert!(
        matches!(err.as_task_error(), Some(TaskError::Failed(msg)) if msg == "broken exploded"),
        "got {err:?}"
    );
    assert_eq!(err.to_string(), "broken exploded", "message passes through");
    assert_eq!(p.state(), PipelineState::Failed);

    let log = entries(&log);
    assert!(!log.iter().any(|e| e.starts_with("never")));
    assert!(!log.contains(&"broken:save".to_string()), "failed tasks do not save");
    assert!(p.parameters().contains_key("x"));
    assert!(!p.parameters().contains_key("z"));
}

#[test]
fn test_missing_input_surfaces_in_the_consumer() {
    let log = new_log();
    let mut p = pipeline(vec![
        Fake::new("producer").emits("x", 1).disabled().spec(&log),
        Fake::new("consumer").reads("x").spec(&log),
    ]);

    let err = p.run().expect_err("consumer should fail");
    assert!(matches!(
        err,
        PipelineError::Task(TaskError::MissingInput { ref key }) if key == "x"
    ));
}

#[test]
fn test_pipeline_runs_once() {
    let log = new_log();
    let mut p = pipeline(vec![Fake::new("a").emits("x", 1).spec(&log)]);
    p.run().expect("first run succeeds");

    let err = p.run().expect_err("second run is rejected");
    assert!(matches!(err, PipelineError::AlreadyRun { .. }));
    assert_eq!(entries(&log).len(), 4, "the task ran once");
}

#[test]
fn test_failed_pipeline_cannot_be_rerun() {
    let log = new_log();
    let mut p = pipeline(vec![Fake::new("broken").failing().spec(&log)]);
    p.run().expect_err("first run fails");

    let err = p.run().expect_err("rerun is rejected");
    assert!(matches!(err, PipelineError::AlreadyRun { ref state, .. } if state == "failed"));
}
