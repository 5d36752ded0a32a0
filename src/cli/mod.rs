//! Command-line interface for forecast-forge.
//!
//! One command: resolve versions, run a pipeline, snapshot the configuration.

mod commands;
mod logging;

pub use commands::{parse_cli, run, run_with_cli, run_with_log, Cli, DEFAULT_ARTEFACTS_ROOT};
pub use logging::{init_logging, subscriber, RunLog};
