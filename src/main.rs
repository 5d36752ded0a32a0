//! forecast-forge CLI entry point.
//!
//! Initializes logging and delegates to the CLI module for the run.

use forecast_forge::cli::{init_logging, parse_cli, run_with_log};

fn main() -> anyhow::Result<()> {
    // Parse CLI arguments first to get the log filter
    let cli = parse_cli();

    // Priority: RUST_LOG env var > --verbose > --log-level
    let run_log = init_logging(&cli.log_filter());

    run_with_log(cli, &run_log)?;
    Ok(())
}
