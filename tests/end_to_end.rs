//! End-to-end runs through the CLI entry point on synthetic real-estate data.
//!
//! `data_processing` conforms a raw CSV into a processed Parquet table, then
//! `forecast_model` picks up the latest processed version, engineers
//! features, trains a ridge model and evaluates it.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use clap::Parser;
use forecast_forge::cli::{run_with_cli, run_with_log, subscriber, Cli};
use forecast_forge::config::Config;
use forecast_forge::pipeline::Payload;
use forecast_forge::TaskError;
use tempfile::TempDir;

const RAW_VERSION: &str = "20240101_000000";
const PROCESSED_VERSION: &str = "20240102_000000";
const MODEL_RUN_VERSION: &str = "20240103_000000";

/// y is an exact linear function of age, distance and store count.
fn raw_csv(rows: usize) -> String {
    let mut csv = String::from(
        "No,X1 transaction date,X2 house age,X3 distance to the nearest MRT station,\
         X4 number of convenience stores,X5 latitude,X6 longitude,Y house price of unit area\n",
    );
    for i in 0..rows {
        let age = (i * 7 % 40) as f64;
        let distance = (i * 37 % 500 + 20) as f64;
        let stores = (i % 10) as f64;
        let price = 0.5 * age - 0.02 * distance + 1.5 * stores + 10.0;
        writeln!(
            csv,
            "{},2013-{:02}-15,{age},{distance},{stores},{:.5},{:.5},{price}",
            i + 1,
            i % 12 + 1,
            24.95 + (i % 13) as f64 * 0.001,
            121.50 + (i % 7) as f64 * 0.002,
        )
        .expect("write to string");
    }
    csv
}

fn write_config(root: &Path) -> PathBuf {
    let yaml = format!(
        r#"
data:
  raw_data:
    base_directory: {root}/data/raw
    tables:
      dummy_data: dummy_data.csv
  processed_data:
    base_directory: {root}/data/processed
    tables:
      dummy_data: dummy_data.parquet
  output_data:
    base_directory: {root}/data/output
    tables:
      feature_data: feature_data.parquet
    dicts:
      train_data: train_data.json
      fit_metrics: fit_metrics.json
    models:
      ml_model: ml_model.json
    figures:
      pred_vs_actual: pred_vs_actual.svg
pipelines:
  data_processing:
    tasks:
      process_dummy_data: true
  forecast_model:
    tasks:
      feature_engineering: true
      prepare_data: true
      train_ml_model: true
      evaluate_model: true
forecast_model:
  target: y_house_price_of_unit_area
  test_size: 0.25
  random_state: 7
  features:
    numeric:
      - x2_house_age
      - x3_distance_to_nearest_mrt_station
      - x4_number_of_convenience_stores
      - haversine_point
  ml_model:
    model_name: ridge
    scoring: r2
    hyperparameters:
      cv_splits: 4
      n_iter: 3
      ridge:
        alpha: [0.0001, 0.001, 0.01, 0.1]
        fit_intercept: [true]
"#,
        root = root.display()
    );
    let path = root.join("base.yml");
    std::fs::write(&path, yaml).expect("write config");
    path
}

fn cli(args: &[&str], config: &Path, artefacts: &Path) -> Cli {
    let mut argv = vec!["forecast-forge".to_string()];
    argv.extend(args.iter().map(|a| a.to_string()));
    argv.extend([
        "--config".to_string(),
        config.display().to_string(),
        "--artefacts-root".to_string(),
        artefacts.display().to_string(),
    ]);
    Cli::try_parse_from(argv).expect("cli parses")
}

fn setup() -> (TempDir, PathBuf, PathBuf) {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let raw = dir.path().join("data/raw").join(RAW_VERSION);
    std::fs::create_dir_all(&raw).expect("create raw dir");
    std::fs::write(raw.join("dummy_data.csv"), raw_csv(80)).expect("write raw csv");

    let config = write_config(dir.path());
    let artefacts = dir.path().join("artefacts/output");
    (dir, config, artefacts)
}

fn process_data(config: &Path, artefacts: &Path) {
    let outputs = run_with_cli(cli(
        &[
            "-p",
            "data_processing",
            "--raw-data-version",
            RAW_VERSION,
            "--processed-data-version",
            PROCESSED_VERSION,
            "--run-version",
            PROCESSED_VERSION,
        ],
        config,
        artefacts,
    ))
    .expect("data processing succeeds");
    assert!(matches!(outputs.get("dummy_data"), Some(Payload::Table(t)) if t.n_rows() == 80));
}

#[test]
fn test_processing_then_modelling() {
    let (dir, config, artefacts) = setup();
    process_data(&config, &artefacts);
    assert!(dir
        .path()
        .join("data/processed")
        .join(PROCESSED_VERSION)
        .join("dummy_data.parquet")
        .is_file());

    let outputs = run_with_cli(cli(
        &["-p", "forecast_model", "--run-version", MODEL_RUN_VERSION],
        &config,
        &artefacts,
    ))
    .expect("forecast model succeeds");

    let Some(Payload::Dict(metrics)) = outputs.get("fit_metrics") else {
        panic!("the last task returns fit_metrics, got {:?}", outputs.keys());
    };
    let test_r2 = metrics["test"]["r2"].as_f64().expect("test r2");
    assert!(test_r2 > 0.99, "linear data should be fit closely, r2 = {test_r2}");

    let run_dir = dir
        .path()
        .join("data/output/forecast_model")
        .join(MODEL_RUN_VERSION);
    for file in [
        "feature_data.parquet",
        "train_data.json",
        "ml_model.json",
        "fit_metrics.json",
        "pred_vs_actual.svg",
    ] {
        assert!(run_dir.join(file).is_file(), "{file} should be written");
    }

    let snapshot = artefacts
        .join("forecast_model")
        .join(MODEL_RUN_VERSION)
        .join("config.yml");
    let saved = Config::from_yaml_str(&std::fs::read_to_string(&snapshot).expect("snapshot"))
        .expect("snapshot parses");
    assert_eq!(saved.run_details.pipeline.as_deref(), Some("forecast_model"));
    assert_eq!(
        saved.run_details.processed_data_version.as_deref(),
        Some(PROCESSED_VERSION),
        "latest processed version is picked up"
    );
    assert!(artefacts
        .join("data_processing")
        .join(PROCESSED_VERSION)
        .join("config.yml")
        .is_file());
}

#[test]
fn test_failed_run_still_writes_snapshot() {
    let (dir, config, artefacts) = setup();
    process_data(&config, &artefacts);

    let overlay = dir.path().join("overlay.yml");
    std::fs::write(&overlay, "forecast_model:\n  ml_model:\n    model_name: xgboost\n")
        .expect("write overlay");

    let mut cli = cli(
        &["-p", "forecast_model", "--run-version", MODEL_RUN_VERSION],
        &config,
        &artefacts,
    );
    cli.config.push(overlay);

    let err = run_with_cli(cli).expect_err("unsupported model fails the run");
    assert!(
        matches!(
            err.downcast_ref::<forecast_forge::PipelineError>()
                .and_then(|e| e.as_task_error()),
            Some(TaskError::UnsupportedModel(name)) if name == "xgboost"
        ),
        "got {err:?}"
    );

    let snapshot = artefacts
        .join("forecast_model")
        .join(MODEL_RUN_VERSION)
        .join("config.yml");
    let saved = Config::from_yaml_str(&std::fs::read_to_string(&snapshot).expect("snapshot"))
        .expect("snapshot parses");
    assert_eq!(
        saved.forecast_model.ml_model.model_name.as_deref(),
        Some("xgboost"),
        "the layered configuration is what gets saved"
    );
}

#[test]
fn test_unknown_pipeline_writes_nothing() {
    let (_dir, config, artefacts) = setup();

    let err = run_with_cli(cli(&["-p", "training"], &config, &artefacts))
        .expect_err("unknown pipeline fails");
    assert!(format!("{err:#}").contains("training"));
    assert!(!artefacts.exists(), "no run version, so no snapshot");
}

#[test]
fn test_snapshot_failure_fails_the_run() {
    let (dir, config, _) = setup();
    let blocked = dir.path().join("artefacts");
    std::fs::write(&blocked, "not a directory").expect("write blocker");

    let err = run_with_cli(cli(
        &[
            "-p",
            "data_processing",
            "--raw-data-version",
            RAW_VERSION,
            "--run-version",
            PROCESSED_VERSION,
        ],
        &config,
        &blocked,
    ))
    .expect_err("an unwritable snapshot fails the run");
    assert!(
        format!("{err:#}").contains("Failed to save run configuration"),
        "got {err:#}"
    );
    assert!(
        dir.path()
            .join("data/processed")
            .join(PROCESSED_VERSION)
            .join("dummy_data.parquet")
            .is_file(),
        "the pipeline itself ran"
    );
}

#[test]
fn test_pipeline_error_wins_over_snapshot_error() {
    let (dir, config, artefacts) = setup();
    process_data(&config, &artefacts);

    let overlay = dir.path().join("overlay.yml");
    std::fs::write(&overlay, "forecast_model:\n  ml_model:\n    model_name: xgboost\n")
        .expect("write overlay");
    let blocked = dir.path().join("blocked");
    std::fs::write(&blocked, "not a directory").expect("write blocker");

    let mut cli = cli(&["-p", "forecast_model"], &config, &blocked);
    cli.config.push(overlay);

    let err = run_with_cli(cli).expect_err("both the run and the snapshot fail");
    assert!(
        matches!(
            err.downcast_ref::<forecast_forge::PipelineError>()
                .and_then(|e| e.as_task_error()),
            Some(TaskError::UnsupportedModel(_))
        ),
        "got {err:#}"
    );
}

#[test]
fn test_run_log_file_is_written() {
    let (dir, config, artefacts) = setup();
    let overlay = dir.path().join("logging.yml");
    std::fs::write(
        &overlay,
        format!(
            "log_details:\n  base_directory:\n    main_directory: {}\n  file_name: forecast_forge\n",
            dir.path().join("artefacts").display()
        ),
    )
    .expect("write overlay");

    let (subscriber, run_log) = subscriber("info");
    let _guard = tracing::subscriber::set_default(subscriber);

    let mut cli = cli(
        &[
            "-p",
            "data_processing",
            "--raw-data-version",
            RAW_VERSION,
            "--run-version",
            PROCESSED_VERSION,
        ],
        &config,
        &artefacts,
    );
    cli.config.push(overlay);
    run_with_log(cli, &run_log).expect("data processing succeeds");

    let log_file = dir
        .path()
        .join("artefacts/logs/data_processing")
        .join(format!("forecast_forge_{PROCESSED_VERSION}.log"));
    let contents = std::fs::read_to_string(&log_file).expect("run log exists");
    assert!(contents.contains("Run details"), "got {contents}");
    assert!(contents.contains(PROCESSED_VERSION));
    assert!(!contents.contains("\u{1b}["), "no terminal colors in the file");
}
