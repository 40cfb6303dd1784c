//! End-to-end extraction runs against the mock engine.

mod common;

use common::{load_zones, test_config, write_mock_input, MockDataset, MockEngine};
use nc_zonal::config::ExtractConfig;
use nc_zonal::export::CsvExporter;
use nc_zonal::orchestrator::InProcessLauncher;
use nc_zonal::run::{run_extraction, RunReport};
use nc_zonal::table::{StatRow, SCHEMA};
use nc_zonal::worker::{FileState, FileStatus};
use nc_zonal::ExtractError;
use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::Ordering;
use tempfile::TempDir;

async fn run(config: &ExtractConfig, engine: &MockEngine) -> nc_zonal::Result<RunReport> {
    let worker_engine = engine.clone();
    let launcher = InProcessLauncher::new(
        move || worker_engine.clone(),
        config.clone(),
        load_zones(config),
    );
    run_extraction(config, engine, &launcher, &CsvExporter).await
}

fn read_export(path: &Path) -> Vec<StatRow> {
    let mut reader = csv::Reader::from_path(path).unwrap();
    reader.deserialize().map(|r| r.unwrap()).collect()
}

fn outcome_status<'a>(report: &'a RunReport, file: &str) -> &'a FileStatus {
    &report
        .outcomes
        .iter()
        .find(|o| o.file == file)
        .unwrap_or_else(|| panic!("no outcome for {file}"))
        .status
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_scenario_three_dates_two_zones() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    write_mock_input(&config.input_dir, "Extraction_precip.nc", &MockDataset::scenario());
    let engine = MockEngine::new();

    let report = run(&config, &engine).await.unwrap();

    assert_eq!(report.succeeded, 1);
    assert_eq!(report.failed, 0);
    assert_eq!(report.rows, 6);
    assert_eq!(report.export, config.output_dir.join("Summary_Extraction.csv"));

    let rows = read_export(&report.export);
    assert_eq!(rows.len(), 6);
    for row in &rows {
        assert_eq!(row.variable, "precip");
        assert_eq!(row.year, "2020");
        assert_eq!(row.month, "1");
        assert_eq!(row.level, 0);
        assert_eq!(row.count, 2);
        assert_eq!(row.area, 2.0);
    }

    let dates: Vec<&str> = rows.iter().map(|r| r.date.as_str()).collect();
    assert_eq!(
        dates,
        vec!["1/1/2020", "1/1/2020", "1/2/2020", "1/2/2020", "1/3/2020", "1/3/2020"]
    );

    // Slice 0: South holds 1 and 2, North holds 3 and 4.
    let south = &rows[0];
    assert_eq!((south.name.as_str(), south.zone_code), ("South", 1));
    assert_eq!(south.sum, 3.0);
    assert_eq!(south.mean, 1.5);
    assert_eq!(south.range, 1.0);
    let north = &rows[1];
    assert_eq!((north.name.as_str(), north.zone_code), ("North", 2));
    assert_eq!(north.sum, 7.0);

    // Every later slice adds its index to each cell.
    assert_eq!(rows[5].min, 5.0);
    assert_eq!(rows[5].max, 6.0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_keys_are_unique_and_dates_round_trip() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    write_mock_input(&config.input_dir, "Extraction_precip.nc", &MockDataset::scenario());
    write_mock_input(&config.input_dir, "Extraction_tmax.nc", &MockDataset::scenario());

    let report = run(&config, &MockEngine::new()).await.unwrap();
    assert_eq!(report.succeeded, 2);

    let rows = read_export(&report.export);
    assert_eq!(rows.len(), 12);

    let keys: HashSet<_> = rows.iter().map(StatRow::key).collect();
    assert_eq!(keys.len(), rows.len());

    for variable in ["precip", "tmax"] {
        let dates: HashSet<&str> = rows
            .iter()
            .filter(|r| r.variable == variable)
            .map(|r| r.date.as_str())
            .collect();
        assert_eq!(dates, HashSet::from(["1/1/2020", "1/2/2020", "1/3/2020"]));
    }

    // Sorted by variable first.
    assert!(rows[..6].iter().all(|r| r.variable == "precip"));
    assert!(rows[6..].iter().all(|r| r.variable == "tmax"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_malformed_file_does_not_affect_siblings() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    write_mock_input(&config.input_dir, "Extraction_precip.nc", &MockDataset::scenario());
    std::fs::write(config.input_dir.join("Extraction_broken.nc"), "not a dataset").unwrap();

    let report = run(&config, &MockEngine::new()).await.unwrap();

    assert_eq!(report.succeeded, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(report.rows, 6);
    match outcome_status(&report, "Extraction_broken.nc") {
        FileStatus::Failed { stage, .. } => assert_eq!(*stage, FileState::Inspecting),
        other => panic!("unexpected status {other:?}"),
    }
    assert_eq!(report.failures().len(), 1);
    assert!(read_export(&report.export).iter().all(|r| r.variable == "precip"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_ineligible_files_are_skipped() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    write_mock_input(&config.input_dir, "Extraction_precip.nc", &MockDataset::scenario());
    std::fs::write(config.input_dir.join("readme.txt"), "notes").unwrap();
    std::fs::write(config.input_dir.join("Extraction_.nc"), "{}").unwrap();
    std::fs::create_dir(config.input_dir.join("Extraction_dir.nc")).unwrap();

    let report = run(&config, &MockEngine::new()).await.unwrap();

    assert_eq!(report.succeeded, 1);
    assert_eq!(report.failed, 0);
    assert_eq!(report.skipped, 2);
    assert!(matches!(
        outcome_status(&report, "readme.txt"),
        FileStatus::Skipped { .. }
    ));
    assert!(!report.outcomes.iter().any(|o| o.file == "Extraction_dir.nc"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_missing_capability_stops_before_any_output() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    write_mock_input(&config.input_dir, "Extraction_precip.nc", &MockDataset::scenario());
    let engine = MockEngine::unavailable();

    let err = run(&config, &engine).await.unwrap_err();

    assert!(matches!(err, ExtractError::CapabilityUnavailable { .. }));
    assert_eq!(err.exit_code(), 1);
    assert!(!config.output_dir.exists());
    assert_eq!(engine.checkouts.load(Ordering::SeqCst), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_capability_is_checked_in_for_every_checkout() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    write_mock_input(&config.input_dir, "Extraction_precip.nc", &MockDataset::scenario());
    write_mock_input(&config.input_dir, "Extraction_tmax.nc", &MockDataset::scenario());
    let engine = MockEngine::new();

    run(&config, &engine).await.unwrap();

    // One lease for the run, one per worker.
    assert_eq!(engine.checkouts.load(Ordering::SeqCst), 3);
    assert_eq!(engine.checkins.load(Ordering::SeqCst), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_rerun_produces_identical_export() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    write_mock_input(&config.input_dir, "Extraction_precip.nc", &MockDataset::scenario());
    write_mock_input(&config.input_dir, "Extraction_tmax.nc", &MockDataset::scenario());

    let first = run(&config, &MockEngine::new()).await.unwrap();
    let first_bytes = std::fs::read(&first.export).unwrap();
    let second = run(&config, &MockEngine::new()).await.unwrap();
    let second_bytes = std::fs::read(&second.export).unwrap();

    assert_eq!(first.rows, second.rows);
    assert_eq!(first_bytes, second_bytes);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_export_header_matches_schema_even_when_empty() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());

    let report = run(&config, &MockEngine::new()).await.unwrap();
    assert_eq!(report.rows, 0);

    let text = std::fs::read_to_string(&report.export).unwrap();
    let header = text.lines().next().unwrap();
    let expected: Vec<&str> = SCHEMA.iter().map(|c| c.name).collect();
    assert_eq!(header, expected.join(","));
    assert_eq!(header.split(',').count(), 16);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_failing_slice_is_skipped_when_isolated() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    let mut dataset = MockDataset::scenario();
    dataset.fail_rasterize_at = vec![1];
    write_mock_input(&config.input_dir, "Extraction_precip.nc", &dataset);

    let report = run(&config, &MockEngine::new()).await.unwrap();

    assert_eq!(report.succeeded, 1);
    assert_eq!(report.rows, 4);
    assert_eq!(
        *outcome_status(&report, "Extraction_precip.nc"),
        FileStatus::Succeeded {
            rows: 4,
            slices: 2,
            skipped_slices: 1
        }
    );
    let dates: HashSet<String> = read_export(&report.export).into_iter().map(|r| r.date).collect();
    assert!(!dates.contains("1/2/2020"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_failing_slice_fails_file_when_not_isolated() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(dir.path());
    config.isolate_slice_failures = false;
    config.keep_tables = true;
    let mut dataset = MockDataset::scenario();
    dataset.fail_aggregate_at = vec![2];
    write_mock_input(&config.input_dir, "Extraction_precip.nc", &dataset);

    let report = run(&config, &MockEngine::new()).await.unwrap();

    assert_eq!(report.failed, 1);
    assert_eq!(report.rows, 0);
    match outcome_status(&report, "Extraction_precip.nc") {
        FileStatus::Failed { stage, .. } => assert_eq!(*stage, FileState::Aggregating),
        other => panic!("unexpected status {other:?}"),
    }
    // The partial table is gone even though tables are kept.
    assert!(!config.output_dir.join("summary_precip.tbl").exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_unparseable_date_fails_the_file() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    let dataset = MockDataset::with_times(&["01/01/2020 00:00:00 AM", "2020-01-02"]);
    write_mock_input(&config.input_dir, "Extraction_precip.nc", &dataset);
    write_mock_input(&config.input_dir, "Extraction_tmax.nc", &MockDataset::scenario());

    let report = run(&config, &MockEngine::new()).await.unwrap();

    assert_eq!(report.succeeded, 1);
    assert_eq!(report.failed, 1);
    match outcome_status(&report, "Extraction_precip.nc") {
        FileStatus::Failed { reason, .. } => assert!(reason.contains("2020-01-02")),
        other => panic!("unexpected status {other:?}"),
    }
    assert!(read_export(&report.export).iter().all(|r| r.variable == "tmax"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_fallback_date_format_and_absent_level() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    let mut dataset = MockDataset::with_times(&["12/31/1999"]);
    dataset.level_size = None;
    write_mock_input(&config.input_dir, "Extraction_precip.nc", &dataset);

    let report = run(&config, &MockEngine::new()).await.unwrap();

    let rows = read_export(&report.export);
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|r| r.date == "12/31/1999" && r.level == 0));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cleanup_keeps_lock_files_and_removes_tables() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    write_mock_input(&config.input_dir, "Extraction_precip.nc", &MockDataset::scenario());
    std::fs::create_dir_all(&config.output_dir).unwrap();
    let locks = [
        config.output_dir.join("Summary_Extraction.tbl.lock"),
        config.output_dir.join("summary_precip.tbl.sr.lock"),
    ];
    for lock in &locks {
        std::fs::write(lock, "").unwrap();
    }

    let report = run(&config, &MockEngine::new()).await.unwrap();

    for lock in &locks {
        assert!(lock.exists(), "{} was removed", lock.display());
    }
    assert!(report.export.exists());
    assert!(!config.output_dir.join("summary_precip.tbl").exists());
    assert!(!config.output_dir.join("Summary_Extraction.tbl").exists());
    assert_eq!(report.summary.removed, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_keep_tables_leaves_intermediates() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(dir.path());
    config.keep_tables = true;
    write_mock_input(&config.input_dir, "Extraction_precip.nc", &MockDataset::scenario());

    let report = run(&config, &MockEngine::new()).await.unwrap();

    assert_eq!(report.summary.removed, 0);
    assert!(config.output_dir.join("summary_precip.tbl").exists());
    assert!(report.summary.summary_table.exists());
}
