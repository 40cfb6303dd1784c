//! End-to-end extraction run.

use crate::compiler::{compile_summary, CompiledSummary};
use crate::config::ExtractConfig;
use crate::engine::{CapabilityLease, GeoEngine};
use crate::errors::Result;
use crate::export::Exporter;
use crate::orchestrator::{discover, dispatch, plan, WorkerLauncher};
use crate::parallel::{get_parallel_info, PoolConfig};
use crate::worker::{FileOutcome, FileStatus};
use crate::zones::ZoneLayer;
use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// What a finished run reports.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub rows: usize,
    pub export: PathBuf,
    pub outcomes: Vec<FileOutcome>,
    pub summary: CompiledSummary,
    pub elapsed: Duration,
}

impl RunReport {
    fn new(outcomes: Vec<FileOutcome>, summary: CompiledSummary, elapsed: Duration) -> Self {
        let merge_failed = |o: &FileOutcome| summary.merge_failures.iter().any(|(f, _)| *f == o.file);
        let succeeded = outcomes
            .iter()
            .filter(|o| o.is_success() && !merge_failed(o))
            .count();
        let failed = outcomes
            .iter()
            .filter(|o| o.is_failure() || (o.is_success() && merge_failed(o)))
            .count();
        let skipped = outcomes
            .iter()
            .filter(|o| matches!(o.status, FileStatus::Skipped { .. }))
            .count();
        Self {
            succeeded,
            failed,
            skipped,
            rows: summary.rows,
            export: summary.export.clone(),
            outcomes,
            summary,
            elapsed,
        }
    }

    /// Failed files with their reason.
    pub fn failures(&self) -> Vec<(String, String)> {
        let mut failures: Vec<(String, String)> = self
            .outcomes
            .iter()
            .filter_map(|o| match &o.status {
                FileStatus::Failed { stage, reason } => {
                    Some((o.file.clone(), format!("{stage}: {reason}")))
                }
                _ => None,
            })
            .collect();
        failures.extend(self.summary.merge_failures.iter().cloned());
        failures
    }

    /// Print the completion message.
    pub fn print_summary(&self) {
        println!("\n Extraction complete");
        println!("=====================");
        println!("   Succeeded: {}", self.succeeded);
        println!("   Failed: {}", self.failed);
        println!("   Skipped: {}", self.skipped);
        println!("   Rows: {}", self.rows);
        for (file, reason) in self.failures() {
            println!("   ✗ {file}: {reason}");
        }
        println!("\n✅ Check {} for the created summary file.", self.export.display());
        println!(" Total runtime: {:.2} seconds", self.elapsed.as_secs_f64());
    }
}

/// Run a full extraction.
///
/// The capability is checked before anything is written, so a missing
/// capability leaves the output directory untouched.
pub async fn run_extraction<E, L>(
    config: &ExtractConfig,
    engine: &E,
    launcher: &L,
    exporter: &dyn Exporter,
) -> Result<RunReport>
where
    E: GeoEngine,
    L: WorkerLauncher + ?Sized,
{
    let started = Instant::now();
    config.validate()?;

    let lease = CapabilityLease::acquire(engine)?;
    tracing::info!("capability retrieved");

    let zones = ZoneLayer::from_geojson_path(&config.zones, &config.zone_field)?;
    tracing::info!(zones = zones.len(), field = %config.zone_field, "zone layer loaded");
    get_parallel_info().log();

    fs::create_dir_all(&config.output_dir)?;
    let files = discover(&config.input_dir)?;
    let mut plan = plan(&files, config);
    tracing::info!(
        discovered = files.len(),
        eligible = plan.items.len(),
        skipped = plan.skipped.len(),
        "input discovered"
    );

    let pool = PoolConfig::from_config(config);
    let mut outcomes = dispatch(std::mem::take(&mut plan.items), launcher, &pool).await;
    outcomes.append(&mut plan.skipped);

    let summary = compile_summary(config, &outcomes, &mut plan.manifest, exporter)?;
    drop(lease);

    let report = RunReport::new(outcomes, summary, started.elapsed());
    tracing::info!(
        succeeded = report.succeeded,
        failed = report.failed,
        skipped = report.skipped,
        rows = report.rows,
        "run finished"
    );
    Ok(report)
}
