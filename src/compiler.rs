//! Summary compilation
//!
//! Runs single-threaded after the join barrier: unions the per-file tables
//! of every succeeded file into the summary table, exports it, then removes
//! the scratch tables recorded in the manifest.

use crate::config::ExtractConfig;
use crate::errors::Result;
use crate::export::Exporter;
use crate::manifest::{TableManifest, TableRole};
use crate::orchestrator::TABLE_EXTENSION;
use crate::table::{merge, ResultTable};
use crate::worker::FileOutcome;
use std::fs;
use std::path::PathBuf;

/// Result of the compile step.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledSummary {
    pub summary_table: PathBuf,
    pub export: PathBuf,
    pub rows: usize,
    pub merged_tables: usize,
    /// Files whose table could not be merged, with the reason.
    pub merge_failures: Vec<(String, String)>,
    pub removed: usize,
}

/// Union, export and clean up.
pub fn compile_summary(
    config: &ExtractConfig,
    outcomes: &[FileOutcome],
    manifest: &mut TableManifest,
    exporter: &dyn Exporter,
) -> Result<CompiledSummary> {
    let summary_path = config
        .output_dir
        .join(format!("{}.{TABLE_EXTENSION}", config.summary_name));
    manifest.record(&summary_path, TableRole::Summary, config.keep_tables, None);
    let summary = ResultTable::create(&summary_path)?;

    let mut rows = 0;
    let mut merged_tables = 0;
    let mut merge_failures = Vec::new();

    for outcome in outcomes.iter().filter(|o| o.is_success()) {
        let Some(path) = manifest.per_file_table(&outcome.file) else {
            tracing::warn!(file = %outcome.file, "succeeded file has no recorded table");
            merge_failures.push((outcome.file.clone(), "no recorded table".to_string()));
            continue;
        };
        tracing::debug!(file = %outcome.file, table = %path.display(), "merging table");
        let merged = ResultTable::open(path).and_then(|source| merge(&summary, &source));
        match merged {
            Ok(n) => {
                rows += n;
                merged_tables += 1;
            }
            Err(e) => {
                tracing::error!(file = %outcome.file, error = %e, "table not merged");
                merge_failures.push((outcome.file.clone(), e.to_string()));
            }
        }
    }

    let export_path = config
        .output_dir
        .join(format!("{}.{}", config.summary_name, exporter.extension()));
    manifest.record(&export_path, TableRole::Export, true, None);
    let export = exporter.export(&summary, &export_path)?;

    let removed = cleanup(manifest);

    Ok(CompiledSummary {
        summary_table: summary_path,
        export,
        rows,
        merged_tables,
        merge_failures,
        removed,
    })
}

/// Delete every scratch entry of the manifest that exists on disk.
pub fn cleanup(manifest: &TableManifest) -> usize {
    let mut removed = 0;
    for entry in manifest.scratch() {
        if !entry.path.exists() {
            continue;
        }
        match fs::remove_file(&entry.path) {
            Ok(()) => removed += 1,
            Err(e) => tracing::warn!(path = %entry.path.display(), error = %e, "could not remove scratch table"),
        }
    }
    removed
}
