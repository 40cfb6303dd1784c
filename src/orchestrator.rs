//! Parallel orchestration
//!
//! Discovers input files, decides every per-file table path before any
//! worker starts, and runs one worker per eligible file with at most
//! `PoolConfig::effective_workers()` running at once. Each worker runs
//! under its own timeout. One failure never cancels its siblings, and
//! `dispatch` returns only after every worker reached a terminal state.

use crate::config::ExtractConfig;
use crate::engine::GeoEngine;
use crate::errors::{ExtractError, Result};
use crate::inspector::variable_from_file_name;
use crate::manifest::{TableManifest, TableRole};
use crate::parallel::PoolConfig;
use crate::worker::{discard_partial_table, process_file_with_cancel, FileOutcome, FileState, WorkItem};
use crate::zones::ZoneLayer;
use async_trait::async_trait;
use futures::future::join_all;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;

/// Extension of the CSV-backed result tables.
pub const TABLE_EXTENSION: &str = "tbl";

/// File names in `input_dir`, sorted. Directories are ignored.
pub fn discover(input_dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(input_dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        match entry.file_name().into_string() {
            Ok(name) => names.push(name),
            Err(raw) => tracing::warn!(name = ?raw, "ignoring file with non UTF-8 name"),
        }
    }
    names.sort();
    Ok(names)
}

/// True when `file_name` follows the `<prefix><variable><suffix>` convention.
pub fn is_eligible(file_name: &str, config: &ExtractConfig) -> bool {
    variable_from_file_name(file_name, config).is_some()
}

/// Work decided before dispatch.
#[derive(Debug, Clone, Default)]
pub struct Plan {
    pub items: Vec<WorkItem>,
    pub skipped: Vec<FileOutcome>,
    pub manifest: TableManifest,
}

/// Split discovered files into work items and skipped files, and record the
/// per-file table of every work item in the manifest.
pub fn plan(files: &[String], config: &ExtractConfig) -> Plan {
    let mut plan = Plan::default();
    for name in files {
        let Some(variable) = variable_from_file_name(name, config) else {
            tracing::debug!(file = %name, "not eligible for extraction, skipping");
            plan.skipped.push(FileOutcome::skipped(
                name.clone(),
                format!(
                    "name does not match '{}<variable>{}'",
                    config.file_prefix, config.file_suffix
                ),
            ));
            continue;
        };
        let table = per_file_table_path(&config.output_dir, &variable);
        plan.manifest.record(
            &table,
            TableRole::PerFile,
            config.keep_tables,
            Some(name.clone()),
        );
        plan.items.push(WorkItem {
            file_name: name.clone(),
            input: config.input_dir.join(name),
            table,
        });
    }
    plan
}

pub fn per_file_table_path(output_dir: &Path, variable: &str) -> PathBuf {
    output_dir.join(format!("summary_{variable}.{TABLE_EXTENSION}"))
}

/// Runs one work item to a terminal state.
#[async_trait]
pub trait WorkerLauncher: Send + Sync {
    async fn launch(&self, item: WorkItem, timeout: Duration) -> FileOutcome;
}

/// Run every item, bounded by the pool size, and wait for all of them.
pub async fn dispatch<L>(items: Vec<WorkItem>, launcher: &L, pool: &PoolConfig) -> Vec<FileOutcome>
where
    L: WorkerLauncher + ?Sized,
{
    let workers = pool.effective_workers();
    let semaphore = Arc::new(Semaphore::new(workers));
    let started = Instant::now();
    tracing::info!(files = items.len(), workers, "dispatching workers");

    let tasks = items.into_iter().map(|item| {
        let semaphore = Arc::clone(&semaphore);
        let timeout = pool.timeout;
        async move {
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => return FileOutcome::failed(&item, FileState::Crashed, e.to_string()),
            };
            launcher.launch(item, timeout).await
        }
    });
    let outcomes = join_all(tasks).await;

    tracing::info!(
        files = outcomes.len(),
        elapsed_secs = started.elapsed().as_secs_f64(),
        "all workers finished"
    );
    outcomes
}

fn timed_out(item: &WorkItem, timeout: Duration) -> FileOutcome {
    let error = ExtractError::WorkerTimeout {
        file: item.file_name.clone(),
        secs: timeout.as_secs(),
    };
    tracing::error!(file = %item.file_name, error = %error, "worker timed out");
    discard_partial_table(item);
    FileOutcome::failed(item, FileState::from(&error), error.to_string())
}

fn crashed(item: &WorkItem, reason: impl Into<String>) -> FileOutcome {
    let error = ExtractError::Worker {
        file: item.file_name.clone(),
        reason: reason.into(),
    };
    tracing::error!(file = %item.file_name, error = %error, "worker crashed");
    discard_partial_table(item);
    FileOutcome::failed(item, FileState::from(&error), error.to_string())
}

/// Runs each file in a child process of `program`.
///
/// The child is invoked as `program worker --config-json .. --item-json ..`
/// and must print its [`FileOutcome`] as JSON on the last stdout line. A
/// child that outlives its timeout is killed.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    program: PathBuf,
    config_json: String,
    verbosity: u8,
}

impl ProcessLauncher {
    pub fn new(program: impl Into<PathBuf>, config: &ExtractConfig, verbosity: u8) -> Result<Self> {
        Ok(Self {
            program: program.into(),
            config_json: config.to_json()?,
            verbosity,
        })
    }

    /// Launcher that re-executes the running binary.
    pub fn current_exe(config: &ExtractConfig, verbosity: u8) -> Result<Self> {
        Self::new(std::env::current_exe()?, config, verbosity)
    }
}

#[async_trait]
impl WorkerLauncher for ProcessLauncher {
    async fn launch(&self, item: WorkItem, timeout: Duration) -> FileOutcome {
        let item_json = match serde_json::to_string(&item) {
            Ok(json) => json,
            Err(e) => return crashed(&item, e.to_string()),
        };

        let mut command = tokio::process::Command::new(&self.program);
        command
            .arg("worker")
            .arg("--config-json")
            .arg(&self.config_json)
            .arg("--item-json")
            .arg(item_json)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        if self.verbosity > 0 {
            command.arg(format!("-{}", "v".repeat(self.verbosity as usize)));
        }

        let child = match command.spawn() {
            Ok(child) => child,
            Err(e) => return crashed(&item, format!("spawn failed: {e}")),
        };
        tracing::debug!(file = %item.file_name, pid = ?child.id(), "worker process started");

        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Err(_) => return timed_out(&item, timeout),
            Ok(Err(e)) => return crashed(&item, e.to_string()),
            Ok(Ok(output)) => output,
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let report = stdout.lines().rev().find(|line| !line.trim().is_empty());
        match report.map(serde_json::from_str::<FileOutcome>) {
            Some(Ok(outcome)) => outcome,
            Some(Err(e)) => crashed(&item, format!("unreadable report ({e}), exit {}", output.status)),
            None => crashed(&item, format!("no report, exit {}", output.status)),
        }
    }
}

/// Runs each file on a blocking thread of the current process, with a fresh
/// engine from `factory` per file.
///
/// A timed-out file is reported failed and its thread is told to stop before
/// its next time slice. The slice in flight still runs to completion in the
/// background, after which the thread removes the table it was writing.
pub struct InProcessLauncher<F> {
    factory: Arc<F>,
    config: Arc<ExtractConfig>,
    zones: Arc<ZoneLayer>,
}

impl<F> InProcessLauncher<F> {
    pub fn new(factory: F, config: ExtractConfig, zones: ZoneLayer) -> Self {
        Self {
            factory: Arc::new(factory),
            config: Arc::new(config),
            zones: Arc::new(zones),
        }
    }
}

#[async_trait]
impl<F, E> WorkerLauncher for InProcessLauncher<F>
where
    F: Fn() -> E + Send + Sync + 'static,
    E: GeoEngine + 'static,
{
    async fn launch(&self, item: WorkItem, timeout: Duration) -> FileOutcome {
        let factory = Arc::clone(&self.factory);
        let config = Arc::clone(&self.config);
        let zones = Arc::clone(&self.zones);
        let task_item = item.clone();
        let cancel = Arc::new(AtomicBool::new(false));
        let task_cancel = Arc::clone(&cancel);

        let handle = tokio::task::spawn_blocking(move || {
            let engine = factory();
            process_file_with_cancel(&engine, &config, &zones, &task_item, &task_cancel)
        });

        match tokio::time::timeout(timeout, handle).await {
            Err(_) => {
                cancel.store(true, Ordering::SeqCst);
                timed_out(&item, timeout)
            }
            Ok(Err(e)) => crashed(&item, e.to_string()),
            Ok(Ok(outcome)) => outcome,
        }
    }
}
