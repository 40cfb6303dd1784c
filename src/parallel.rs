//! Worker pool sizing
//!
//! The pool bounds how many files are extracted at once. It defaults to the
//! number of CPU cores, the same default the zonal reductions get from Rayon.

use crate::config::ExtractConfig;
use crate::errors::{ExtractError, Result};
use std::time::Duration;

/// Configuration for the per-file worker pool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    pub workers: Option<usize>,
    pub timeout: Duration,
}

impl PoolConfig {
    /// Create a new pool configuration
    pub fn new(workers: Option<usize>, timeout: Duration) -> Self {
        Self { workers, timeout }
    }

    /// Pool settings taken from a run configuration
    pub fn from_config(config: &ExtractConfig) -> Self {
        Self::new(
            config.workers,
            Duration::from_secs(config.worker_timeout_secs),
        )
    }

    /// Create a configuration that uses all available CPU cores
    pub fn all_cores(timeout: Duration) -> Self {
        Self::new(Some(num_cpus::get()), timeout)
    }

    /// Create a configuration that uses a specific number of workers
    pub fn with_workers(workers: usize, timeout: Duration) -> Self {
        Self::new(Some(workers), timeout)
    }

    /// Number of workers that may run at the same time
    pub fn effective_workers(&self) -> usize {
        self.workers.unwrap_or_else(num_cpus::get).max(1)
    }

    /// Size Rayon's global pool used by the zonal reductions.
    ///
    /// Only the first call in a process can succeed; later calls report a
    /// `Config` error.
    pub fn setup_reduction_pool(threads: usize) -> Result<()> {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .map_err(|e| {
                ExtractError::Config(format!(
                    "failed to initialize reduction pool with {threads} threads: {e}"
                ))
            })
    }
}

/// Get information about the current parallel environment
pub fn get_parallel_info() -> ParallelInfo {
    ParallelInfo {
        reduction_threads: rayon::current_num_threads(),
        available_cores: num_cpus::get(),
        available_parallelism: std::thread::available_parallelism()
            .map(|p| p.get())
            .unwrap_or(1),
    }
}

/// Information about the parallel processing environment
#[derive(Debug, Clone)]
pub struct ParallelInfo {
    pub reduction_threads: usize,
    pub available_cores: usize,
    pub available_parallelism: usize,
}

impl ParallelInfo {
    /// Log parallel processing information
    pub fn log(&self) {
        tracing::info!(
            reduction_threads = self.reduction_threads,
            available_cores = self.available_cores,
            available_parallelism = self.available_parallelism,
            "parallel environment"
        );
    }
}
