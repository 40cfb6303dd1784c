//! Defines command-line interface options using `clap` for the nc-zonal binary.

use clap::{Args as ClapArgs, Parser, Subcommand};
use nc_zonal::config::ExtractConfig;
use nc_zonal::errors::{ExtractError, Result};
use std::path::PathBuf;

/// Extract per-zone daily statistics from a directory of NetCDF files
#[derive(Parser, Debug)]
#[command(
    name = "nc-zonal",
    version,
    about = "Batch zonal statistics for gridded climate data",
    args_conflicts_with_subcommands = true
)]
pub struct Args {
    #[command(flatten)]
    pub run: RunArgs,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(ClapArgs, Debug, Default)]
pub struct RunArgs {
    /// TOML configuration file; flags below override its values
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Directory holding the input NetCDF files
    #[arg(long)]
    pub input_dir: Option<PathBuf>,

    /// Directory receiving the summary spreadsheet
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// GeoJSON zone layer
    #[arg(long)]
    pub zones: Option<PathBuf>,

    /// Property of the zone layer holding zone names
    #[arg(long)]
    pub zone_field: Option<String>,

    /// Number of files processed at once. Defaults to number of CPU cores.
    #[arg(short = 'w', long)]
    pub workers: Option<usize>,

    /// Seconds a single file may take before it is marked failed
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Keep per-file and summary tables next to the export
    #[arg(long, default_value_t = false)]
    pub keep_tables: bool,

    /// Run workers as threads of this process instead of child processes
    #[arg(long, default_value_t = false)]
    pub in_process: bool,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Process exactly one file and print its outcome as JSON
    #[command(hide = true)]
    Worker(WorkerArgs),
}

#[derive(ClapArgs, Debug)]
pub struct WorkerArgs {
    #[arg(long)]
    pub config_json: String,

    #[arg(long)]
    pub item_json: String,

    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl RunArgs {
    /// Merge the optional TOML file with the command-line overrides.
    pub fn to_config(&self) -> Result<ExtractConfig> {
        let mut config = match &self.config {
            Some(path) => ExtractConfig::from_toml_file(path)?,
            None => {
                let missing = |flag: &str| ExtractError::Config(format!("--{flag} is required without --config"));
                ExtractConfig::new(
                    self.input_dir.clone().ok_or_else(|| missing("input-dir"))?,
                    self.output_dir.clone().ok_or_else(|| missing("output-dir"))?,
                    self.zones.clone().ok_or_else(|| missing("zones"))?,
                )
            }
        };

        if let Some(dir) = &self.input_dir {
            config.input_dir = dir.clone();
        }
        if let Some(dir) = &self.output_dir {
            config.output_dir = dir.clone();
        }
        if let Some(zones) = &self.zones {
            config.zones = zones.clone();
        }
        if let Some(field) = &self.zone_field {
            config.zone_field = field.clone();
        }
        if self.workers.is_some() {
            config.workers = self.workers;
        }
        if let Some(secs) = self.timeout_secs {
            config.worker_timeout_secs = secs;
        }
        config.keep_tables |= self.keep_tables;

        config.validate()?;
        Ok(config)
    }
}
