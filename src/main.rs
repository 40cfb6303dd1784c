//! Entry point for the nc-zonal application.
//! Parses the CLI, then either runs a full extraction or, as a hidden
//! `worker` subcommand, processes a single file for the process pool.

use anyhow::Context;
use clap::Parser;
use nc_zonal::config::ExtractConfig;
use nc_zonal::engine::NetcdfEngine;
use nc_zonal::errors::ExtractError;
use nc_zonal::export::CsvExporter;
use nc_zonal::logging;
use nc_zonal::orchestrator::{InProcessLauncher, ProcessLauncher};
use nc_zonal::parallel::PoolConfig;
use nc_zonal::run::{run_extraction, RunReport};
use nc_zonal::worker::{process_file_with_netcdf, WorkItem};
use nc_zonal::zones::ZoneLayer;
use std::process;

mod cli;

use cli::{Args, Command, RunArgs, WorkerArgs};

fn main() {
    let args = Args::parse();

    match args.command {
        Some(Command::Worker(worker_args)) => {
            logging::init(worker_args.verbose);
            if let Err(e) = worker_main(worker_args) {
                eprintln!("Worker error: {e:#}");
                process::exit(2);
            }
        }
        None => {
            logging::init(args.run.verbose);
            match run_main(&args.run) {
                Ok(report) => report.print_summary(),
                Err(e) => {
                    eprintln!("❌ {e}");
                    process::exit(e.exit_code());
                }
            }
        }
    }
}

fn run_main(args: &RunArgs) -> Result<RunReport, ExtractError> {
    println!("------------------------------------------------------------------");
    println!("        nc-zonal: zonal statistics for NetCDF climate data");
    println!("------------------------------------------------------------------");

    let config = args.to_config()?;
    let engine = NetcdfEngine::from_config(&config);
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    if args.in_process {
        let zones = ZoneLayer::from_geojson_path(&config.zones, &config.zone_field)?;
        let factory_config = config.clone();
        let launcher = InProcessLauncher::new(
            move || NetcdfEngine::from_config(&factory_config),
            config.clone(),
            zones,
        );
        runtime.block_on(run_extraction(&config, &engine, &launcher, &CsvExporter))
    } else {
        let launcher = ProcessLauncher::current_exe(&config, args.verbose)?;
        runtime.block_on(run_extraction(&config, &engine, &launcher, &CsvExporter))
    }
}

fn worker_main(args: WorkerArgs) -> anyhow::Result<()> {
    let config = ExtractConfig::from_json(&args.config_json).context("invalid --config-json")?;
    let item: WorkItem = serde_json::from_str(&args.item_json).context("invalid --item-json")?;

    // Share the cores between concurrently running worker processes.
    let workers = PoolConfig::from_config(&config).effective_workers();
    let threads = (num_cpus::get() / workers).max(1);
    if let Err(e) = PoolConfig::setup_reduction_pool(threads) {
        tracing::debug!(error = %e, "keeping default reduction pool");
    }

    let outcome = process_file_with_netcdf(&config, &item);
    println!("{}", serde_json::to_string(&outcome).context("serializing outcome")?);
    Ok(())
}
