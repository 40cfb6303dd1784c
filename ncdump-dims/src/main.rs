//! Prints the dimensions and time axis of one input file as the extractor
//! would see them, and whether the file name is eligible for extraction.

use clap::Parser;
use nc_zonal::config::ExtractConfig;
use nc_zonal::engine::NetcdfEngine;
use nc_zonal::inspector::{variable_from_file_name, Dataset};
use nc_zonal::timeslice::TimeSlice;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "ncdump-dims", about = "Show how nc-zonal reads a NetCDF file")]
struct Args {
    /// Path to the NetCDF file
    file: PathBuf,

    /// Optional TOML configuration used by nc-zonal
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of time values to print
    #[arg(long, default_value_t = 5)]
    head: usize,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    nc_zonal::logging::init(0);

    let config = match &args.config {
        Some(path) => ExtractConfig::from_toml_file(path)?,
        None => ExtractConfig::new(".", ".", "zones.geojson"),
    };

    let name = args
        .file
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    match variable_from_file_name(name, &config) {
        Some(variable) => println!("Eligible: yes (variable '{variable}')"),
        None => println!(
            "Eligible: no (expected '{}<variable>{}')",
            config.file_prefix, config.file_suffix
        ),
    }

    let engine = NetcdfEngine::from_config(&config);
    let dataset = Dataset::open(&engine, &args.file, &config)?;

    println!("\nDimensions:");
    for dimension in dataset.dimensions() {
        println!("  Name: {}, Size: {}", dimension.name, dimension.size);
    }

    let level = dataset.level();
    println!(
        "\nLevel dimension '{}': {} (fixed value {})",
        level.name,
        level.size.map_or("absent".to_string(), |s| format!("size {s}")),
        level.value
    );

    let values = dataset.dimension_values(dataset.time_dimension())?;
    println!("\nTime axis ({} values):", values.len());
    for (index, raw) in values.into_iter().enumerate().take(args.head) {
        match TimeSlice::new(
            index,
            raw.clone(),
            &config.primary_time_format,
            &config.fallback_time_format,
        ) {
            Ok(slice) => println!("  [{index}] {raw} -> {}", slice.date.justdate()),
            Err(e) => println!("  [{index}] {raw} -> {e}"),
        }
    }

    Ok(())
}
