//! Spreadsheet export
//!
//! The export step sits behind [`Exporter`] so other spreadsheet writers can
//! be plugged in. [`CsvExporter`] writes the summary rows in chronological
//! order, which is the first point where time order matters.

use crate::errors::Result;
use crate::table::{ResultTable, StatRow};
use std::path::{Path, PathBuf};

pub trait Exporter {
    /// File extension of the produced spreadsheet, without a dot.
    fn extension(&self) -> &str;

    /// Write `table` to `destination`.
    fn export(&self, table: &ResultTable, destination: &Path) -> Result<PathBuf>;
}

/// Writes the summary as a comma-separated spreadsheet.
#[derive(Debug, Clone, Copy, Default)]
pub struct CsvExporter;

impl Exporter for CsvExporter {
    fn extension(&self) -> &str {
        "csv"
    }

    fn export(&self, table: &ResultTable, destination: &Path) -> Result<PathBuf> {
        let mut rows = table.rows()?;
        sort_chronologically(&mut rows);

        let mut writer = csv::Writer::from_path(destination)?;
        for row in &rows {
            writer.serialize(row)?;
        }
        // An empty summary still gets its header row.
        if rows.is_empty() {
            writer.write_record(crate::table::SCHEMA.iter().map(|c| c.name))?;
        }
        writer.flush()?;
        tracing::info!(path = %destination.display(), rows = rows.len(), "summary exported");
        Ok(destination.to_path_buf())
    }
}

/// Order rows by variable, calendar date, then zone code.
pub fn sort_chronologically(rows: &mut [StatRow]) {
    rows.sort_by_key(|r| {
        (
            r.variable.clone(),
            r.year.parse::<i32>().unwrap_or(i32::MAX),
            r.month.parse::<u32>().unwrap_or(u32::MAX),
            r.day.parse::<u32>().unwrap_or(u32::MAX),
            r.zone_code,
            r.level,
        )
    });
}
