//! Result tables
//!
//! Per-file tables and the summary table share one 16-column schema and are
//! stored as CSV files whose header row is the column list. Every open or
//! merge checks the header against [`SCHEMA`], so a table written by a
//! different schema is rejected before any row is copied.

use crate::errors::{ExtractError, Result};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

/// Storage type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Text { width: usize },
    Long,
    Double,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub kind: ColumnKind,
}

const fn text(name: &'static str, width: usize) -> Column {
    Column {
        name,
        kind: ColumnKind::Text { width },
    }
}

const fn long(name: &'static str) -> Column {
    Column {
        name,
        kind: ColumnKind::Long,
    }
}

const fn double(name: &'static str) -> Column {
    Column {
        name,
        kind: ColumnKind::Double,
    }
}

/// Columns of every result table, in storage order.
pub const SCHEMA: [Column; 16] = [
    text("NAME", 24),
    text("thedate", 10),
    text("YEAR", 4),
    text("MONTH", 2),
    text("DAY", 2),
    text("TYPE", 20),
    long("LEVEL"),
    long("ZONE_CODE"),
    long("COUNT"),
    double("AREA"),
    double("MIN"),
    double("MAX"),
    double("RANGE"),
    double("MEAN"),
    double("STD"),
    double("SUM"),
];

/// Width of a text column, `None` for numeric or unknown columns.
pub fn text_width(name: &str) -> Option<usize> {
    SCHEMA.iter().find(|c| c.name == name).and_then(|c| match c.kind {
        ColumnKind::Text { width } => Some(width),
        _ => None,
    })
}

/// Truncate `value` to the width of text column `column`.
pub fn clip(column: &str, value: &str) -> String {
    match text_width(column) {
        Some(width) => value.chars().take(width).collect(),
        None => value.to_string(),
    }
}

fn schema_names() -> Vec<&'static str> {
    SCHEMA.iter().map(|c| c.name).collect()
}

/// One fully tagged result row.
///
/// Rows are only produced by [`crate::tagger::tag`], so every row carries
/// its date, variable and level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatRow {
    #[serde(rename = "NAME")]
    pub name: String,
    #[serde(rename = "thedate")]
    pub date: String,
    #[serde(rename = "YEAR")]
    pub year: String,
    #[serde(rename = "MONTH")]
    pub month: String,
    #[serde(rename = "DAY")]
    pub day: String,
    #[serde(rename = "TYPE")]
    pub variable: String,
    #[serde(rename = "LEVEL")]
    pub level: i64,
    #[serde(rename = "ZONE_CODE")]
    pub zone_code: i64,
    #[serde(rename = "COUNT")]
    pub count: i64,
    #[serde(rename = "AREA")]
    pub area: f64,
    #[serde(rename = "MIN")]
    pub min: f64,
    #[serde(rename = "MAX")]
    pub max: f64,
    #[serde(rename = "RANGE")]
    pub range: f64,
    #[serde(rename = "MEAN")]
    pub mean: f64,
    #[serde(rename = "STD")]
    pub std: f64,
    #[serde(rename = "SUM")]
    pub sum: f64,
}

impl StatRow {
    /// Key that is unique within a table.
    pub fn key(&self) -> (String, String, String, i64) {
        (
            self.name.clone(),
            self.date.clone(),
            self.variable.clone(),
            self.level,
        )
    }
}

/// CSV-backed append-only table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultTable {
    path: PathBuf,
}

impl ResultTable {
    /// Create an empty table at `path`, replacing any existing file.
    pub fn create(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut writer = csv::Writer::from_path(&path)?;
        writer.write_record(schema_names())?;
        writer.flush()?;
        Ok(Self { path })
    }

    /// Open an existing table, checking its columns.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let table = Self { path: path.into() };
        table.check_schema()?;
        Ok(table)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn check_schema(&self) -> Result<()> {
        let mut reader = csv::Reader::from_path(&self.path)?;
        let found: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        let expected = schema_names();
        if found.len() != expected.len() || found.iter().zip(&expected).any(|(f, e)| f != e) {
            return Err(ExtractError::Schema {
                table: self.path.clone(),
                expected: expected.join(", "),
                found: found.join(", "),
            });
        }
        Ok(())
    }

    /// Append rows after the existing ones. Returns the number written.
    pub fn append(&self, rows: &[StatRow]) -> Result<usize> {
        self.check_schema()?;
        let file = OpenOptions::new().append(true).open(&self.path)?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        for row in rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
        Ok(rows.len())
    }

    /// Read every row in storage order.
    pub fn rows(&self) -> Result<Vec<StatRow>> {
        self.check_schema()?;
        let mut reader = csv::Reader::from_path(&self.path)?;
        reader
            .deserialize::<StatRow>()
            .map(|row| {
                row.map_err(|e| ExtractError::Schema {
                    table: self.path.clone(),
                    expected: schema_names().join(", "),
                    found: format!("row not matching column types ({e})"),
                })
            })
            .collect()
    }

    pub fn row_count(&self) -> Result<usize> {
        Ok(self.rows()?.len())
    }

    /// Remove the table from disk.
    pub fn delete(self) -> Result<()> {
        fs::remove_file(&self.path)?;
        Ok(())
    }
}

/// Append every row of `source` to `dest`.
///
/// Both tables are validated and the source is fully read before anything
/// is written, so a mismatch leaves `dest` unchanged.
pub fn merge(dest: &ResultTable, source: &ResultTable) -> Result<usize> {
    dest.check_schema()?;
    let rows = source.rows()?;
    dest.append(&rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_has_sixteen_typed_columns() {
        assert_eq!(SCHEMA.len(), 16);
        assert_eq!(text_width("NAME"), Some(24));
        assert_eq!(text_width("thedate"), Some(10));
        assert_eq!(text_width("COUNT"), None);
        assert_eq!(SCHEMA[6], long("LEVEL"));
        assert_eq!(SCHEMA[15], double("SUM"));
    }

    #[test]
    fn clip_respects_column_width() {
        assert_eq!(clip("YEAR", "20201"), "2020");
        assert_eq!(clip("TYPE", "precip"), "precip");
        assert_eq!(clip("MEAN", "anything"), "anything");
    }
}
