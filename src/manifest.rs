//! Table manifest
//!
//! Every table a run creates is recorded here when its path is decided,
//! together with whether it is kept after the run. Cleanup deletes exactly
//! the scratch entries, so files the run did not create (lock markers,
//! earlier exports) are never touched.

use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableRole {
    /// Per-file result table written by one worker.
    PerFile,
    /// Union of all per-file tables.
    Summary,
    /// Final spreadsheet handed to the user.
    Export,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub path: PathBuf,
    pub role: TableRole,
    pub keep: bool,
    /// Input file the table belongs to, for per-file tables.
    pub source: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableManifest {
    entries: Vec<ManifestEntry>,
}

impl TableManifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, path: impl Into<PathBuf>, role: TableRole, keep: bool, source: Option<String>) {
        self.entries.push(ManifestEntry {
            path: path.into(),
            role,
            keep,
            source,
        });
    }

    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    /// Per-file table recorded for `source`.
    pub fn per_file_table(&self, source: &str) -> Option<&Path> {
        self.entries
            .iter()
            .find(|e| e.role == TableRole::PerFile && e.source.as_deref() == Some(source))
            .map(|e| e.path.as_path())
    }

    pub fn with_role(&self, role: TableRole) -> impl Iterator<Item = &ManifestEntry> {
        self.entries.iter().filter(move |e| e.role == role)
    }

    /// Entries to delete once the export is written.
    pub fn scratch(&self) -> impl Iterator<Item = &ManifestEntry> {
        self.entries.iter().filter(|e| !e.keep)
    }
}
