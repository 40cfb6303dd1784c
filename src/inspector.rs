//! Dataset inspection
//!
//! Opens one gridded input through the engine and exposes its dimensions,
//! the ordered time axis, and the fixed auxiliary (level) dimension.

use crate::config::ExtractConfig;
use crate::engine::{DimensionValue, GeoEngine};
use crate::errors::{ExtractError, Result};
use std::path::{Path, PathBuf};

/// The auxiliary dimension held at one configured value for every slice.
///
/// Kept for output compatibility: the level is written to every row even
/// when the file does not carry the dimension at all.
#[derive(Debug, Clone, PartialEq)]
pub struct LevelDimension {
    pub name: String,
    pub value: i64,
    /// Size of the dimension in the file, `None` when absent.
    pub size: Option<usize>,
}

impl LevelDimension {
    pub fn is_present(&self) -> bool {
        self.size.is_some()
    }
}

/// Metadata of one dimension.
#[derive(Debug, Clone, PartialEq)]
pub struct DimensionInfo {
    pub name: String,
    pub size: usize,
}

/// An opened input file. Owned by exactly one worker.
pub struct Dataset<'e, E: GeoEngine> {
    engine: &'e E,
    handle: E::Dataset,
    path: PathBuf,
    variable: String,
    time_dimension: String,
    dimensions: Vec<DimensionInfo>,
    level: LevelDimension,
}

impl<'e, E: GeoEngine> Dataset<'e, E> {
    /// Open `path` and check that it has the configured time dimension.
    pub fn open(engine: &'e E, path: &Path, config: &ExtractConfig) -> Result<Self> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| ExtractError::Format {
                path: path.to_path_buf(),
                reason: "file name is not valid UTF-8".to_string(),
            })?;
        let variable = variable_from_file_name(file_name, config).ok_or_else(|| {
            ExtractError::Format {
                path: path.to_path_buf(),
                reason: format!(
                    "name does not follow '{}<variable>{}'",
                    config.file_prefix, config.file_suffix
                ),
            }
        })?;

        let handle = engine.open_dataset(path)?;
        let mut dimensions = Vec::new();
        for name in engine.list_dimensions(&handle) {
            let size = engine.dimension_size(&handle, &name)?;
            dimensions.push(DimensionInfo { name, size });
        }

        if !dimensions.iter().any(|d| d.name == config.time_dimension) {
            return Err(ExtractError::Format {
                path: path.to_path_buf(),
                reason: format!("no '{}' dimension", config.time_dimension),
            });
        }

        let level = LevelDimension {
            name: config.level_dimension.clone(),
            value: config.level,
            size: dimensions
                .iter()
                .find(|d| d.name == config.level_dimension)
                .map(|d| d.size),
        };
        if !level.is_present() {
            tracing::debug!(
                path = %path.display(),
                dimension = %level.name,
                "level dimension absent, tagging rows with the configured level only"
            );
        }

        Ok(Self {
            engine,
            handle,
            path: path.to_path_buf(),
            variable,
            time_dimension: config.time_dimension.clone(),
            dimensions,
            level,
        })
    }

    pub fn engine(&self) -> &'e E {
        self.engine
    }

    pub fn handle(&self) -> &E::Dataset {
        &self.handle
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Variable name derived from the file name.
    pub fn variable(&self) -> &str {
        &self.variable
    }

    pub fn dimensions(&self) -> &[DimensionInfo] {
        &self.dimensions
    }

    pub fn level(&self) -> &LevelDimension {
        &self.level
    }

    pub fn time_dimension(&self) -> &str {
        &self.time_dimension
    }

    pub fn dimension_size(&self, name: &str) -> Result<usize> {
        self.dimensions
            .iter()
            .find(|d| d.name == name)
            .map(|d| d.size)
            .ok_or_else(|| ExtractError::Format {
                path: self.path.clone(),
                reason: format!("dimension '{name}' not found"),
            })
    }

    /// Number of time steps.
    pub fn time_len(&self) -> Result<usize> {
        self.dimension_size(&self.time_dimension)
    }

    /// Raw coordinate values of `name`, in the dataset's native order.
    pub fn dimension_values(&self, name: &str) -> Result<Vec<DimensionValue>> {
        let size = self.dimension_size(name)?;
        (0..size)
            .map(|i| self.engine.dimension_value(&self.handle, name, i))
            .collect()
    }

    pub fn time_value(&self, index: usize) -> Result<DimensionValue> {
        self.engine
            .dimension_value(&self.handle, &self.time_dimension, index)
    }
}

/// Strip the configured prefix and suffix from an input file name.
///
/// Returns `None` when the name does not follow the convention or leaves an
/// empty variable name.
pub fn variable_from_file_name(file_name: &str, config: &ExtractConfig) -> Option<String> {
    file_name
        .strip_prefix(&config.file_prefix)?
        .strip_suffix(&config.file_suffix)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
