//! Pipeline configuration.
//!
//! Read from the TOML file given with `--config`. Every key is optional;
//! without a file the defaults describe the usual checkout layout:
//!
//! ```toml
//! csv_dir = "csvs"
//! first_year = 2003
//! last_year = 2015
//!
//! [paths]
//! streets = "geo/berlin_streets.geojson"
//! districts = "geo/polizeidirektionen.geojson"
//! district_name_property = "spatial_name"
//! aliases = "geo/missing_mapping.json"
//!
//! [layout]
//! late_suffix = false
//! ```

use std::path::{Path, PathBuf};

use accident_map_street_models::StreetDataPaths;
use accident_map_table::TableLayout;
use serde::{Deserialize, Serialize};

/// Errors loading the pipeline configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Invalid config {path}: {source}")]
    Toml {
        path: String,
        source: toml::de::Error,
    },
}

/// Settings shared by every subcommand.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Street network, district, and alias inputs.
    pub paths: StreetDataPaths,
    /// Layout of the yearly report tables.
    pub layout: TableLayout,
    /// Directory holding one `{year}.csv` table per report year.
    pub csv_dir: PathBuf,
    pub first_year: i32,
    pub last_year: i32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            paths: StreetDataPaths::default(),
            layout: TableLayout::default(),
            csv_dir: PathBuf::from("csvs"),
            first_year: 2003,
            last_year: 2015,
        }
    }
}

impl PipelineConfig {
    /// Loads the config at `path`, or the defaults when no path is given.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            log::debug!("No config file given; using defaults");
            return Ok(Self::default());
        };

        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config = toml::from_str(&text).map_err(|source| ConfigError::Toml {
            path: path.display().to_string(),
            source,
        })?;

        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// The table file for `year`.
    #[must_use]
    pub fn table_path(&self, year: i32) -> PathBuf {
        self.csv_dir.join(format!("{year}.csv"))
    }

    /// `requested` if non-empty, otherwise every configured year.
    #[must_use]
    pub fn years(&self, requested: &[i32]) -> Vec<i32> {
        if requested.is_empty() {
            (self.first_year..=self.last_year).collect()
        } else {
            requested.to_vec()
        }
    }
}
