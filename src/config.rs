// src/config.rs

use serde::{Deserialize, Serialize};
use std::{
    env, fs,
    path::{Path, PathBuf},
};
use tracing::info;

use crate::error::ConfigError;
use crate::process::{derive::DerivedMetric, load::SourceEncoding};

/// Environment variable naming a YAML config file.
pub const CONFIG_ENV: &str = "CENSUS_RESHAPE_CONFIG";

/// Default administrative-region key column.
pub const DEFAULT_KEY_COLUMN: &str = "행정구역";

/// Pipeline settings. Every field has a default, so a config file only needs
/// the keys it overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Column identifying the region; never transformed.
    pub key_column: String,
    /// Encodings the loader tries, in order.
    pub encodings: Vec<SourceEncoding>,
    /// Columns computed after reshaping, when their inputs exist.
    pub derived: Vec<DerivedMetric>,
    /// Where the CLI writes export files when no directory is given.
    pub output_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            key_column: DEFAULT_KEY_COLUMN.to_string(),
            encodings: SourceEncoding::DEFAULT_ORDER.to_vec(),
            derived: vec![DerivedMetric::average_household_size()],
            output_dir: PathBuf::from("output"),
        }
    }
}

impl Config {
    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&text)
    }

    /// Load from the file named by `CENSUS_RESHAPE_CONFIG`, or fall back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        match env::var_os(CONFIG_ENV) {
            Some(path) => {
                info!(path = ?path, "loading config");
                Self::load(path)
            }
            None => Ok(Self::default()),
        }
    }
}
