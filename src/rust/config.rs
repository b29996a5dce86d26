use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::debug;
use serde::Deserialize;

use crate::evaluation::RocOptions;
use crate::logging::LoggingConfig;
use crate::visualization::TsneOptions;

/// Configuration file read when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "phenoscope.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid configuration: {0}")]
    Validation(String),
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub logging: LoggingConfig,
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Serialized syndrome → subject → image → embedding mapping
    pub input: PathBuf,
    pub k_min: usize,
    pub k_max: usize,
    pub folds: usize,
    /// Fraction of samples held out for the ROC evaluation
    pub test_size: f64,
    pub seed: u64,
    /// Points of the false-positive-rate grid of the mean ROC curve
    pub roc_points: usize,
    pub perplexity: f64,
    pub tsne_max_iter: usize,
    /// Show charts in the terminal
    pub display: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            input: PathBuf::from("mini_gm_public_v0.1.p"),
            k_min: 1,
            k_max: 15,
            folds: 10,
            test_size: 0.2,
            seed: 42,
            roc_points: 100,
            perplexity: 30.0,
            tsne_max_iter: 1000,
            display: true,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.k_min == 0 || self.k_min > self.k_max {
            return Err(ConfigError::Validation(format!(
                "k range must satisfy 1 <= k_min <= k_max, got {}..={}",
                self.k_min, self.k_max
            )));
        }
        if self.folds < 2 {
            return Err(ConfigError::Validation(format!("folds must be at least 2, got {}", self.folds)));
        }
        if !(self.test_size > 0.0 && self.test_size < 1.0) {
            return Err(ConfigError::Validation(format!(
                "test_size must be in (0, 1), got {}",
                self.test_size
            )));
        }
        if self.roc_points < 2 {
            return Err(ConfigError::Validation(format!(
                "roc_points must be at least 2, got {}",
                self.roc_points
            )));
        }
        if !(self.perplexity > 0.0) {
            return Err(ConfigError::Validation(format!(
                "perplexity must be positive, got {}",
                self.perplexity
            )));
        }
        Ok(())
    }

    pub fn roc_options(&self) -> RocOptions {
        RocOptions {
            test_size: self.test_size,
            seed: self.seed,
            n_points: self.roc_points,
        }
    }

    pub fn tsne_options(&self) -> TsneOptions {
        TsneOptions {
            perplexity: self.perplexity,
            max_iter: self.tsne_max_iter,
            seed: self.seed,
            ..TsneOptions::default()
        }
    }
}

impl AppConfig {
    /// Reads and validates a TOML configuration.
    ///
    /// With `None`, [`DEFAULT_CONFIG_FILE`] is used if it exists and built-in defaults otherwise.
    /// An explicitly given path must exist.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    Self::from_file(default_path)?
                } else {
                    debug!("No {} found, using built-in defaults", DEFAULT_CONFIG_FILE);
                    Self::default()
                }
            }
        };
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.logging
            .level_filter()
            .map_err(|e| ConfigError::Validation(e.to_string()))?;
        self.pipeline.validate()
    }
}
