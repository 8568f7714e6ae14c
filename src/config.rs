//! TOML configuration for the churn tools.
//!
//! `churn-risk.toml` lives in the application root (see [`crate::app_dirs`]).
//! A missing file yields defaults; every section and key is optional. Core
//! modules never read this file themselves: the binaries translate it into
//! explicit options.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::app_dirs::{self, AppDirError};
use crate::atomic_file;
use crate::calibration::{CalibrationOptions, DEFAULT_HIGH_QUANTILE, DEFAULT_MED_QUANTILE};
use crate::features::{DEFAULT_REGION, REGION_VOCAB, REQUIRED_FEATURES};
use crate::ml::ModelKind;
use crate::scoring::ServiceOptions;

/// Config file name inside the application root.
pub const CONFIG_FILE_NAME: &str = "churn-risk.toml";
/// Version selector meaning "greatest stored version".
pub const LATEST: &str = "latest";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unable to create config directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid config at {path}: {source}")]
    ParseToml {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Failed to serialize config for {path}: {source}")]
    SerializeToml {
        path: PathBuf,
        source: toml::ser::Error,
    },
    #[error("Invalid config value {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
    #[error(transparent)]
    AppDir(#[from] AppDirError),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChurnConfig {
    pub registry: RegistrySettings,
    pub scoring: ScoringSettings,
    pub training: TrainingSettings,
    pub evaluation: EvaluationSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrySettings {
    /// Store root; `None` means `<app root>/model_store`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_dir: Option<PathBuf>,
    /// `"latest"` or an exact version string.
    pub model_version: String,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            model_dir: None,
            model_version: LATEST.to_string(),
        }
    }
}

impl RegistrySettings {
    pub fn resolve_model_dir(&self) -> Result<PathBuf, ConfigError> {
        match &self.model_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(app_dirs::default_model_dir()?),
        }
    }

    /// Exact version to load, or `None` for the latest.
    pub fn requested_version(&self) -> Option<&str> {
        let version = self.model_version.trim();
        if version.is_empty() || version.eq_ignore_ascii_case(LATEST) {
            None
        } else {
            Some(version)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringSettings {
    pub default_region: String,
    pub required_features: Vec<String>,
}

impl Default for ScoringSettings {
    fn default() -> Self {
        Self {
            default_region: DEFAULT_REGION.to_string(),
            required_features: REQUIRED_FEATURES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl ScoringSettings {
    pub fn service_options(&self) -> ServiceOptions {
        ServiceOptions {
            default_region: self.default_region.clone(),
            required_features: self.required_features.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingSettings {
    /// Snapshot export endpoint queried with `startDate`/`endDate`/`tenantId`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub export_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    pub model_kind: ModelKind,
    pub window_days: u32,
    pub validation_fraction: f64,
    pub split_seed: u64,
    pub med_quantile: f64,
    pub high_quantile: f64,
    pub request_timeout_secs: u64,
    pub version_prefix: String,
}

impl Default for TrainingSettings {
    fn default() -> Self {
        Self {
            export_url: None,
            tenant_id: None,
            model_kind: ModelKind::GbdtStumpV1,
            window_days: 90,
            validation_fraction: 0.2,
            split_seed: 42,
            med_quantile: DEFAULT_MED_QUANTILE,
            high_quantile: DEFAULT_HIGH_QUANTILE,
            request_timeout_secs: 60,
            version_prefix: "risk".to_string(),
        }
    }
}

impl TrainingSettings {
    pub fn calibration(&self) -> CalibrationOptions {
        CalibrationOptions {
            med_q: self.med_quantile,
            high_q: self.high_quantile,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationSettings {
    pub window_days: u32,
    /// Where saved reports go; `None` means `<app root>/test_results`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_dir: Option<PathBuf>,
}

impl Default for EvaluationSettings {
    fn default() -> Self {
        Self {
            window_days: 30,
            report_dir: None,
        }
    }
}

impl ChurnConfig {
    /// Reject values the tools cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let fraction = self.training.validation_fraction;
        if !(fraction > 0.0 && fraction < 1.0) {
            return Err(ConfigError::Invalid {
                key: "training.validation_fraction",
                reason: format!("{fraction} is not strictly between 0 and 1"),
            });
        }
        let (med, high) = (self.training.med_quantile, self.training.high_quantile);
        if !(0.0..=1.0).contains(&med) || !(0.0..=1.0).contains(&high) || med > high {
            return Err(ConfigError::Invalid {
                key: "training.med_quantile",
                reason: format!("quantiles med={med} high={high} must satisfy 0 <= med <= high <= 1"),
            });
        }
        if self.training.window_days == 0 || self.evaluation.window_days == 0 {
            return Err(ConfigError::Invalid {
                key: "window_days",
                reason: "windows must cover at least one day".to_string(),
            });
        }
        let region = self.scoring.default_region.as_str();
        if !REGION_VOCAB.contains(&region) {
            return Err(ConfigError::Invalid {
                key: "scoring.default_region",
                reason: format!("{region:?} is not one of {}", REGION_VOCAB.join(", ")),
            });
        }
        Ok(())
    }
}

/// Path of the config file in the application root.
pub fn config_path() -> Result<PathBuf, ConfigError> {
    Ok(app_dirs::app_root_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the config from the application root, or defaults when absent.
pub fn load_or_default() -> Result<ChurnConfig, ConfigError> {
    load_from(&config_path()?)
}

/// Load and validate the config at `path`, or defaults when absent.
pub fn load_from(path: &Path) -> Result<ChurnConfig, ConfigError> {
    if !path.exists() {
        return Ok(ChurnConfig::default());
    }
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let config: ChurnConfig = toml::from_str(&text).map_err(|source| ConfigError::ParseToml {
        path: path.to_path_buf(),
        source,
    })?;
    config.validate()?;
    Ok(config)
}

/// Atomically write `config` to `path`, creating parent directories.
pub fn save_to(config: &ChurnConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| ConfigError::CreateDir {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let data = toml::to_string_pretty(config).map_err(|source| ConfigError::SerializeToml {
        path: path.to_path_buf(),
        source,
    })?;
    atomic_file::write_atomic(path, data.as_bytes()).map_err(|source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    })
}
