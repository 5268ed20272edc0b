// Application configuration, loaded from a JSON file with defaults for anything missing

use crate::dispatch::FixPolicy;
use crate::nmea::DEFAULT_MAX_SENTENCE_LENGTH;
use crate::params::Parameters;
use crate::sink::DEFAULT_DEVICE_ID;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Agrello units talk at 4800 baud
pub const DEFAULT_BAUD_RATE: u32 = 4800;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppConfig {
    /// Serial port of the ADF unit, e.g. `/dev/ttyUSB0`
    pub port: Option<String>,
    pub baud_rate: u32,
    /// Identity used in the cloud envelope
    pub device_id: String,
    pub max_sentence_length: usize,
    pub fix_policy: FixPolicy,
    /// Directory for per-report JSON files; reports go to stdout when unset
    pub results_dir: Option<PathBuf>,
    pub parameters: Parameters,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: DEFAULT_BAUD_RATE,
            device_id: DEFAULT_DEVICE_ID.to_string(),
            max_sentence_length: DEFAULT_MAX_SENTENCE_LENGTH,
            fix_policy: FixPolicy::default(),
            results_dir: None,
            parameters: Parameters::default(),
        }
    }
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Load from `path`, falling back to defaults when missing or unreadable
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            log::info!("No config at {}, using defaults", path.display());
            return Self::default();
        }

        match Self::load(path) {
            Ok(config) => {
                log::info!("Loaded config from {}", path.display());
                config
            }
            Err(e) => {
                log::warn!("Failed to load config {}: {}, using defaults", path.display(), e);
                Self::default()
            }
        }
    }
}

/// Get config directory path
pub fn config_dir() -> PathBuf {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".config").join("foxhunt-relay")
}

pub fn default_config_path() -> PathBuf {
    config_dir().join("config.json")
}
