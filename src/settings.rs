//! Persistent runner settings
//!
//! Loaded from `config/test_runner.json`; every field has a default so a
//! missing or partial file still produces a usable configuration.

use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::catalog::TargetResolution;
use crate::constants::{
    DATA_DIR_NAME, DEFAULT_RESOLUTION, DEFAULT_TIMEOUT_MS, PERMITTED_ERRORS_FILE, SETTINGS_FILE,
    SUSPENSION_KEYWORD,
};

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Failed to read settings file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse settings file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Failed to write settings file: {0}")]
    Write(#[from] std::io::Error),

    #[error("Failed to serialize settings: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerSettings {
    /// Where the run log and results file go. `None` = platform data dir.
    pub output_dir: Option<PathBuf>,
    /// Searched for test sources when reconstructing failure locations
    pub source_roots: Vec<PathBuf>,
    /// Token counted as one suspension point in test sources
    pub suspension_keyword: String,
    pub default_timeout_ms: u64,
    /// Build label written into the results file
    pub build: String,
    /// Resolution the game runs at; also the fallback for unmatched targets
    pub resolution: (u32, u32),
    /// Print TeamCity service messages to stdout
    pub teamcity: bool,
    pub permitted_errors_file: PathBuf,
    /// Write the run log and results file
    pub persist_reports: bool,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            output_dir: None,
            source_roots: vec![PathBuf::from("src"), PathBuf::from("tests")],
            suspension_keyword: SUSPENSION_KEYWORD.to_string(),
            default_timeout_ms: DEFAULT_TIMEOUT_MS,
            build: "local".to_string(),
            resolution: DEFAULT_RESOLUTION,
            teamcity: true,
            permitted_errors_file: PathBuf::from(PERMITTED_ERRORS_FILE),
            persist_reports: true,
        }
    }
}

impl RunnerSettings {
    /// Load settings from the default file, or return defaults
    pub fn load() -> Self {
        Self::load_or_default(SETTINGS_FILE)
    }

    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            info!("No {} found, using default runner settings", path.display());
            return Self::default();
        }
        match Self::load_from(path) {
            Ok(settings) => {
                info!("Loaded runner settings from {}", path.display());
                settings
            }
            Err(e) => {
                warn!("{}, using defaults", e);
                Self::default()
            }
        }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), SettingsError> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, json)?;
        info!("Saved runner settings to {}", path.display());
        Ok(())
    }

    /// Configured output dir, else `<data dir>/playtest`, else `./playtest`
    pub fn output_dir(&self) -> PathBuf {
        if let Some(dir) = &self.output_dir {
            return dir.clone();
        }
        dirs::data_local_dir()
            .map(|d| d.join(DATA_DIR_NAME))
            .unwrap_or_else(|| PathBuf::from(DATA_DIR_NAME))
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }

    pub fn resolution(&self) -> TargetResolution {
        self.resolution.into()
    }
}
