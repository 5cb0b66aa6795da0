//! Persisted test selection
//!
//! Stores which methods are selected, the run mode and repeat count
//! in a JSON file (`config/selected_tests.json` by default).

use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::catalog::TestCatalog;

#[derive(Debug, Error)]
pub enum SelectionError {
    #[error("Failed to read selection file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse selection file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Failed to write selection file: {0}")]
    Write(#[from] std::io::Error),

    #[error("Failed to serialize selection: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Which queued methods a run executes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RunMode {
    #[default]
    All,
    Smoke,
    Selected,
    /// Only the method or class named by `SelectedTests::specific`
    Specific,
}

/// Read side of a selection, as consumed when building the run queue
pub trait SelectionQuery {
    fn is_selected(&self, full_name: &str) -> bool;
    fn run_mode(&self) -> RunMode;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectedTest {
    pub selected: bool,
    pub class_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectedTests {
    pub run_mode: RunMode,
    /// Method or class name for `RunMode::Specific`
    pub specific: Option<String>,
    /// How many times the whole queue is run
    pub repeat_count: u32,
    /// Applied to virtual time before the first test
    pub default_time_scale: f32,
    /// Keyed by fully-qualified method name
    pub tests: BTreeMap<String, SelectedTest>,
}

impl Default for SelectedTests {
    fn default() -> Self {
        Self {
            run_mode: RunMode::All,
            specific: None,
            repeat_count: 1,
            default_time_scale: 1.0,
            tests: BTreeMap::new(),
        }
    }
}

impl SelectionQuery for SelectedTests {
    fn is_selected(&self, full_name: &str) -> bool {
        self.tests.get(full_name).is_some_and(|t| t.selected)
    }

    fn run_mode(&self) -> RunMode {
        self.run_mode
    }
}

impl SelectedTests {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SelectionError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| SelectionError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| SelectionError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load from file, or return defaults if missing or broken
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            info!("No selection file at {}, running all tests", path.display());
            return Self::default();
        }
        match Self::load(path) {
            Ok(selection) => {
                info!("Loaded test selection from {}", path.display());
                selection
            }
            Err(e) => {
                warn!("{}, using defaults", e);
                Self::default()
            }
        }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), SelectionError> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, json)?;
        info!("Saved test selection to {}", path.display());
        Ok(())
    }

    /// Mark a method selected or not; unknown names are added
    pub fn set_selected(&mut self, full_name: &str, selected: bool) {
        match self.tests.get_mut(full_name) {
            Some(test) => test.selected = selected,
            None => {
                let class_name = full_name
                    .rsplit_once('.')
                    .map(|(class, _)| class.to_string())
                    .unwrap_or_default();
                self.tests.insert(
                    full_name.to_string(),
                    SelectedTest {
                        selected,
                        class_name,
                    },
                );
            }
        }
    }

    /// Add catalog methods missing from the selection (unselected) and drop
    /// entries that no longer exist. Returns (added, removed).
    pub fn sync_with_catalog(&mut self, catalog: &TestCatalog) -> (usize, usize) {
        let mut known = BTreeMap::new();
        for class in catalog.classes() {
            for method in &class.methods {
                known.insert(method.full_name(), class.full_name());
            }
        }

        let before = self.tests.len();
        self.tests.retain(|name, _| known.contains_key(name));
        let removed = before - self.tests.len();

        let mut added = 0;
        for (name, class_name) in known {
            self.tests.entry(name).or_insert_with(|| {
                added += 1;
                SelectedTest {
                    selected: false,
                    class_name,
                }
            });
        }
        (added, removed)
    }
}
