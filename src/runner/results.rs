//! Aggregate results and the `test_results.json` summary

use std::fs;
use std::path::Path;

use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Failed to write report: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize results: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FailedTestResult {
    pub name: String,
    pub error_messages: Vec<String>,
}

/// Serialized form of `TestResults`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RunSummary {
    pub build: String,
    pub total: u32,
    pub ignored: u32,
    pub failed: u32,
    pub success: u32,
    pub ignore_tests_results: Vec<String>,
    pub failed_tests_results: Vec<FailedTestResult>,
    pub success_tests_results: Vec<String>,
}

/// Running aggregate for one suite run
#[derive(Debug, Clone, Default)]
pub struct TestResults {
    pub build: String,
    pub success: Vec<String>,
    pub failed: Vec<FailedTestResult>,
    pub ignored: Vec<String>,
}

impl TestResults {
    pub fn new(build: impl Into<String>) -> Self {
        Self {
            build: build.into(),
            ..Default::default()
        }
    }

    pub fn record_success(&mut self, name: &str) {
        self.success.push(name.to_string());
    }

    pub fn record_failure(&mut self, name: &str, error_messages: Vec<String>) {
        self.failed.push(FailedTestResult {
            name: name.to_string(),
            error_messages,
        });
    }

    pub fn record_ignored(&mut self, name: &str) {
        self.ignored.push(name.to_string());
    }

    pub fn total(&self) -> u32 {
        (self.success.len() + self.failed.len() + self.ignored.len()) as u32
    }

    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            build: self.build.clone(),
            total: self.total(),
            ignored: self.ignored.len() as u32,
            failed: self.failed.len() as u32,
            success: self.success.len() as u32,
            ignore_tests_results: self.ignored.clone(),
            failed_tests_results: self.failed.clone(),
            success_tests_results: self.success.clone(),
        }
    }

    pub fn write(&self, path: impl AsRef<Path>) -> Result<(), ReportError> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(&self.summary())?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, json)?;
        info!("Wrote test results to {}", path.display());
        Ok(())
    }
}
