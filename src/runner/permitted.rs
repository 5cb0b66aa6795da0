//! Registry of error logs that must not fail the current test
//!
//! Loaded from TOML:
//!
//! ```toml
//! [[permitted]]
//! message = "Audio device lost"
//! match = "contains"
//!
//! [[permitted]]
//! message = "^Shader .* fell back"
//! match = "regex"
//! stack = "^render::.*pipeline$"
//! stack_match = "regex"
//! ```
//!
//! `match` defaults to `exact`; `stack_match` defaults to `contains`.

use std::fs;
use std::path::{Path, PathBuf};

use bevy::prelude::*;
use regex::Regex;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PermittedErrorsError {
    #[error("Failed to read permitted errors {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse permitted errors: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid permitted error pattern {pattern:?}: {source}")]
    Pattern {
        pattern: String,
        source: regex::Error,
    },
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
enum MatchKind {
    #[default]
    Exact,
    Contains,
    Regex,
}

#[derive(Debug, Deserialize)]
struct PermittedEntry {
    message: String,
    #[serde(default, rename = "match")]
    kind: MatchKind,
    stack: Option<String>,
    stack_match: Option<MatchKind>,
}

#[derive(Debug, Default, Deserialize)]
struct PermittedFile {
    #[serde(default)]
    permitted: Vec<PermittedEntry>,
}

#[derive(Debug, Clone)]
pub enum MessageMatch {
    Exact(String),
    Contains(String),
    Regex(Regex),
}

impl MessageMatch {
    fn compile(kind: MatchKind, pattern: String) -> Result<Self, PermittedErrorsError> {
        Ok(match kind {
            MatchKind::Exact => MessageMatch::Exact(pattern),
            MatchKind::Contains => MessageMatch::Contains(pattern),
            MatchKind::Regex => {
                let re = Regex::new(&pattern)
                    .map_err(|source| PermittedErrorsError::Pattern { pattern, source })?;
                MessageMatch::Regex(re)
            }
        })
    }

    pub fn matches(&self, message: &str) -> bool {
        match self {
            MessageMatch::Exact(expected) => message == expected,
            MessageMatch::Contains(part) => message.contains(part.as_str()),
            MessageMatch::Regex(re) => re.is_match(message),
        }
    }
}

/// One permitted error. Without a stack matcher any stack is accepted.
#[derive(Debug, Clone)]
pub struct PermittedError {
    pub message: MessageMatch,
    pub stack: Option<MessageMatch>,
}

impl PermittedError {
    pub fn matches(&self, message: &str, stack: &str) -> bool {
        self.message.matches(message)
            && self.stack.as_ref().is_none_or(|expected| expected.matches(stack))
    }
}

#[derive(Debug, Clone, Default)]
pub struct PermittedErrors {
    entries: Vec<PermittedError>,
}

impl PermittedErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, entry: PermittedError) -> Self {
        self.entries.push(entry);
        self
    }

    pub fn exact(self, message: impl Into<String>) -> Self {
        self.with(PermittedError {
            message: MessageMatch::Exact(message.into()),
            stack: None,
        })
    }

    pub fn contains(self, part: impl Into<String>) -> Self {
        self.with(PermittedError {
            message: MessageMatch::Contains(part.into()),
            stack: None,
        })
    }

    pub fn is_permitted(&self, message: &str, stack: &str) -> bool {
        self.entries.iter().any(|e| e.matches(message, stack))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn parse(content: &str) -> Result<Self, PermittedErrorsError> {
        let file: PermittedFile = toml::from_str(content)?;
        let mut entries = Vec::with_capacity(file.permitted.len());
        for entry in file.permitted {
            let message = MessageMatch::compile(entry.kind, entry.message)?;
            let stack = match entry.stack {
                Some(pattern) => Some(MessageMatch::compile(
                    entry.stack_match.unwrap_or(MatchKind::Contains),
                    pattern,
                )?),
                None => None,
            };
            entries.push(PermittedError { message, stack });
        }
        Ok(Self { entries })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, PermittedErrorsError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| PermittedErrorsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    /// Load if the file exists; a missing or broken file permits nothing
    pub fn load_or_empty(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            return Self::default();
        }
        match Self::load(path) {
            Ok(permitted) => {
                info!("Loaded {} permitted errors from {}", permitted.len(), path.display());
                permitted
            }
            Err(e) => {
                warn!("{}", e);
                Self::default()
            }
        }
    }
}
