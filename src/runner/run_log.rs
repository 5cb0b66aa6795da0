//! Persisted run log (`test_run.log`)
//!
//! Every captured log line of the run, with a UTC timestamp and its stack
//! indented below it.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use bevy::prelude::*;
use uuid::Uuid;

use super::context::LogEntry;

pub struct RunLog {
    writer: Option<BufWriter<File>>,
    path: Option<PathBuf>,
    run_id: String,
}

impl Default for RunLog {
    fn default() -> Self {
        Self::closed()
    }
}

impl RunLog {
    /// A log that discards everything
    pub fn closed() -> Self {
        Self {
            writer: None,
            path: None,
            run_id: String::new(),
        }
    }

    /// Open (truncating) `path` and write the run header
    pub fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let run_id = Uuid::new_v4().to_string();

        if let Some(parent) = path.parent()
            && let Err(e) = std::fs::create_dir_all(parent)
        {
            warn!("Failed to create run log directory: {}", e);
            return Self::closed();
        }

        match OpenOptions::new().create(true).write(true).truncate(true).open(path) {
            Ok(file) => {
                info!("Run log: {} (run: {})", path.display(), &run_id[..8]);
                let mut log = Self {
                    writer: Some(BufWriter::new(file)),
                    path: Some(path.to_path_buf()),
                    run_id,
                };
                let header = format!(
                    "# run {} started {}",
                    log.run_id,
                    chrono::Utc::now().to_rfc3339()
                );
                log.write_line(&header);
                log
            }
            Err(e) => {
                warn!("Failed to open run log: {}", e);
                Self::closed()
            }
        }
    }

    pub fn is_open(&self) -> bool {
        self.writer.is_some()
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Marks the start of a method so lines can be attributed
    pub fn begin_test(&mut self, name: &str) {
        self.write_line(&format!("== {}", name));
    }

    pub fn append(&mut self, entry: &LogEntry) {
        let line = format!(
            "{} [{}] {}",
            entry.timestamp.format("%Y-%m-%dT%H:%M:%S%.3fZ"),
            entry.level,
            entry.message
        );
        self.write_line(&line);
        for stack_line in entry.stack.lines() {
            self.write_line(&format!("    {}", stack_line));
        }
    }

    pub fn close(&mut self) {
        if let Some(mut writer) = self.writer.take()
            && let Err(e) = writer.flush()
        {
            warn!("Failed to flush run log: {}", e);
        }
    }

    fn write_line(&mut self, line: &str) {
        if let Some(writer) = self.writer.as_mut()
            && let Err(e) = writeln!(writer, "{}", line)
        {
            warn!("Failed to write run log: {}", e);
            self.writer = None;
        }
    }
}

impl Drop for RunLog {
    fn drop(&mut self) {
        self.close();
    }
}
