//! Best-effort source location for failed test bodies
//!
//! Native backtraces point into the executor machinery rather than the test,
//! so failures are located textually instead: find the class's source file,
//! find the method, and count suspension keywords up to the index the
//! executor reached. Comments and string literals are ignored while counting.
//!
//! This is a heuristic. Any lookup problem degrades to a `can't ...` message.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;
use thiserror::Error;

use crate::constants::SUSPENSION_KEYWORD;

#[derive(Debug, Error)]
pub enum TraceError {
    #[error("can't find source for {class}: no source roots configured")]
    NoRoots { class: String },

    #[error("can't find source file for class {class}")]
    NoSourceFile { class: String },

    #[error("can't find a unique source file for class {class}: {paths}")]
    AmbiguousSourceFile { class: String, paths: String },

    #[error("can't read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("can't find method {method} in {path}")]
    MethodNotFound { method: String, path: PathBuf },

    #[error("can't find suspension point {index} in {method} ({found} present)")]
    SuspensionNotFound {
        method: String,
        index: usize,
        found: usize,
    },
}

/// A reconstructed failure location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    pub path: PathBuf,
    /// 1-based line number
    pub line: usize,
    pub text: String,
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "at {}:{}: {}", self.path.display(), self.line, self.text)
    }
}

/// Locates failing suspension points in test sources
#[derive(Debug, Clone)]
pub struct SourceTracer {
    roots: Vec<PathBuf>,
    keyword: String,
}

impl SourceTracer {
    pub fn new(roots: Vec<PathBuf>, keyword: impl Into<String>) -> Self {
        Self {
            roots,
            keyword: keyword.into(),
        }
    }

    /// Tracer with no source roots; every lookup degrades to a message
    pub fn disabled() -> Self {
        Self::new(Vec::new(), SUSPENSION_KEYWORD)
    }

    /// Describe where `class::method` failed, never failing itself
    pub fn reconstruct(&self, class: &str, method: &str, suspension_index: usize) -> String {
        match self.locate(class, method, suspension_index) {
            Ok(location) => location.to_string(),
            Err(e) => e.to_string(),
        }
    }

    /// Index 0 means the body failed before its first suspension point, which
    /// is reported as the method declaration.
    pub fn locate(
        &self,
        class: &str,
        method: &str,
        suspension_index: usize,
    ) -> Result<SourceLocation, TraceError> {
        if self.roots.is_empty() {
            return Err(TraceError::NoRoots {
                class: class.to_string(),
            });
        }

        let path = self.find_source_file(class)?;
        let source = fs::read_to_string(&path).map_err(|source| TraceError::Io {
            path: path.clone(),
            source,
        })?;

        let original: Vec<&str> = source.split('\n').collect();
        let stripped = strip_comments_and_strings(&source);
        let stripped: Vec<&str> = stripped.split('\n').collect();

        let Some(body) = find_method_body(&stripped, method) else {
            return Err(TraceError::MethodNotFound {
                method: method.to_string(),
                path,
            });
        };

        let line_idx = if suspension_index == 0 {
            body.declaration_line
        } else {
            let points = suspension_lines(&stripped, &body, &self.keyword);
            match points.get(suspension_index - 1) {
                Some(line) => *line,
                None => {
                    return Err(TraceError::SuspensionNotFound {
                        method: method.to_string(),
                        index: suspension_index,
                        found: points.len(),
                    });
                }
            }
        };

        Ok(SourceLocation {
            path,
            line: line_idx + 1,
            text: original
                .get(line_idx)
                .map(|l| l.trim().to_string())
                .unwrap_or_default(),
        })
    }

    fn find_source_file(&self, class: &str) -> Result<PathBuf, TraceError> {
        let snake = to_snake_case(class);
        let mut candidates = Vec::new();
        for root in &self.roots {
            collect_matching_files(root, class, &snake, &mut candidates);
        }
        candidates.sort();
        candidates.dedup();

        match candidates.len() {
            0 => Err(TraceError::NoSourceFile {
                class: class.to_string(),
            }),
            1 => Ok(candidates.remove(0)),
            _ => Err(TraceError::AmbiguousSourceFile {
                class: class.to_string(),
                paths: candidates
                    .iter()
                    .map(|p| p.display().to_string())
                    .collect::<Vec<_>>()
                    .join(", "),
            }),
        }
    }
}

fn collect_matching_files(current: &Path, class: &str, snake: &str, out: &mut Vec<PathBuf>) {
    let entries = match fs::read_dir(current) {
        Ok(e) => e,
        Err(_) => return,
    };

    for entry in entries.flatten() {
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().to_string();

        if path.is_dir() {
            if name.starts_with('.') || name == "target" {
                continue;
            }
            collect_matching_files(&path, class, snake, out);
        } else if path.extension().map(|e| e == "rs").unwrap_or(false) {
            let stem = path
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default();
            if stem == class || stem == snake {
                out.push(path);
            }
        }
    }
}

/// `MainMenuTests` -> `main_menu_tests`, `HUDTests` -> `hud_tests`
pub fn to_snake_case(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if c.is_uppercase() {
            let prev = if i > 0 { Some(chars[i - 1]) } else { None };
            let next = chars.get(i + 1).copied();
            let boundary = match prev {
                Some(p) if p.is_lowercase() || p.is_ascii_digit() => true,
                Some(p) if p.is_uppercase() => next.map(|n| n.is_lowercase()).unwrap_or(false),
                _ => false,
            };
            if boundary && !out.ends_with('_') {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Span of a method body in stripped source lines
struct MethodBody {
    declaration_line: usize,
    /// (line, column) of the opening brace
    open: (usize, usize),
    /// (line, column) of the closing brace
    close: (usize, usize),
}

fn find_method_body(lines: &[&str], method: &str) -> Option<MethodBody> {
    let pattern = Regex::new(&format!(r"\bfn\s+{}\b", regex::escape(method))).ok()?;

    for (decl_idx, line) in lines.iter().enumerate() {
        let Some(m) = pattern.find(line) else {
            continue;
        };

        let mut open = None;
        let mut depth = 0usize;
        let mut start_col = m.end();

        for (line_idx, text) in lines.iter().enumerate().skip(decl_idx) {
            let bytes = text.as_bytes();
            for (col, &b) in bytes.iter().enumerate().skip(start_col) {
                match b {
                    b';' if open.is_none() => break,
                    b'{' => {
                        if open.is_none() {
                            open = Some((line_idx, col));
                        }
                        depth += 1;
                    }
                    b'}' if open.is_some() => {
                        depth -= 1;
                        if depth == 0 {
                            return open.map(|open| MethodBody {
                                declaration_line: decl_idx,
                                open,
                                close: (line_idx, col),
                            });
                        }
                    }
                    _ => {}
                }
            }
            // A `;` before any brace means a declaration without a body
            if open.is_none() && bytes.iter().skip(start_col).any(|&b| b == b';') {
                break;
            }
            start_col = 0;
        }
    }
    None
}

/// Line index of every keyword occurrence inside the body, in order
fn suspension_lines(lines: &[&str], body: &MethodBody, keyword: &str) -> Vec<usize> {
    let mut found = Vec::new();
    for line_idx in body.open.0..=body.close.0 {
        let text = lines[line_idx];
        let from = if line_idx == body.open.0 { body.open.1 } else { 0 };
        let to = if line_idx == body.close.0 { body.close.1 } else { text.len() };
        for (col, _) in text.match_indices(keyword) {
            if col >= from && col < to {
                found.push(line_idx);
            }
        }
    }
    found
}

#[derive(Clone, Copy, PartialEq)]
enum Scan {
    Code,
    LineComment,
    BlockComment(usize),
    Str,
    RawStr(usize),
}

/// Blank out comments and literal contents, keeping line and column layout
fn strip_comments_and_strings(source: &str) -> String {
    let chars: Vec<char> = source.chars().collect();
    let mut out = String::with_capacity(source.len());
    let mut state = Scan::Code;
    let mut i = 0;

    // Multi-byte chars become one ASCII space so byte columns stay close enough
    let blank = |c: char| if c == '\n' { '\n' } else { ' ' };

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        match state {
            Scan::Code => match (c, next) {
                ('/', Some('/')) => {
                    state = Scan::LineComment;
                    out.push_str("  ");
                    i += 2;
                    continue;
                }
                ('/', Some('*')) => {
                    state = Scan::BlockComment(1);
                    out.push_str("  ");
                    i += 2;
                    continue;
                }
                ('"', _) => {
                    state = Scan::Str;
                    out.push('"');
                }
                ('r', Some('"' | '#'))
                    if i == 0 || !(chars[i - 1].is_alphanumeric() || chars[i - 1] == '_') =>
                {
                    let mut hashes = 0;
                    while chars.get(i + 1 + hashes) == Some(&'#') {
                        hashes += 1;
                    }
                    if chars.get(i + 1 + hashes) == Some(&'"') {
                        for _ in 0..(hashes + 2) {
                            out.push(' ');
                        }
                        state = Scan::RawStr(hashes);
                        i += hashes + 2;
                        continue;
                    }
                    out.push(c);
                }
                ('\'', Some('\\')) => {
                    // Escaped char literal: skip to the closing quote
                    let mut j = i + 3;
                    while j < chars.len() && chars[j] != '\'' && chars[j] != '\n' {
                        j += 1;
                    }
                    for _ in i..=j.min(chars.len() - 1) {
                        out.push(' ');
                    }
                    i = j + 1;
                    continue;
                }
                ('\'', Some(_)) if chars.get(i + 2) == Some(&'\'') => {
                    out.push_str("   ");
                    i += 3;
                    continue;
                }
                _ => out.push(c),
            },
            Scan::LineComment => {
                if c == '\n' {
                    state = Scan::Code;
                }
                out.push(blank(c));
            }
            Scan::BlockComment(depth) => match (c, next) {
                ('/', Some('*')) => {
                    state = Scan::BlockComment(depth + 1);
                    out.push_str("  ");
                    i += 2;
                    continue;
                }
                ('*', Some('/')) => {
                    state = if depth == 1 {
                        Scan::Code
                    } else {
                        Scan::BlockComment(depth - 1)
                    };
                    out.push_str("  ");
                    i += 2;
                    continue;
                }
                _ => out.push(blank(c)),
            },
            Scan::Str => match c {
                '\\' => {
                    out.push(' ');
                    if let Some(n) = next {
                        out.push(blank(n));
                    }
                    i += 2;
                    continue;
                }
                '"' => {
                    state = Scan::Code;
                    out.push('"');
                }
                _ => out.push(blank(c)),
            },
            Scan::RawStr(hashes) => {
                if c == '"' && (1..=hashes).all(|k| chars.get(i + k) == Some(&'#')) {
                    for _ in 0..=hashes {
                        out.push(' ');
                    }
                    state = Scan::Code;
                    i += hashes + 1;
                    continue;
                }
                out.push(blank(c));
            }
        }
        i += 1;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const SOURCE: &str = r#"use playtest::TestContext;

pub struct SettingsMenuTests;

impl SettingsMenuTests {
    // ctx.next_frame().await in a comment does not count
    pub async fn toggles_music(ctx: TestContext) {
        ctx.next_frame().await;
        let label = "ctx.seconds(1.0).await";
        /* ctx.frames(2).await;
           still a comment */
        ctx.seconds(0.5).await;
        let brace = '{';
        ctx.frames(2).await;
    }

    pub async fn other(ctx: TestContext) {
        ctx.next_frame().await;
    }
}
"#;

    fn tracer_with(files: &[(&str, &str)]) -> (tempfile::TempDir, SourceTracer) {
        let dir = tempfile::tempdir().unwrap();
        for (name, content) in files {
            let path = dir.path().join(name);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).unwrap();
            }
            fs::write(path, content).unwrap();
        }
        let tracer = SourceTracer::new(vec![dir.path().to_path_buf()], ".await");
        (dir, tracer)
    }

    #[test]
    fn test_snake_case() {
        assert_eq!(to_snake_case("MainMenuTests"), "main_menu_tests");
        assert_eq!(to_snake_case("HUDTests"), "hud_tests");
        assert_eq!(to_snake_case("Level2Tests"), "level2_tests");
        assert_eq!(to_snake_case("already_snake"), "already_snake");
    }

    #[test]
    fn test_locates_nth_suspension_point() {
        let (_dir, tracer) = tracer_with(&[("ui/settings_menu_tests.rs", SOURCE)]);

        let first = tracer.locate("SettingsMenuTests", "toggles_music", 1).unwrap();
        assert_eq!(first.line, 8);
        assert_eq!(first.text, "ctx.next_frame().await;");

        // Comment and string occurrences are skipped
        let second = tracer.locate("SettingsMenuTests", "toggles_music", 2).unwrap();
        assert_eq!(second.line, 12);

        // The char literal brace does not end the body early
        let third = tracer.locate("SettingsMenuTests", "toggles_music", 3).unwrap();
        assert_eq!(third.line, 14);
        assert_eq!(third.text, "ctx.frames(2).await;");
    }

    #[test]
    fn test_index_zero_is_declaration() {
        let (_dir, tracer) = tracer_with(&[("settings_menu_tests.rs", SOURCE)]);
        let location = tracer.locate("SettingsMenuTests", "other", 0).unwrap();
        assert_eq!(location.line, 17);
        assert!(location.to_string().contains("pub async fn other"));
    }

    #[test]
    fn test_lookup_failures_degrade_to_messages() {
        let (_dir, tracer) = tracer_with(&[
            ("a/settings_menu_tests.rs", SOURCE),
            ("b/SettingsMenuTests.rs", SOURCE),
        ]);
        let message = tracer.reconstruct("SettingsMenuTests", "toggles_music", 1);
        assert!(message.starts_with("can't find a unique source file"));

        let message = tracer.reconstruct("AudioTests", "plays", 1);
        assert_eq!(message, "can't find source file for class AudioTests");

        let message = SourceTracer::disabled().reconstruct("AudioTests", "plays", 1);
        assert!(message.starts_with("can't find source"));
    }

    #[test]
    fn test_missing_method_and_index() {
        let (_dir, tracer) = tracer_with(&[("settings_menu_tests.rs", SOURCE)]);
        let message = tracer.reconstruct("SettingsMenuTests", "missing", 1);
        assert!(message.starts_with("can't find method missing"));

        let message = tracer.reconstruct("SettingsMenuTests", "other", 4);
        assert_eq!(message, "can't find suspension point 4 in other (1 present)");
    }
}
