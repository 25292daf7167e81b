//! Working files for an analysis and isolated session directories.
//!
//! Every file an analysis touches is named from the working file's base name
//! and lives in the working file's directory. The HTTP service gives each
//! request its own session directory so concurrent requests never share a
//! working file.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use rand::{Rng, distributions::Alphanumeric};
use serde::Serialize;

use crate::core::naming::{
    cleaned_file_name, critic_file_name, file_stem, module_name, test_file_name,
};

/// Canonical paths derived from one working file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkingFiles {
    pub dir: PathBuf,
    pub filename: String,
    pub source_path: PathBuf,
    pub critic_path: PathBuf,
    pub cleaned_path: PathBuf,
    pub test_path: PathBuf,
    pub report_path: PathBuf,
}

impl WorkingFiles {
    pub fn new(dir: impl Into<PathBuf>, filename: &str) -> Self {
        let dir = dir.into();
        Self {
            source_path: dir.join(filename),
            critic_path: dir.join(critic_file_name(filename)),
            cleaned_path: dir.join(cleaned_file_name(filename)),
            test_path: dir.join(test_file_name(filename)),
            report_path: dir.join(format!("{}.report.json", file_stem(filename))),
            filename: filename.to_string(),
            dir,
        }
    }

    /// Split an existing file path into directory and base name.
    pub fn for_path(path: &Path) -> Result<Self> {
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| anyhow!("invalid file path {}", path.display()))?;
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        Ok(Self::new(dir, filename))
    }

    pub fn module_name(&self) -> &str {
        module_name(&self.filename)
    }

    pub fn read_source(&self) -> Result<String> {
        read_text(&self.source_path)
    }

    pub fn write_source(&self, contents: &str) -> Result<()> {
        write_text(&self.source_path, contents)
    }
}

/// An isolated directory for one service request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Session identifier (working file stem, timestamp, random suffix).
    pub id: String,
    pub files: WorkingFiles,
}

/// Create a fresh session directory under `base_dir` and write `code` as its working file.
pub fn create_session(base_dir: &Path, filename: &str, code: &str) -> Result<Session> {
    fs::create_dir_all(base_dir)
        .with_context(|| format!("create session dir {}", base_dir.display()))?;

    let id = build_session_id(file_stem(filename), &generate_timestamp(), &generate_short_id());
    let dir = base_dir.join(&id);
    fs::create_dir(&dir).with_context(|| format!("create session {}", dir.display()))?;

    let files = WorkingFiles::new(dir, filename);
    files.write_source(code)?;
    Ok(Session { id, files })
}

pub fn build_session_id(stem: &str, timestamp: &str, short_id: &str) -> String {
    format!("{stem}_{timestamp}_{short_id}")
}

fn generate_timestamp() -> String {
    Utc::now().format("%Y%m%d_%H%M%S").to_string()
}

fn generate_short_id() -> String {
    let mut rng = rand::thread_rng();
    std::iter::repeat_with(|| rng.sample(Alphanumeric))
        .map(char::from)
        .take(6)
        .collect::<String>()
        .to_lowercase()
}

pub fn read_text(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("read {}", path.display()))
}

pub fn write_text(path: &Path, contents: &str) -> Result<()> {
    fs::write(path, contents).with_context(|| format!("write {}", path.display()))
}

/// Serialize `value` to pretty-printed JSON with trailing newline.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(value).context("serialize json")?;
    buf.push('\n');
    write_text(path, &buf)
}
