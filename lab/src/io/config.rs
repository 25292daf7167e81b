//! Lab configuration stored as TOML (`codelab.toml` by default).

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::verdict::{DEFAULT_FAILURE_MARKER, VerdictPolicy};

pub const DEFAULT_CONFIG_FILE: &str = "codelab.toml";

/// Lab configuration (TOML).
///
/// Intended to be edited by humans. Missing fields default to the values the
/// console driver uses. Credentials never live here; see
/// [`CompletionConfig::api_key_env`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LabConfig {
    /// Upper bound on rounds in every run/debug and test/debug loop.
    pub max_rounds: u32,

    pub sandbox: SandboxConfig,

    pub completion: CompletionConfig,

    pub tests: TestsConfig,
}

/// Remote execution service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SandboxConfig {
    pub url: String,
    pub language: String,
    pub version: String,
    pub timeout_secs: u64,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            url: "https://emkc.org/api/v2/piston/execute".to_string(),
            language: "python".to_string(),
            version: "3.10.0".to_string(),
            timeout_secs: 120,
        }
    }
}

/// Chat completion service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CompletionConfig {
    pub url: String,
    pub model: String,
    pub temperature: f32,
    /// Environment variable holding the bearer credential.
    pub api_key_env: String,
    pub timeout_secs: u64,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            url: "https://api.openai.com/v1/chat/completions".to_string(),
            model: "gpt-4o".to_string(),
            temperature: 0.2,
            api_key_env: "CODELAB_API_KEY".to_string(),
            timeout_secs: 120,
        }
    }
}

/// Local test runner.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TestsConfig {
    /// Test command; the generated test file path is appended.
    pub command: Vec<String>,
    pub timeout_secs: u64,
    /// Truncate captured test output beyond this many bytes.
    pub output_limit_bytes: usize,
    pub verdict: VerdictPolicy,
    /// Substring that marks a failing run under [`VerdictPolicy::FailureMarker`].
    pub failure_marker: String,
}

impl Default for TestsConfig {
    fn default() -> Self {
        Self {
            command: ["pytest", "--disable-warnings", "-q", "--tb=short", "--maxfail=5"]
                .into_iter()
                .map(str::to_string)
                .collect(),
            timeout_secs: 120,
            output_limit_bytes: 100_000,
            verdict: VerdictPolicy::default(),
            failure_marker: DEFAULT_FAILURE_MARKER.to_string(),
        }
    }
}

impl Default for LabConfig {
    fn default() -> Self {
        Self {
            max_rounds: 4,
            sandbox: SandboxConfig::default(),
            completion: CompletionConfig::default(),
            tests: TestsConfig::default(),
        }
    }
}

impl LabConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_rounds == 0 {
            return Err(anyhow!("max_rounds must be > 0"));
        }
        if self.sandbox.url.trim().is_empty() {
            return Err(anyhow!("sandbox.url must be non-empty"));
        }
        if self.sandbox.language.trim().is_empty() || self.sandbox.version.trim().is_empty() {
            return Err(anyhow!("sandbox.language and sandbox.version must be non-empty"));
        }
        if self.sandbox.timeout_secs == 0 {
            return Err(anyhow!("sandbox.timeout_secs must be > 0"));
        }
        if self.completion.url.trim().is_empty() {
            return Err(anyhow!("completion.url must be non-empty"));
        }
        if self.completion.model.trim().is_empty() {
            return Err(anyhow!("completion.model must be non-empty"));
        }
        if !(0.0..=2.0).contains(&self.completion.temperature) {
            return Err(anyhow!("completion.temperature must be within 0.0..=2.0"));
        }
        if self.completion.api_key_env.trim().is_empty() {
            return Err(anyhow!("completion.api_key_env must be non-empty"));
        }
        if self.completion.timeout_secs == 0 {
            return Err(anyhow!("completion.timeout_secs must be > 0"));
        }
        if self.tests.command.is_empty() || self.tests.command[0].trim().is_empty() {
            return Err(anyhow!("tests.command must be a non-empty array"));
        }
        if self.tests.timeout_secs == 0 {
            return Err(anyhow!("tests.timeout_secs must be > 0"));
        }
        if self.tests.output_limit_bytes == 0 {
            return Err(anyhow!("tests.output_limit_bytes must be > 0"));
        }
        if self.tests.failure_marker.is_empty() {
            return Err(anyhow!("tests.failure_marker must be non-empty"));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `LabConfig::default()`.
pub fn load_config(path: &Path) -> Result<LabConfig> {
    if !path.exists() {
        let cfg = LabConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: LabConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &LabConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, LabConfig::default());
        assert_eq!(cfg.max_rounds, 4);
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("codelab.toml");
        let cfg = LabConfig {
            max_rounds: 5,
            ..LabConfig::default()
        };
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("codelab.toml");
        fs::write(
            &path,
            "max_rounds = 2\n[tests]\nverdict = \"exit_code\"\n[completion]\nmodel = \"gpt-4o-mini\"\n",
        )
        .expect("write");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.max_rounds, 2);
        assert_eq!(cfg.tests.verdict, VerdictPolicy::ExitCode);
        assert_eq!(cfg.tests.failure_marker, "FAILED");
        assert_eq!(cfg.completion.model, "gpt-4o-mini");
        assert_eq!(cfg.sandbox, SandboxConfig::default());
    }

    #[test]
    fn rejects_zero_rounds() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("codelab.toml");
        fs::write(&path, "max_rounds = 0\n").expect("write");
        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("max_rounds"));
    }

    #[test]
    fn rejects_out_of_range_temperature() {
        let mut cfg = LabConfig::default();
        cfg.completion.temperature = 3.5;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_empty_test_command() {
        let mut cfg = LabConfig::default();
        cfg.tests.command.clear();
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("tests.command"));
    }
}
