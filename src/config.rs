//! Tracker configuration loaded from `inkflow.toml`.
//!
//! [`TrackerConfig`] carries the configurable parameters. Values absent
//! from the file use sensible defaults. The `INKFLOW_API_URL` environment
//! variable takes precedence over the file for the API base URL.

use std::path::Path;

use anyhow::Result;
use serde::Deserialize;

use crate::error::TrackerError;
use crate::gate::GateConfig;

/// Top-level configuration loaded from `inkflow.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct TrackerConfig {
    /// Base URL of the job service API.
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Spacing between status polls, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Hard poll attempt ceiling before surfacing a timeout.
    #[serde(default = "default_poll_max_attempts")]
    pub poll_max_attempts: u32,

    /// Continuity score at or above which a branch passes the gate.
    #[serde(default = "default_pass_score")]
    pub pass_score: f64,

    /// Continuity score at or below which a branch is rejected.
    #[serde(default = "default_reject_score")]
    pub reject_score: f64,

    /// Quiet period before an edit is persisted, in milliseconds.
    #[serde(default = "default_autosave_debounce_ms")]
    pub autosave_debounce_ms: u64,

    /// Capacity of the composed-feedback memo cache.
    #[serde(default = "default_suggestion_cache_size")]
    pub suggestion_cache_size: usize,
}

fn default_api_base_url() -> String {
    "http://localhost:8787/api".to_string()
}

fn default_poll_interval_ms() -> u64 {
    2000
}

fn default_poll_max_attempts() -> u32 {
    150
}

fn default_pass_score() -> f64 {
    7.0
}

fn default_reject_score() -> f64 {
    5.0
}

fn default_autosave_debounce_ms() -> u64 {
    2000
}

fn default_suggestion_cache_size() -> usize {
    32
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            poll_interval_ms: default_poll_interval_ms(),
            poll_max_attempts: default_poll_max_attempts(),
            pass_score: default_pass_score(),
            reject_score: default_reject_score(),
            autosave_debounce_ms: default_autosave_debounce_ms(),
            suggestion_cache_size: default_suggestion_cache_size(),
        }
    }
}

impl TrackerConfig {
    /// Load configuration from `inkflow.toml` in the current directory.
    /// Falls back to defaults when the file does not exist.
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new("inkflow.toml"))
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            toml::from_str::<TrackerConfig>(&contents)?
        } else {
            Self::default()
        };

        // Environment variable takes precedence over the file.
        if let Ok(url) = std::env::var("INKFLOW_API_URL")
            && !url.is_empty()
        {
            config.api_base_url = url;
        }

        Ok(config)
    }

    /// Validated continuity-gate thresholds.
    pub fn gate_config(&self) -> Result<GateConfig, TrackerError> {
        GateConfig::new(self.pass_score, self.reject_score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_values() {
        let config = TrackerConfig::default();
        assert_eq!(config.api_base_url, "http://localhost:8787/api");
        assert_eq!(config.poll_interval_ms, 2000);
        assert_eq!(config.poll_max_attempts, 150);
        assert_eq!(config.pass_score, 7.0);
        assert_eq!(config.reject_score, 5.0);
        assert_eq!(config.autosave_debounce_ms, 2000);
        assert_eq!(config.suggestion_cache_size, 32);
    }

    #[test]
    fn deserialize_partial_toml() {
        let toml_str = r#"
            api_base_url = "https://api.example.test"
            poll_interval_ms = 500
        "#;
        let config: TrackerConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.api_base_url, "https://api.example.test");
        assert_eq!(config.poll_interval_ms, 500);
        assert_eq!(config.poll_max_attempts, 150);
    }

    #[test]
    fn load_from_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "pass_score = 8.0\nreject_score = 6.0").unwrap();

        let config = TrackerConfig::load_from(file.path()).unwrap();
        assert_eq!(config.pass_score, 8.0);
        assert_eq!(config.reject_score, 6.0);
        assert!(config.gate_config().is_ok());
    }

    #[test]
    fn load_from_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = TrackerConfig::load_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.poll_max_attempts, 150);
    }

    #[test]
    fn inverted_thresholds_fail_validation() {
        let config: TrackerConfig =
            toml::from_str("pass_score = 4.0\nreject_score = 6.0").unwrap();
        assert!(config.gate_config().is_err());
    }
}
