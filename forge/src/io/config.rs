//! Pipeline configuration stored in `forge.toml` at the project root.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// Pipeline configuration (TOML).
///
/// This file is intended to be edited by humans and must remain stable and
/// automatable. Missing fields default to sensible values. The 3-task
/// fan-out cap is a plan invariant, not configuration, and deliberately has
/// no knob here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PipelineConfig {
    /// Wall-clock budget for a single worker invocation, in seconds.
    pub worker_timeout_secs: u64,

    /// Truncate worker stdout/stderr logs beyond this many bytes.
    pub worker_output_limit_bytes: usize,

    /// Reject manifest entries whose materialized content exceeds this many
    /// bytes.
    pub max_file_bytes: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            worker_timeout_secs: 15 * 60,
            worker_output_limit_bytes: 1_000_000,
            max_file_bytes: 200_000,
        }
    }
}

impl PipelineConfig {
    pub fn worker_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.worker_timeout_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.worker_timeout_secs == 0 {
            return Err(anyhow!("worker_timeout_secs must be > 0"));
        }
        if self.worker_output_limit_bytes == 0 {
            return Err(anyhow!("worker_output_limit_bytes must be > 0"));
        }
        if self.max_file_bytes == 0 {
            return Err(anyhow!("max_file_bytes must be > 0"));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `PipelineConfig::default()`.
pub fn load_config(path: &Path) -> Result<PipelineConfig> {
    if !path.exists() {
        let cfg = PipelineConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: PipelineConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, PipelineConfig::default());
    }

    #[test]
    fn load_parses_partial_file_over_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("forge.toml");
        fs::write(&path, "worker_timeout_secs = 60\n").expect("write");

        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded.worker_timeout_secs, 60);
        assert_eq!(loaded.max_file_bytes, PipelineConfig::default().max_file_bytes);
    }

    #[test]
    fn load_rejects_invalid_values() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("forge.toml");
        fs::write(&path, "worker_timeout_secs = 0\n").expect("write");

        let err = load_config(&path).expect_err("invalid");
        assert!(err.to_string().contains("worker_timeout_secs"));
    }

    #[test]
    fn zero_limits_are_rejected() {
        let cfg = PipelineConfig { max_file_bytes: 0, ..PipelineConfig::default() };
        let err = cfg.validate().expect_err("invalid");
        assert!(err.to_string().contains("max_file_bytes"));
    }
}
