use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::error::{PosterError, Result};

pub const DEFAULT_SERVICE_URL: &str = "https://customposter.onrender.com";
pub const DEFAULT_STORAGE_KEY: &str = "customPosters";

/// Source that produced the engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum EngineConfigSource {
    #[default]
    Default,
    EnvPath(PathBuf),
    EnvInline,
}

/// Timing for the bounded main-poster loop. The defaults are empirical: the
/// host page's own re-render storms after navigation settle within roughly
/// two seconds.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ReconcileConfig {
    /// Delay between two reconciliation ticks.
    pub tick_interval_ms: u64,
    /// The loop stops once more than this many consecutive ticks changed
    /// nothing.
    pub stability_threshold: u32,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 100,
            stability_threshold: 20,
        }
    }
}

impl ReconcileConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

/// Cadence of the page-wide sweep. It never stops on its own, so keep this
/// cheap.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct SweepConfig {
    pub interval_ms: u64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self { interval_ms: 100 }
    }
}

impl SweepConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Everything the engine needs besides the page itself.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Base URL of the remote poster service.
    pub service_url: String,
    /// Per-request timeout for the poster service.
    pub request_timeout_ms: u64,
    /// Key under which the whole poster record is stored.
    pub storage_key: String,
    /// Directory used by the file-backed key-value store.
    pub storage_dir: Option<PathBuf>,
    pub reconcile: ReconcileConfig,
    pub sweep: SweepConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            service_url: DEFAULT_SERVICE_URL.to_string(),
            request_timeout_ms: 10_000,
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            storage_dir: None,
            reconcile: ReconcileConfig::default(),
            sweep: SweepConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration overrides using environment variables.
    /// Evaluation order:
    /// 1) `$POSTERPIN_CONFIG_PATH` (TOML or JSON file),
    /// 2) `$POSTERPIN_CONFIG_JSON` (inline JSON),
    /// 3) defaults if neither is set.
    pub fn load_from_env() -> anyhow::Result<(Self, EngineConfigSource)> {
        if let Ok(path_str) = env::var("POSTERPIN_CONFIG_PATH")
            && !path_str.trim().is_empty()
        {
            let path = PathBuf::from(path_str);
            let config = Self::load_from_file(&path)?;
            return Ok((config, EngineConfigSource::EnvPath(path)));
        }

        if let Ok(raw) = env::var("POSTERPIN_CONFIG_JSON")
            && !raw.trim().is_empty()
        {
            let parsed = Self::parse_json(&raw)
                .context("failed to parse POSTERPIN_CONFIG_JSON")?;
            return Ok((parsed, EngineConfigSource::EnvInline));
        }

        Ok((Self::default(), EngineConfigSource::Default))
    }

    pub fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path).with_context(|| {
            format!("failed to read posterpin config from {}", path.display())
        })?;

        let config = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::parse_json(&contents).with_context(|| {
                format!("invalid posterpin config {}", path.display())
            })?,
            _ => toml::from_str(&contents).map_err(|err| {
                anyhow!("invalid posterpin config {}: {}", path.display(), err)
            })?,
        };
        config.validate()?;
        Ok(config)
    }

    fn parse_json(raw: &str) -> anyhow::Result<Self> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.service_url.trim().is_empty() {
            return Err(PosterError::Config("service_url cannot be empty".into()));
        }
        if self.storage_key.trim().is_empty() {
            return Err(PosterError::Config("storage_key cannot be empty".into()));
        }
        if self.reconcile.tick_interval_ms == 0 || self.sweep.interval_ms == 0 {
            return Err(PosterError::Config(
                "loop intervals must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_observed_timings() {
        let config = EngineConfig::default();
        assert_eq!(config.reconcile.tick_interval(), Duration::from_millis(100));
        assert_eq!(config.reconcile.stability_threshold, 20);
        assert_eq!(config.sweep.interval(), Duration::from_millis(100));
        assert_eq!(config.storage_key, "customPosters");
        config.validate().unwrap();
    }

    #[test]
    fn toml_file_overrides_only_given_fields() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "service_url = \"http://localhost:8080\"\n[reconcile]\nstability_threshold = 5"
        )
        .unwrap();

        let config = EngineConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.service_url, "http://localhost:8080");
        assert_eq!(config.reconcile.stability_threshold, 5);
        assert_eq!(config.reconcile.tick_interval_ms, 100);
    }

    #[test]
    fn zero_interval_is_rejected() {
        let err = EngineConfig::parse_json(r#"{"sweep": {"interval_ms": 0}}"#)
            .unwrap_err();
        assert!(err.to_string().contains("greater than zero"));
    }
}
