//! TOML configuration.
//!
//! Every section is optional; a missing file section falls back to the
//! defaults below. Relative paths resolve against `paths.base`, which itself
//! resolves against the directory holding the config file.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use tabvault_core::cooccur::CooccurrenceKey;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub watch: WatchConfig,
    #[serde(default)]
    pub graph: GraphConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PathsConfig {
    #[serde(default = "default_base")]
    pub base: PathBuf,
    #[serde(default = "default_inbox")]
    pub inbox: PathBuf,
    #[serde(default = "default_vault")]
    pub vault: PathBuf,
    #[serde(default = "default_quarantine")]
    pub quarantine: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            base: default_base(),
            inbox: default_inbox(),
            vault: default_vault(),
            quarantine: default_quarantine(),
        }
    }
}

fn default_base() -> PathBuf {
    PathBuf::from(".")
}
fn default_inbox() -> PathBuf {
    PathBuf::from("inbox")
}
fn default_vault() -> PathBuf {
    PathBuf::from("vault")
}
fn default_quarantine() -> PathBuf {
    PathBuf::from("quarantine")
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("tabvault.sqlite")
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    #[serde(default = "default_checkpoint")]
    pub checkpoint: PathBuf,
    #[serde(default = "default_feedback_rate")]
    pub feedback_rate: f64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            checkpoint: default_checkpoint(),
            feedback_rate: default_feedback_rate(),
        }
    }
}

fn default_checkpoint() -> PathBuf {
    PathBuf::from("index.checkpoint.json")
}
fn default_feedback_rate() -> f64 {
    tabvault_core::index::DEFAULT_FEEDBACK_RATE
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    #[serde(default = "default_pattern")]
    pub pattern: String,
    #[serde(default = "default_companion_suffix")]
    pub companion_suffix: String,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            pattern: default_pattern(),
            companion_suffix: default_companion_suffix(),
        }
    }
}

fn default_pattern() -> String {
    "*_session.json".to_string()
}
fn default_companion_suffix() -> String {
    "_tabs.pdf".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct WatchConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
        }
    }
}

fn default_interval_secs() -> u64 {
    5
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct GraphConfig {
    #[serde(default)]
    pub key: CooccurrenceKey,
    /// Only sessions from the last `window_days` days are exported; `0`
    /// exports everything.
    #[serde(default)]
    pub window_days: u32,
}

impl Config {
    /// Configuration rooted at `base` with every other setting defaulted.
    pub fn rooted_at(base: impl Into<PathBuf>) -> Self {
        let mut config = Self::default();
        config.paths.base = base.into();
        config.resolve(Path::new(""));
        config
    }

    /// Rewrite every relative path against `paths.base`, and `paths.base`
    /// against `config_dir`.
    fn resolve(&mut self, config_dir: &Path) {
        if self.paths.base.is_relative() {
            self.paths.base = config_dir.join(&self.paths.base);
        }
        let base = self.paths.base.clone();
        for p in [
            &mut self.paths.inbox,
            &mut self.paths.vault,
            &mut self.paths.quarantine,
            &mut self.db.path,
            &mut self.index.checkpoint,
        ] {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config: Config =
        toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    let config_dir = path.parent().unwrap_or_else(|| Path::new(""));
    config.resolve(config_dir);
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    let rate = config.index.feedback_rate;
    if !(rate > 0.0 && rate < 1.0) {
        bail!("index.feedback_rate must be in (0.0, 1.0), got {}", rate);
    }

    if config.watch.interval_secs == 0 {
        bail!("watch.interval_secs must be > 0");
    }

    globset::Glob::new(&config.ingest.pattern)
        .with_context(|| format!("Invalid ingest.pattern '{}'", config.ingest.pattern))?;

    if config.ingest.companion_suffix.is_empty() {
        bail!("ingest.companion_suffix must not be empty");
    }

    if config.paths.vault == config.paths.inbox || config.paths.quarantine == config.paths.inbox {
        bail!("paths.inbox must differ from paths.vault and paths.quarantine");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("tabvault.toml");
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let tmp = tempfile::TempDir::new().unwrap();
        let config = load_config(&write(tmp.path(), "")).unwrap();
        assert_eq!(config.paths.inbox, tmp.path().join("./inbox"));
        assert_eq!(config.ingest.pattern, "*_session.json");
        assert_eq!(config.watch.interval_secs, 5);
        assert_eq!(config.graph.key, CooccurrenceKey::Url);
        assert!((config.index.feedback_rate - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_paths_resolve_against_base() {
        let tmp = tempfile::TempDir::new().unwrap();
        let body = r#"
[paths]
base = "data"
inbox = "/abs/inbox"

[graph]
key = "host"
"#;
        let config = load_config(&write(tmp.path(), body)).unwrap();
        assert_eq!(config.paths.base, tmp.path().join("data"));
        assert_eq!(config.paths.inbox, PathBuf::from("/abs/inbox"));
        assert_eq!(config.paths.vault, tmp.path().join("data").join("vault"));
        assert_eq!(config.db.path, tmp.path().join("data").join("tabvault.sqlite"));
        assert_eq!(config.graph.key, CooccurrenceKey::Host);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let tmp = tempfile::TempDir::new().unwrap();
        for body in [
            "[index]\nfeedback_rate = 1.5\n",
            "[index]\nfeedback_rate = 0.0\n",
            "[watch]\ninterval_secs = 0\n",
            "[ingest]\npattern = \"[\"\n",
            "[graph]\nkey = \"domain\"\n",
            "[paths]\nvault = \"inbox\"\n",
        ] {
            assert!(load_config(&write(tmp.path(), body)).is_err(), "{}", body);
        }
    }

    #[test]
    fn test_missing_file_is_error() {
        let err = load_config(Path::new("/nonexistent/tabvault.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
