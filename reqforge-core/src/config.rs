//! Configuration loading
//!
//! Configuration lives in a YAML file and is passed explicitly to the
//! constructors that need it. A missing file means defaults.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::ai::client::find_claude_cli;
use crate::ai::{ClaudeCliGenerator, GenerationSettings, HttpGenerator, TextGenerator};
use crate::db::BackendType;

/// Environment variable naming the configuration file
pub const CONFIG_ENV: &str = "REQFORGE_CONFIG";
/// Environment variable overriding the storage directory
pub const STORAGE_DIR_ENV: &str = "REQFORGE_STORAGE_DIR";
/// Environment variable holding the HTTP text generation adapter URL
pub const ADAPTER_URL_ENV: &str = "LLM_ADAPTER_URL";

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub oracle: OracleConfig,
}

/// Where and how projects are persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: BackendType,
    /// Storage directory; without one projects only live in memory
    pub dir: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: BackendType::Json,
            dir: default_storage_dir(),
        }
    }
}

/// How the oracle is reached
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OracleMode {
    Disabled,
    /// Claude CLI with --print flag
    ClaudeCli { path: PathBuf },
    /// HTTP text generation adapter
    Http { url: String },
}

impl std::fmt::Display for OracleMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OracleMode::Disabled => write!(f, "Disabled"),
            OracleMode::ClaudeCli { path } => write!(f, "Claude CLI ({})", path.display()),
            OracleMode::Http { url } => write!(f, "HTTP adapter ({})", url),
        }
    }
}

/// Oracle settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    pub enabled: bool,
    /// Detected at runtime when absent
    pub mode: Option<OracleMode>,
    pub model: Option<String>,
    pub timeout_secs: u64,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for OracleConfig {
    fn default() -> Self {
        let settings = GenerationSettings::default();
        Self {
            enabled: true,
            mode: None,
            model: None,
            timeout_secs: settings.timeout.as_secs(),
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
        }
    }
}

impl OracleConfig {
    /// Oracle settings that never reach out to anything
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn settings(&self) -> GenerationSettings {
        GenerationSettings {
            model: self.model.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            timeout: self.timeout(),
        }
    }

    /// The configured mode, or the best one available on this machine
    pub fn resolve_mode(&self) -> OracleMode {
        if !self.enabled {
            return OracleMode::Disabled;
        }
        if let Some(mode) = &self.mode {
            return mode.clone();
        }
        if let Some(path) = find_claude_cli() {
            return OracleMode::ClaudeCli { path };
        }
        match std::env::var(ADAPTER_URL_ENV) {
            Ok(url) if !url.trim().is_empty() => OracleMode::Http { url },
            _ => OracleMode::Disabled,
        }
    }

    /// Generator for the resolved mode, if any
    pub fn generator(&self) -> Option<Arc<dyn TextGenerator>> {
        let mode = self.resolve_mode();
        debug!(mode = %mode, "Resolved oracle mode");
        match mode {
            OracleMode::Disabled => None,
            OracleMode::ClaudeCli { path } => Some(Arc::new(ClaudeCliGenerator::new(path))),
            OracleMode::Http { url } => Some(Arc::new(HttpGenerator::new(url))),
        }
    }
}

impl Config {
    /// Parse configuration from YAML text
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).context("Failed to parse configuration")
    }

    /// Load configuration, then apply environment overrides
    ///
    /// Lookup order: `explicit`, then `REQFORGE_CONFIG`, then the user
    /// configuration directory. A missing file yields defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match config_path(explicit) {
            Some(path) if path.exists() => {
                let content = fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read config file: {:?}", path))?;
                debug!(path = ?path, "Loaded configuration");
                Self::from_yaml(&content)
                    .with_context(|| format!("Failed to parse config file: {:?}", path))?
            }
            Some(path) if explicit.is_some() => {
                anyhow::bail!("Config file not found: {:?}", path)
            }
            _ => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Apply environment style overrides from `lookup`
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup(STORAGE_DIR_ENV).filter(|d| !d.trim().is_empty()) {
            self.storage.dir = Some(PathBuf::from(dir));
        }
        if self.oracle.mode.is_none() {
            if let Some(url) = lookup(ADAPTER_URL_ENV).filter(|u| !u.trim().is_empty()) {
                self.oracle.mode = Some(OracleMode::Http { url });
            }
        }
    }

    /// Write configuration as YAML, creating parent directories
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_yaml::to_string(self)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)
            .with_context(|| format!("Failed to write config to {:?}", path))?;
        Ok(())
    }
}

/// Gets the path to the configuration file
pub fn config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    if let Ok(path) = std::env::var(CONFIG_ENV) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }
    dirs::config_dir().map(|dir| dir.join("reqforge").join("config.yaml"))
}

/// Default storage directory under the user's data directory
pub fn default_storage_dir() -> Option<PathBuf> {
    dirs::data_dir().map(|dir| dir.join("reqforge").join("projects"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_partial_yaml() {
        let config = Config::from_yaml(
            r#"
storage:
  backend: sqlite
  dir: /tmp/reqforge
oracle:
  timeout_secs: 5
  mode:
    type: http
    url: http://localhost:8300
"#,
        )
        .unwrap();
        assert_eq!(config.storage.backend, BackendType::Sqlite);
        assert_eq!(config.storage.dir, Some(PathBuf::from("/tmp/reqforge")));
        assert_eq!(config.oracle.timeout(), Duration::from_secs(5));
        assert_eq!(config.oracle.max_tokens, 1024);
        assert_eq!(
            config.oracle.resolve_mode(),
            OracleMode::Http {
                url: "http://localhost:8300".into()
            }
        );
    }

    #[test]
    fn test_disabled_oracle_resolves_disabled() {
        let config = OracleConfig {
            mode: Some(OracleMode::Http { url: "http://x".into() }),
            ..OracleConfig::disabled()
        };
        assert_eq!(config.resolve_mode(), OracleMode::Disabled);
        assert!(config.generator().is_none());
    }

    #[test]
    fn test_overrides() {
        let mut config = Config::default();
        config.apply_overrides(|key| match key {
            STORAGE_DIR_ENV => Some("/data/reqs".into()),
            ADAPTER_URL_ENV => Some("http://adapter:8300".into()),
            _ => None,
        });
        assert_eq!(config.storage.dir, Some(PathBuf::from("/data/reqs")));
        assert_eq!(
            config.oracle.mode,
            Some(OracleMode::Http {
                url: "http://adapter:8300".into()
            })
        );
    }

    #[test]
    fn test_explicit_mode_wins_over_adapter_url() {
        let mut config = Config::default();
        config.oracle.mode = Some(OracleMode::Disabled);
        config.apply_overrides(|key| (key == ADAPTER_URL_ENV).then(|| "http://adapter".to_string()));
        assert_eq!(config.oracle.mode, Some(OracleMode::Disabled));
    }

    #[test]
    fn test_save_and_load_explicit_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.yaml");
        let mut config = Config::default();
        config.storage.backend = BackendType::Memory;
        config.oracle = OracleConfig::disabled();
        config.save(&path).unwrap();

        let loaded = Config::load(Some(&path)).unwrap();
        assert_eq!(loaded.storage.backend, BackendType::Memory);
        assert!(!loaded.oracle.enabled);
    }

    #[test]
    fn test_missing_explicit_path_is_error() {
        let dir = TempDir::new().unwrap();
        assert!(Config::load(Some(&dir.path().join("absent.yaml"))).is_err());
    }
}
