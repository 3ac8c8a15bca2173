//! Daemon configuration handling.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use sessionforge_core::client::{DEFAULT_BASE_URL, DEFAULT_MAX_ATTEMPTS, DEFAULT_REQUEST_TIMEOUT};
use sessionforge_core::{CredentialStoreConfig, HealthConfig, ProbeConfig};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Path to the configuration file that was loaded.
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Logging level, used when `RUST_LOG` is unset.
    pub log_level: String,

    pub credentials: CredentialStoreConfig,

    pub probe: ProbeConfig,

    pub api: ApiConfig,

    pub health: HealthConfig,
}

/// Web API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,

    /// Retries allowed per call for network errors and rate limits.
    pub max_attempts: u32,

    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            timeout_secs: DEFAULT_REQUEST_TIMEOUT.as_secs(),
        }
    }
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            config_path: PathBuf::new(),
            log_level: "info".to_string(),
            credentials: CredentialStoreConfig::default(),
            probe: ProbeConfig::default(),
            api: ApiConfig::default(),
            health: HealthConfig::default(),
        }
    }
}

impl DaemonConfig {
    /// Parse configuration from TOML text.
    pub fn from_toml(contents: &str) -> Result<Self> {
        toml::from_str(contents).context("Failed to parse daemon configuration")
    }
}

/// Default location of `daemon.toml`.
pub fn default_config_path() -> PathBuf {
    project_dirs()
        .map(|d| d.config_dir().join("daemon.toml"))
        .unwrap_or_else(|| PathBuf::from("sessionforge-daemon.toml"))
}

/// Load configuration from the default location or fall back to defaults.
pub fn load_config() -> Result<DaemonConfig> {
    load_config_from(&default_config_path())
}

/// Load configuration from `path`, falling back to defaults when it does not exist.
pub fn load_config_from(path: &Path) -> Result<DaemonConfig> {
    let mut config = if path.exists() {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {:?}", path))?;
        DaemonConfig::from_toml(&contents)
            .with_context(|| format!("Invalid config in {:?}", path))?
    } else {
        DaemonConfig::default()
    };

    config.config_path = path.to_path_buf();
    Ok(config)
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "raibid-labs", "sessionforge")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = DaemonConfig::from_toml("").unwrap();
        assert_eq!(config.log_level, "info");
        assert_eq!(config.api.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.api.max_attempts, 3);
        assert_eq!(config.health.interval_secs, 30 * 60);
        assert_eq!(config.credentials.token_env, "SLACK_TOKEN");
        assert!(config.probe.command.is_none());
    }

    #[test]
    fn test_partial_sections_keep_other_defaults() {
        let config = DaemonConfig::from_toml(
            r#"
            log_level = "debug"

            [credentials]
            file = "/tmp/creds.json"
            use_secure_store = false

            [probe]
            command = "/usr/local/bin/extract-session"
            args = ["--workspace", "acme"]

            [api]
            max_attempts = 5

            [health]
            warning_after_secs = 3600
            "#,
        )
        .unwrap();

        assert_eq!(config.log_level, "debug");
        assert_eq!(config.credentials.file, PathBuf::from("/tmp/creds.json"));
        assert!(!config.credentials.use_secure_store);
        assert_eq!(config.credentials.cookie_env, "SLACK_COOKIE");
        assert_eq!(config.probe.args, vec!["--workspace", "acme"]);
        assert_eq!(config.probe.timeout_secs, 60);
        assert_eq!(config.api.max_attempts, 5);
        assert_eq!(config.api.timeout(), Duration::from_secs(30));
        assert_eq!(config.health.warning_after_secs, 3600);
        assert_eq!(config.health.critical_after_secs, 10 * 60 * 60);
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        assert!(DaemonConfig::from_toml("[api\nmax_attempts = ").is_err());
        assert!(DaemonConfig::from_toml("[api]\nmax_attempts = \"many\"").is_err());
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("daemon.toml");

        let config = load_config_from(&path).unwrap();

        assert_eq!(config.config_path, path);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_load_from_file() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("daemon.toml");
        std::fs::write(&path, "[api]\nbase_url = \"http://localhost:9000/api\"\n").unwrap();

        let config = load_config_from(&path).unwrap();

        assert_eq!(config.api.base_url, "http://localhost:9000/api");
        assert_eq!(config.config_path, path);
    }
}
