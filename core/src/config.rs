//! Configuration loading
//!
//! A single JSON file (`config.json` by default) configures the bridge.
//! A missing file is not an error: every field has a default and the
//! token can still arrive through the environment.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, Result};

/// Tokens shipped in the sample config that must never authenticate.
const PLACEHOLDER_TOKEN: &str = "change-me-to-a-secure-token";

/// Main configuration structure
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    /// Address the WebSocket server binds to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port the WebSocket server binds to
    #[serde(default = "default_port")]
    pub port: u16,

    /// Auth token; the OKXUS_AUTH_TOKEN environment variable wins over this
    #[serde(default)]
    pub auth_token: String,

    /// Log level name (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// How responses are acquired from Kiro
    #[serde(default)]
    pub response_mode: ResponseMode,

    /// Base directory holding the inbox/ and outbox/ queue directories
    #[serde(default = "default_queue_dir")]
    pub queue_dir: PathBuf,

    /// Text the inbox watcher types into the Kiro chat to trigger the hook
    #[serde(default = "default_nudge_text")]
    pub nudge_text: String,

    /// Override for the response wait deadline, in seconds.
    /// When unset the mode default applies (60s monitor, 120s file).
    #[serde(default)]
    pub response_timeout_secs: Option<u64>,
}

/// Which of the two completion-observation strategies to use
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ResponseMode {
    /// Watch the chat area until its text stops changing
    #[default]
    Monitor,
    /// Hand the request to the Kiro hook through the file queue
    File,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8765
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_queue_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_nudge_text() -> String {
    "check inbox".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            auth_token: String::new(),
            log_level: default_log_level(),
            response_mode: ResponseMode::default(),
            queue_dir: default_queue_dir(),
            nudge_text: default_nudge_text(),
            response_timeout_secs: None,
        }
    }
}

impl Config {
    /// Load configuration from `path`, falling back to defaults when the
    /// file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::warn!("config file {} not found, using defaults", path.display());
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        serde_json::from_str(&raw).map_err(|e| BridgeError::InvalidConfig {
            message: format!("{}: {e}", path.display()),
        })
    }

    /// The configured token, with empty and placeholder values treated
    /// as absent.
    pub fn auth_token(&self) -> Option<&str> {
        match self.auth_token.as_str() {
            "" | PLACEHOLDER_TOKEN => None,
            token => Some(token),
        }
    }

    /// Response wait deadline, honoring the per-mode default.
    pub fn response_timeout(&self) -> std::time::Duration {
        let secs = self.response_timeout_secs.unwrap_or(match self.response_mode {
            ResponseMode::Monitor => 60,
            ResponseMode::File => 120,
        });
        std::time::Duration::from_secs(secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join("config.json")).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 8765);
        assert_eq!(config.response_mode, ResponseMode::Monitor);
        assert!(config.auth_token().is_none());
    }

    #[test]
    fn test_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"host":"127.0.0.1","port":9000,"auth_token":"t","response_mode":"file","response_timeout_secs":15}"#,
        )
        .unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 9000);
        assert_eq!(config.auth_token(), Some("t"));
        assert_eq!(config.response_mode, ResponseMode::File);
        assert_eq!(config.response_timeout(), Duration::from_secs(15));
    }

    #[test]
    fn test_placeholder_token_is_treated_as_unset() {
        let config = Config {
            auth_token: "change-me-to-a-secure-token".to_string(),
            ..Config::default()
        };
        assert!(config.auth_token().is_none());
    }

    #[test]
    fn test_invalid_json_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            Config::load(&path),
            Err(BridgeError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_mode_defaults_for_timeout() {
        let monitor = Config::default();
        assert_eq!(monitor.response_timeout(), Duration::from_secs(60));
        let file = Config {
            response_mode: ResponseMode::File,
            ..Config::default()
        };
        assert_eq!(file.response_timeout(), Duration::from_secs(120));
    }
}
