//! Client configuration loaded from the GUI config file

use crate::connection::ConnectionConfig;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default location of the config file, relative to the working directory
pub const DEFAULT_CONFIG_PATH: &str = "config/gui_config.json";

/// Environment variable overriding the config path
pub const CONFIG_ENV: &str = "PARACOOK_CONFIG";

/// Server API endpoint
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8000,
        }
    }
}

/// Optional link tuning; absent fields keep the built-in defaults
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkSection {
    pub reconnect_delay_ms: Option<u64>,
    pub max_reconnect_attempts: Option<u32>,
    pub heartbeat_interval_ms: Option<u64>,
    pub pong_timeout_ms: Option<u64>,
}

/// Top-level client configuration
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    pub api: ApiConfig,
    #[serde(default)]
    pub link: LinkSection,
}

impl ClientConfig {
    /// Parse a config document
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("Invalid client config")
    }

    /// Read and parse the config file at `path`
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_json(&text).with_context(|| format!("Failed to load {}", path.display()))
    }

    /// WebSocket endpoint of the server
    pub fn ws_url(&self) -> String {
        format!("ws://{}:{}/ws", self.api.host, self.api.port)
    }

    pub fn connection_config(&self) -> ConnectionConfig {
        let defaults = ConnectionConfig::default();
        let link = &self.link;

        ConnectionConfig {
            reconnect_delay: link
                .reconnect_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.reconnect_delay),
            max_reconnect_attempts: link
                .max_reconnect_attempts
                .unwrap_or(defaults.max_reconnect_attempts),
            heartbeat_interval: link
                .heartbeat_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.heartbeat_interval),
            pong_timeout: link.pong_timeout_ms.map(Duration::from_millis).or(defaults.pong_timeout),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gui_config_without_link_section() {
        let cfg = ClientConfig::from_json(r#"{"api":{"host":"10.0.0.5","port":8080}}"#).unwrap();
        assert_eq!(cfg.ws_url(), "ws://10.0.0.5:8080/ws");

        let conn = cfg.connection_config();
        assert_eq!(conn.reconnect_delay, Duration::from_millis(3000));
        assert_eq!(conn.max_reconnect_attempts, 5);
        assert_eq!(conn.heartbeat_interval, Duration::from_secs(30));
        assert_eq!(conn.pong_timeout, None);
    }

    #[test]
    fn test_link_section_overrides() {
        let json = r#"{
            "api": {"host": "localhost", "port": 8000},
            "link": {"reconnect_delay_ms": 500, "pong_timeout_ms": 10000}
        }"#;
        let conn = ClientConfig::from_json(json).unwrap().connection_config();
        assert_eq!(conn.reconnect_delay, Duration::from_millis(500));
        assert_eq!(conn.max_reconnect_attempts, 5);
        assert_eq!(conn.pong_timeout, Some(Duration::from_secs(10)));
    }

    #[test]
    fn test_unknown_sections_are_ignored() {
        let json = r#"{"api":{"host":"h","port":1},"frontend":{"port":5173}}"#;
        assert!(ClientConfig::from_json(json).is_ok());
    }

    #[test]
    fn test_missing_api_is_an_error() {
        assert!(ClientConfig::from_json(r#"{"link":{}}"#).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let name = format!("paracook-link-config-{}.json", std::process::id());
        let path = std::env::temp_dir().join(name);
        std::fs::write(&path, r#"{"api":{"host":"127.0.0.1","port":9001}}"#).unwrap();

        let cfg = ClientConfig::load(&path).unwrap();
        assert_eq!(cfg.api.port, 9001);

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_load_missing_file_names_path() {
        let err = ClientConfig::load("/nonexistent/gui_config.json").unwrap_err();
        assert!(format!("{:#}", err).contains("/nonexistent/gui_config.json"));
    }
}
