pub mod presets;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Directory under the platform config dir holding all scqbuds files.
pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("scqbuds")
}

/// Application configuration stored as TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Selected device Bluetooth address.
    pub device_address: Option<String>,
    /// Selected device name.
    pub device_name: Option<String>,
    #[serde(default)]
    pub session: SessionConfig,
}

/// Timeouts and buffering for a connection attempt and the resulting session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// How long to wait for service discovery after connecting.
    pub ready_timeout_ms: u64,
    /// How long each initial state request waits for an answer.
    pub state_request_timeout_ms: u64,
    /// How many state requests are sent before giving up.
    pub state_request_attempts: u32,
    /// Pause between state request attempts.
    pub state_request_retry_delay_ms: u64,
    /// Notifications kept for a slow consumer before the oldest are dropped.
    pub notification_buffer: usize,
    /// Quiet period before a burst of equalizer changes is sent.
    pub equalizer_debounce_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ready_timeout_ms: 4000,
            state_request_timeout_ms: 1000,
            state_request_attempts: 3,
            state_request_retry_delay_ms: 0,
            notification_buffer: 8,
            equalizer_debounce_ms: 200,
        }
    }
}

impl SessionConfig {
    pub fn ready_timeout(&self) -> Duration {
        Duration::from_millis(self.ready_timeout_ms)
    }

    pub fn state_request_timeout(&self) -> Duration {
        Duration::from_millis(self.state_request_timeout_ms)
    }

    pub fn state_request_retry_delay(&self) -> Duration {
        Duration::from_millis(self.state_request_retry_delay_ms)
    }

    pub fn equalizer_debounce(&self) -> Duration {
        Duration::from_millis(self.equalizer_debounce_ms)
    }
}

impl AppConfig {
    /// Config file path: ~/.config/scqbuds/config.toml
    pub fn path() -> PathBuf {
        config_dir().join("config.toml")
    }

    /// Load config from disk, or return defaults.
    pub fn load() -> Self {
        let path = Self::path();
        if path.exists() {
            match std::fs::read_to_string(&path) {
                Ok(contents) => match Self::parse(&contents) {
                    Ok(config) => return config,
                    Err(e) => tracing::warn!("Failed to parse config: {}", e),
                },
                Err(e) => tracing::warn!("Failed to read config: {}", e),
            }
        }
        Self::default()
    }

    pub fn parse(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Save config to disk.
    pub fn save(&self) -> Result<()> {
        let path = Self::path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;
        tracing::info!("Config saved to {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = AppConfig::parse("").unwrap();
        assert!(config.device_address.is_none());
        assert_eq!(config.session, SessionConfig::default());
        assert_eq!(config.session.state_request_attempts, 3);
        assert_eq!(config.session.ready_timeout(), Duration::from_secs(4));
    }

    #[test]
    fn test_partial_session_section() {
        let config = AppConfig::parse(
            r#"
            device_address = "AC:12:2F:00:00:01"

            [session]
            state_request_attempts = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.device_address.as_deref(), Some("AC:12:2F:00:00:01"));
        assert_eq!(config.session.state_request_attempts, 5);
        assert_eq!(config.session.state_request_timeout_ms, 1000);
    }

    #[test]
    fn test_roundtrip_through_toml() {
        let config = AppConfig {
            device_name: Some("Soundcore Life Q30".into()),
            ..Default::default()
        };
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed = AppConfig::parse(&text).unwrap();
        assert_eq!(parsed.device_name, config.device_name);
        assert_eq!(parsed.session, config.session);
    }
}
