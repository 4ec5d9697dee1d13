//! Configuration management for anistream
//!
//! Handles config file loading/saving and environment overrides.
//! Config is stored at ~/.config/anistream/config.toml

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::models::{DeviceKind, PlaybackType};
use crate::stream::engine::EngineKind;

/// Environment variable overriding the server URL
pub const SERVER_URL_ENV: &str = "ANISTREAM_SERVER_URL";

const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:43211";

/// Application configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Backend serving search and the streaming engines
    pub server_url: String,
    /// Separate backend for adult catalog searches
    pub adult_catalog_url: Option<String>,
    /// Engine used for streams
    pub engine: EngineKind,
    /// External player link template, e.g. `vlc://{url}`
    pub external_player_link: Option<String>,
    /// Default playback preference
    pub playback: PlaybackType,
    /// Kind of client this CLI acts as
    pub device: DeviceKind,
    /// Preferred resolution (1080p, 720p, ...)
    pub preferred_resolution: Option<String>,
    /// Seconds to wait for the engine to acknowledge a download
    pub resolve_timeout_secs: u64,
    /// Milliseconds between engine status polls
    pub poll_interval_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            adult_catalog_url: None,
            engine: EngineKind::Torrent,
            external_player_link: None,
            playback: PlaybackType::Default,
            device: DeviceKind::Desktop,
            preferred_resolution: None,
            resolve_timeout_secs: 60,
            poll_interval_ms: 1000,
        }
    }
}

impl Config {
    /// Get config file path (~/.config/anistream/config.toml)
    pub fn path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("anistream").join("config.toml"))
    }

    /// Load config from the default path, or return defaults if not found
    pub fn load() -> Self {
        Self::path()
            .and_then(|p| Self::load_from(&p).ok())
            .unwrap_or_default()
            .with_env_overrides()
    }

    /// Load config from an explicit path
    pub fn load_from(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Config = toml::from_str(&text)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        Ok(config.with_env_overrides())
    }

    /// Save config to the default path
    pub fn save(&self) -> Result<()> {
        let path = Self::path().ok_or_else(|| anyhow::anyhow!("Could not determine config path"))?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Create parent directory if needed
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let toml = toml::to_string_pretty(self)?;
        std::fs::write(path, toml)?;
        Ok(())
    }

    fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var(SERVER_URL_ENV) {
            if !url.trim().is_empty() {
                self.server_url = url;
            }
        }
        self
    }

    pub fn resolve_timeout(&self) -> Duration {
        Duration::from_secs(self.resolve_timeout_secs.max(1))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(50))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.engine, EngineKind::Torrent);
        assert!(config.external_player_link.is_none());
        assert_eq!(config.resolve_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            engine = "debrid"
            external_player_link = "vlc://{url}"
            playback = "externalPlayerLink"
            "#,
        )
        .unwrap();
        assert_eq!(config.engine, EngineKind::Debrid);
        assert_eq!(config.playback, PlaybackType::ExternalPlayerLink);
        assert_eq!(config.poll_interval_ms, 1000);
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let config = Config {
            preferred_resolution: Some("1080p".into()),
            ..Default::default()
        };
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.preferred_resolution.as_deref(), Some("1080p"));
    }
}
