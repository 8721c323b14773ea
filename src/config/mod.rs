//! Configuration management module

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::site::SiteCredentials;

/// Application settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,

    #[serde(default)]
    pub migration: MigrationSettings,

    #[serde(default)]
    pub schemas: SchemaSettings,

    /// Credentials and overrides per site
    #[serde(default)]
    pub sites: Vec<SiteCredentials>,

    #[serde(skip)]
    config_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationSettings {
    /// Where rewritten torrents are written
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,

    /// How long finished jobs stay queryable
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,

    /// Cron expression for the cache eviction sweep
    #[serde(default = "default_eviction_cron")]
    pub eviction_cron: String,

    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,

    /// Broadcast buffer for progress events
    #[serde(default = "default_progress_capacity")]
    pub progress_capacity: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaSettings {
    /// Directory of `<site>.toml` overrides, re-read on every mapping pass
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_work_dir() -> PathBuf {
    PathBuf::from("./data/torrents")
}

fn default_retention_secs() -> u64 {
    3600
}

fn default_eviction_cron() -> String {
    "0 */5 * * * *".to_string()
}

fn default_http_timeout() -> u64 {
    30
}

fn default_progress_capacity() -> usize {
    256
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for MigrationSettings {
    fn default() -> Self {
        Self {
            work_dir: default_work_dir(),
            retention_secs: default_retention_secs(),
            eviction_cron: default_eviction_cron(),
            http_timeout_secs: default_http_timeout(),
            progress_capacity: default_progress_capacity(),
        }
    }
}

impl MigrationSettings {
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

impl Settings {
    /// Load settings from environment and config file
    pub fn load() -> Result<Self> {
        // Load .env file if present
        let _ = dotenvy::dotenv();

        let mut config_paths = vec![
            PathBuf::from("config.toml"),
            PathBuf::from("./data/config.toml"),
        ];
        if let Some(path) = dirs_config_path() {
            config_paths.push(path);
        }

        let mut settings = Settings::default();

        for path in config_paths.iter() {
            if path.exists() {
                settings = Self::load_from_file(path)?;
                settings.config_file = Some(path.clone());
                break;
            }
        }

        settings.apply_env_overrides();

        std::fs::create_dir_all(&settings.migration.work_dir)
            .context("Failed to create torrent work directory")?;

        Ok(settings)
    }

    fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        Self::from_toml(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("TRANSPLANT_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("TRANSPLANT_PORT") {
            if let Ok(port) = port.parse() {
                self.server.port = port;
            }
        }
        if let Ok(path) = std::env::var("TRANSPLANT_DATA_DIR") {
            let data = PathBuf::from(path);
            self.migration.work_dir = data.join("torrents");
            self.schemas.dir = Some(data.join("schemas"));
        }
        if let Ok(path) = std::env::var("TRANSPLANT_SCHEMA_DIR") {
            self.schemas.dir = Some(PathBuf::from(path));
        }
    }

    /// Get the path to the config file (if loaded from file)
    pub fn config_path(&self) -> Option<&Path> {
        self.config_file.as_deref()
    }
}

/// Get platform-specific config directory
fn dirs_config_path() -> Option<PathBuf> {
    #[cfg(target_os = "linux")]
    {
        std::env::var("XDG_CONFIG_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| {
                std::env::var("HOME")
                    .ok()
                    .map(|h| PathBuf::from(h).join(".config"))
            })
            .map(|p| p.join("transplant/config.toml"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var("HOME")
            .ok()
            .map(|h| PathBuf::from(h).join("Library/Application Support/transplant/config.toml"))
    }

    #[cfg(target_os = "windows")]
    {
        std::env::var("APPDATA")
            .ok()
            .map(|p| PathBuf::from(p).join("transplant/config.toml"))
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
    {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::from_toml("").unwrap();
        assert_eq!(settings.server.port, 3000);
        assert_eq!(settings.migration.retention_secs, 3600);
        assert_eq!(settings.migration.eviction_cron, "0 */5 * * * *");
        assert!(settings.schemas.dir.is_none());
        assert!(settings.sites.is_empty());
    }

    #[test]
    fn test_full_file() {
        let settings = Settings::from_toml(
            r#"
            [server]
            port = 8080

            [migration]
            work_dir = "/tmp/t"
            retention_secs = 60

            [schemas]
            dir = "/etc/transplant/schemas"

            [[sites]]
            id = "hdsky"
            passkey = "pk"
            cookie = "c=1"

            [[sites]]
            id = "custom"
            name = "Custom"
            base_url = "https://custom.example"
            tracker_url = "https://custom.example/announce?passkey={passkey}"
            profile = "inline_mediainfo"
            "#,
        )
        .unwrap();

        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.server.host, "0.0.0.0");
        assert_eq!(settings.migration.retention(), Duration::from_secs(60));
        assert_eq!(settings.migration.progress_capacity, 256);
        assert_eq!(settings.sites.len(), 2);
        assert_eq!(
            settings.sites[1].profile,
            Some(crate::site::ProfileKind::InlineMediaInfo)
        );
    }
}
