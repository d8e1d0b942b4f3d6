use serde::Deserialize;
use std::{fs, time::Duration};

use crate::auth::Role;

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub bind_addr: String,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

fn default_max_upload_bytes() -> usize {
    10 * 1024 * 1024
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    4
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub media_dir: String,
}

/// Zone used to localize wall-clock times without an offset.
#[derive(Debug, Clone, Deserialize)]
pub struct TimeConfig {
    pub zone: Option<String>,
    #[serde(default = "default_true")]
    pub system_fallback: bool,
}

impl Default for TimeConfig {
    fn default() -> Self {
        Self {
            zone: None,
            system_fallback: true,
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExtractorConfig {
    pub endpoint: String,
    #[serde(default = "default_extractor_timeout_ms")]
    pub timeout_ms: u64,
}

impl ExtractorConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

fn default_extractor_timeout_ms() -> u64 {
    15_000
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub bind_addr: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserConfig {
    pub id: String,
    pub token: String,
    pub role: Role,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub time: TimeConfig,
    pub extractor: Option<ExtractorConfig>,
    pub metrics: Option<MetricsConfig>,
    #[serde(default)]
    pub users: Vec<UserConfig>,
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        use std::env;

        let path = env::var("READINGS_CONFIG").unwrap_or_else(|_| "readings-config.toml".to_string());
        let contents = fs::read_to_string(&path)?;
        Ok(Self::from_toml_str(&contents)?)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_config() {
        let cfg = AppConfig::from_toml_str(
            r#"
            [server]
            bind_addr = "0.0.0.0:8080"
            max_upload_bytes = 2048

            [database]
            url = "sqlite://readings.db"
            max_connections = 2

            [storage]
            media_dir = "media"

            [time]
            zone = "Europe/Warsaw"
            system_fallback = false

            [extractor]
            endpoint = "http://127.0.0.1:9000/extract"
            timeout_ms = 500

            [metrics]
            bind_addr = "0.0.0.0:9100"

            [[users]]
            id = "alice"
            token = "t-alice"
            role = "reader"

            [[users]]
            id = "root"
            token = "t-root"
            role = "admin"
            "#,
        )
        .unwrap();

        assert_eq!(cfg.server.max_upload_bytes, 2048);
        assert_eq!(cfg.database.max_connections, 2);
        assert_eq!(cfg.time.zone.as_deref(), Some("Europe/Warsaw"));
        assert!(!cfg.time.system_fallback);
        assert_eq!(cfg.extractor.unwrap().timeout(), Duration::from_millis(500));
        assert_eq!(cfg.metrics.unwrap().bind_addr, "0.0.0.0:9100");
        assert_eq!(cfg.users.len(), 2);
        assert_eq!(cfg.users[1].role, Role::Admin);
    }

    #[test]
    fn optional_sections_default() {
        let cfg = AppConfig::from_toml_str(
            r#"
            [server]
            bind_addr = "127.0.0.1:8080"
            [database]
            url = "sqlite::memory:"
            [storage]
            media_dir = "/tmp/media"
            "#,
        )
        .unwrap();

        assert_eq!(cfg.server.max_upload_bytes, 10 * 1024 * 1024);
        assert_eq!(cfg.database.max_connections, 4);
        assert!(cfg.time.zone.is_none());
        assert!(cfg.time.system_fallback);
        assert!(cfg.extractor.is_none());
        assert!(cfg.metrics.is_none());
        assert!(cfg.users.is_empty());
    }

    #[test]
    fn unknown_role_is_rejected() {
        let err = AppConfig::from_toml_str(
            r#"
            [server]
            bind_addr = "127.0.0.1:8080"
            [database]
            url = "sqlite::memory:"
            [storage]
            media_dir = "media"
            [[users]]
            id = "x"
            token = "y"
            role = "superuser"
            "#,
        );
        assert!(err.is_err());
    }
}
