//! Application configuration. Database location, server identity, log level.

use serde::Deserialize;
use std::path::PathBuf;

pub const DEFAULT_DATABASE_PATH: &str = "./data/axio.db";
pub const DEFAULT_LOG_LEVEL: &str = "info";
/// Seconds without a heartbeat before a client is considered stale.
pub const DEFAULT_HEARTBEAT_TIMEOUT_SECS: u64 = 600;
/// Seconds without contact before a client is considered gone.
pub const DEFAULT_INACTIVE_TIMEOUT_SECS: u64 = 86_400;

#[derive(Debug, Deserialize, Default)]
pub struct AppConfig {
    /// SQLite path or `sqlite://` URL. Read from DATABASE_URL or AXIO_DATABASE_URL.
    #[serde(default)]
    pub database_url: Option<String>,

    /// Name of this server instance. Read from SERVER_NAME or AXIO_SERVER_NAME.
    #[serde(default)]
    pub server_name: Option<String>,

    /// Default log level when RUST_LOG is unset. Read from LOG_LEVEL or AXIO_LOG_LEVEL.
    #[serde(default)]
    pub log_level: Option<String>,

    #[serde(default)]
    pub heartbeat_timeout_secs: Option<u64>,

    #[serde(default)]
    pub inactive_timeout_secs: Option<u64>,
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        dotenv::dotenv().ok();
        let mut c = config::Config::builder();
        c = c.add_source(config::Environment::with_prefix("AXIO"));
        if let Ok(path) = std::env::var("AXIO_CONFIG") {
            c = c.add_source(config::File::with_name(&path));
        }
        let mut cfg: Self = c.build()?.try_deserialize()?;
        // Deployments set these without the AXIO_ prefix.
        if let Ok(url) = std::env::var("DATABASE_URL") {
            cfg.database_url = Some(url);
        }
        if let Ok(name) = std::env::var("SERVER_NAME") {
            cfg.server_name = Some(name);
        }
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            cfg.log_level = Some(level);
        }
        Ok(cfg)
    }

    /// Filesystem path of the SQLite database. A `sqlite:` URL prefix is stripped.
    pub fn database_path_or_default(&self) -> PathBuf {
        let url = self
            .database_url
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(DEFAULT_DATABASE_PATH);
        let path = ["sqlite:///", "sqlite://", "sqlite:"]
            .iter()
            .find_map(|prefix| url.strip_prefix(prefix))
            .unwrap_or(url);
        PathBuf::from(path)
    }

    /// Server name, falling back to this machine's hostname.
    pub fn server_name_or_default(&self) -> String {
        self.server_name
            .clone()
            .unwrap_or_else(crate::utils::hostname::local_hostname)
    }

    pub fn log_level_or_default(&self) -> String {
        self.log_level
            .clone()
            .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string())
    }

    pub fn heartbeat_timeout_secs_or_default(&self) -> u64 {
        self.heartbeat_timeout_secs
            .unwrap_or(DEFAULT_HEARTBEAT_TIMEOUT_SECS)
    }

    pub fn inactive_timeout_secs_or_default(&self) -> u64 {
        self.inactive_timeout_secs
            .unwrap_or(DEFAULT_INACTIVE_TIMEOUT_SECS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_unset() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.database_path_or_default(), PathBuf::from(DEFAULT_DATABASE_PATH));
        assert_eq!(cfg.log_level_or_default(), "info");
        assert_eq!(cfg.heartbeat_timeout_secs_or_default(), 600);
        assert_eq!(cfg.inactive_timeout_secs_or_default(), 86_400);
    }

    #[test]
    fn sqlite_url_prefix_is_stripped() {
        let cfg = AppConfig {
            database_url: Some("sqlite:///var/lib/axio/jobs.db".into()),
            ..AppConfig::default()
        };
        assert_eq!(cfg.database_path_or_default(), PathBuf::from("var/lib/axio/jobs.db"));

        let plain = AppConfig {
            database_url: Some("/tmp/axio.db".into()),
            ..AppConfig::default()
        };
        assert_eq!(plain.database_path_or_default(), PathBuf::from("/tmp/axio.db"));
    }
}
