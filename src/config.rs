use std::time::Duration;
use std::{fs, path::Path};

use serde::Deserialize;

use crate::errors::ConfigError;

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// Address the public API binds to.
    pub host: String,

    /// TCP port of the public API.
    pub port: u16,

    /// Number of public worker processes.
    ///
    /// Forced to 1 when both surfaces run in the same process, since the
    /// admin socket cannot be shared between processes.
    pub workers: usize,

    /// SQLite file shared by every process of the deployment.
    pub database_path: String,

    /// Filesystem path of the admin Unix socket.
    pub admin_socket: String,

    /// Log level for tracing (e.g. "info", "debug").
    pub log_level: String,

    /// Reported by the readiness and liveness probes.
    pub service_name: String,

    pub cors: CorsConfig,

    pub store: StoreConfig,
}

/// Cross-origin settings for the public API. The admin API never gets CORS.
#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct CorsConfig {
    pub enabled: bool,
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct StoreConfig {
    /// Longest a single operation waits on the database lock.
    pub lock_timeout_secs: u64,

    /// Attempts per write before giving up.
    pub write_attempts: u32,

    /// Base delay between write attempts, multiplied by the attempt number.
    pub retry_backoff_ms: u64,

    /// Connections per process.
    pub max_connections: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            lock_timeout_secs: 30,
            write_attempts: 3,
            retry_backoff_ms: 50,
            max_connections: 5,
        }
    }
}

impl StoreConfig {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            workers: 1,
            database_path: "/tmp/dualgate.db".to_string(),
            admin_socket: "/tmp/dualgate-admin.sock".to_string(),
            log_level: "info".to_string(),
            service_name: "dualgate".to_string(),
            cors: CorsConfig::default(),
            store: StoreConfig::default(),
        }
    }
}

impl AppConfig {
    /// Parse a JSON config file. Fields missing from the file keep their defaults.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let file = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;

        serde_json::from_str::<AppConfig>(&file).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from any variable source.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("HOST") {
            self.host = host;
        }
        if let Some(port) = lookup("PORT") {
            self.port = parse_var("PORT", port)?;
        }
        if let Some(workers) = lookup("WORKERS") {
            self.workers = parse_var("WORKERS", workers)?;
        }
        if let Some(path) = lookup("DATABASE_PATH") {
            self.database_path = path;
        }
        if let Some(path) = lookup("ADMIN_SOCKET") {
            self.admin_socket = path;
        }
        if let Some(level) = lookup("LOG_LEVEL") {
            self.log_level = level;
        }
        if let Some(name) = lookup("SERVICE_NAME") {
            self.service_name = name;
        }
        if let Some(enabled) = lookup("ENABLE_CORS") {
            self.cors.enabled = enabled.trim().eq_ignore_ascii_case("true");
        }
        if let Some(origins) = lookup("ALLOWED_ORIGINS") {
            self.cors.allowed_origins = origins
                .split(',')
                .map(str::trim)
                .filter(|origin| !origin.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(secs) = lookup("LOCK_TIMEOUT_SECS") {
            self.store.lock_timeout_secs = parse_var("LOCK_TIMEOUT_SECS", secs)?;
        }
        if let Some(attempts) = lookup("WRITE_ATTEMPTS") {
            self.store.write_attempts = parse_var("WRITE_ATTEMPTS", attempts)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::Invalid("workers must be at least 1".into()));
        }
        if self.database_path.trim().is_empty() {
            return Err(ConfigError::Invalid("database_path is empty".into()));
        }
        if self.admin_socket.trim().is_empty() {
            return Err(ConfigError::Invalid("admin_socket is empty".into()));
        }
        if self.store.write_attempts == 0 {
            return Err(ConfigError::Invalid(
                "store.write_attempts must be at least 1".into(),
            ));
        }
        if self.store.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "store.max_connections must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Origins the public API accepts cross-origin requests from, if any.
    pub fn cors_origins(&self) -> Option<&[String]> {
        if self.cors.enabled && !self.cors.allowed_origins.is_empty() {
            Some(&self.cors.allowed_origins)
        } else {
            None
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse::<T>()
        .map_err(|_| ConfigError::InvalidValue { name, value })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults_are_valid() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.port, 8000);
        assert_eq!(cfg.workers, 1);
        assert_eq!(cfg.store.write_attempts, 3);
        assert_eq!(cfg.store.lock_timeout(), Duration::from_secs(30));
        assert!(cfg.validate().is_ok());
        assert!(cfg.cors_origins().is_none());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{ "port": 9001, "store": { "write_attempts": 5 } }"#).unwrap();

        let cfg = AppConfig::load_from_file(&path).unwrap();
        assert_eq!(cfg.port, 9001);
        assert_eq!(cfg.store.write_attempts, 5);
        assert_eq!(cfg.store.lock_timeout_secs, 30);
        assert_eq!(cfg.host, "0.0.0.0");
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let err = AppConfig::load_from_file(Path::new("/nonexistent/dualgate.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();

        let err = AppConfig::load_from_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_overrides() {
        let env = vars(&[
            ("PORT", "8080"),
            ("WORKERS", "4"),
            ("ENABLE_CORS", "TRUE"),
            ("ALLOWED_ORIGINS", "https://a.example, ,https://b.example"),
            ("DATABASE_PATH", "/var/lib/dualgate.db"),
        ]);
        let mut cfg = AppConfig::default();
        cfg.apply_overrides(|name| env.get(name).cloned()).unwrap();

        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.workers, 4);
        assert_eq!(cfg.database_path, "/var/lib/dualgate.db");
        assert_eq!(
            cfg.cors_origins().unwrap(),
            ["https://a.example".to_string(), "https://b.example".to_string()]
        );
    }

    #[test]
    fn test_bad_numeric_override() {
        let env = vars(&[("PORT", "eighty")]);
        let mut cfg = AppConfig::default();
        let err = cfg.apply_overrides(|name| env.get(name).cloned()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { name: "PORT", .. }));
    }

    #[test]
    fn test_validate_rejects_zero_workers() {
        let cfg = AppConfig {
            workers: 0,
            ..AppConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_cors_enabled_without_origins_is_off() {
        let mut cfg = AppConfig::default();
        cfg.cors.enabled = true;
        assert!(cfg.cors_origins().is_none());
    }
}
