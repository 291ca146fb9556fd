//! Daemon configuration

use meshgate_web::{AuthConfig, BrokerSettings, MigrationDefaults};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Daemon configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Store directory path
    #[serde(default = "meshgate_common::default_store_path")]
    pub store_path: PathBuf,

    /// HTTP API listen address
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,

    /// Login and token settings
    #[serde(default)]
    pub auth: AuthConfig,

    /// Broker details handed to hosts
    #[serde(default)]
    pub broker: BrokerSettings,

    /// Defaults for hosts created by migration
    #[serde(default)]
    pub hosts: MigrationDefaults,

    #[serde(default)]
    pub cleanup: CleanupConfig,
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8081))
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            store_path: meshgate_common::default_store_path(),
            listen: default_listen(),
            auth: AuthConfig::default(),
            broker: BrokerSettings::default(),
            hosts: MigrationDefaults::default(),
            cleanup: CleanupConfig::default(),
        }
    }
}

/// Background ext client cleanup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupConfig {
    /// Pending jobs before new ones are dropped
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_queue_capacity() -> usize {
    256
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl DaemonConfig {
    /// Load configuration from file
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the database path
    pub fn db_path(&self) -> PathBuf {
        self.store_path.join("meshgate.db")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = DaemonConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.listen, default_listen());
        assert!(config.auth.basic_auth);
        assert_eq!(config.cleanup.queue_capacity, 256);
        assert!(config.hosts.auto_update);
        assert_eq!(config.hosts.interface_name, "meshgate");
    }

    #[test]
    fn test_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
store_path = "/var/lib/meshgate"
listen = "0.0.0.0:9000"

[auth]
basic_auth = false
jwt_secret = "s3cret"

[broker]
broker_type = "emqx"
"#,
        )
        .unwrap();

        let config = DaemonConfig::load(&path).unwrap();
        assert_eq!(config.db_path(), PathBuf::from("/var/lib/meshgate/meshgate.db"));
        assert_eq!(config.listen.port(), 9000);
        assert!(!config.auth.basic_auth);
        assert_eq!(config.auth.token_ttl_secs, 86400);
        assert_eq!(config.broker.broker_type, "emqx");
        assert_eq!(config.broker.server_name, "meshgate");
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = DaemonConfig::default();
        config.cleanup.queue_capacity = 8;
        config.save(&path).unwrap();

        let loaded = DaemonConfig::load(&path).unwrap();
        assert_eq!(loaded.cleanup.queue_capacity, 8);
        assert_eq!(loaded.store_path, config.store_path);
    }

    #[test]
    fn test_invalid_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "listen = 12").unwrap();
        assert!(DaemonConfig::load(&path).is_err());
    }
}
