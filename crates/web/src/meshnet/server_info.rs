//! Server descriptor handed to hosts after registration.
//!
//! Uses x25519-dalek for the traffic key pair.

use base64::{engine::general_purpose::STANDARD, Engine};
use meshgate_common::{Collection, Error, RecordStore, Result, ServerConfig};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use x25519_dalek::{PublicKey, StaticSecret};

/// System record holding the server traffic key pair
pub const TRAFFIC_KEY_RECORD: &str = "server.trafficKey";

/// Broker identity and version advertised to hosts
pub trait ServerInfoProvider: Send + Sync {
    fn server_config(&self) -> ServerConfig;

    /// Base64 public half of the server traffic key
    fn traffic_public_key(&self) -> Result<String>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerSettings {
    #[serde(default = "default_server_name")]
    pub server_name: String,
    #[serde(default = "default_broker_endpoint")]
    pub broker_endpoint: String,
    /// `mosquitto` or `emqx`
    #[serde(default = "default_broker_type")]
    pub broker_type: String,
    #[serde(default = "default_api_endpoint")]
    pub api_endpoint: String,
    #[serde(default = "default_version")]
    pub version: String,
}

fn default_server_name() -> String { "meshgate".to_string() }
fn default_broker_endpoint() -> String { "wss://broker.meshgate.local".to_string() }
fn default_broker_type() -> String { "mosquitto".to_string() }
fn default_api_endpoint() -> String { "https://api.meshgate.local".to_string() }
fn default_version() -> String { meshgate_common::VERSION.to_string() }

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            server_name: default_server_name(),
            broker_endpoint: default_broker_endpoint(),
            broker_type: default_broker_type(),
            api_endpoint: default_api_endpoint(),
            version: default_version(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TrafficKeyPair {
    private_key: String,
    public_key: String,
}

fn generate_traffic_keypair() -> TrafficKeyPair {
    let secret = StaticSecret::random_from_rng(rand::rngs::OsRng);
    let public = PublicKey::from(&secret);
    TrafficKeyPair {
        private_key: STANDARD.encode(secret.to_bytes()),
        public_key: STANDARD.encode(public.as_bytes()),
    }
}

/// Broker settings from configuration, traffic key from the record store
pub struct StoreServerInfo {
    store: Arc<dyn RecordStore>,
    broker: BrokerSettings,
}

impl StoreServerInfo {
    pub fn new(store: Arc<dyn RecordStore>, broker: BrokerSettings) -> Self {
        Self { store, broker }
    }

    /// Load the traffic key pair, generating and storing it on first use
    pub fn ensure_traffic_key(&self) -> Result<String> {
        if let Some(body) = self.store.get_raw(Collection::System, TRAFFIC_KEY_RECORD)? {
            let pair: TrafficKeyPair = serde_json::from_str(&body)?;
            return Ok(pair.public_key);
        }

        let pair = generate_traffic_keypair();
        self.store
            .put_raw(Collection::System, TRAFFIC_KEY_RECORD, &serde_json::to_string(&pair)?)?;
        info!("Generated server traffic key");
        Ok(pair.public_key)
    }
}

impl ServerInfoProvider for StoreServerInfo {
    fn server_config(&self) -> ServerConfig {
        ServerConfig {
            server: self.broker.server_name.clone(),
            api_endpoint: self.broker.api_endpoint.clone(),
            broker_endpoint: self.broker.broker_endpoint.clone(),
            broker_type: self.broker.broker_type.clone(),
            mq_username: String::new(),
            traffic_key: String::new(),
            version: self.broker.version.clone(),
        }
    }

    fn traffic_public_key(&self) -> Result<String> {
        self.ensure_traffic_key()
            .map_err(|e| Error::internal(format!("failed to load server traffic key: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshgate_common::Database;

    #[test]
    fn test_traffic_key_is_stable() {
        let db = Arc::new(Database::open_memory().unwrap());
        let info = StoreServerInfo::new(db.clone(), BrokerSettings::default());

        let first = info.traffic_public_key().unwrap();
        let second = info.traffic_public_key().unwrap();
        assert_eq!(first, second);
        assert_eq!(STANDARD.decode(&first).unwrap().len(), 32);

        // A second provider over the same store sees the same key
        let again = StoreServerInfo::new(db, BrokerSettings::default());
        assert_eq!(again.traffic_public_key().unwrap(), first);
    }

    #[test]
    fn test_server_config_from_settings() {
        let db = Arc::new(Database::open_memory().unwrap());
        let broker = BrokerSettings {
            broker_type: "EMQX".into(),
            ..Default::default()
        };
        let info = StoreServerInfo::new(db, broker);
        let config = info.server_config();
        assert_eq!(config.server, "meshgate");
        assert_eq!(config.broker_type, "EMQX");
        assert!(config.is_emqx());
        assert!(config.traffic_key.is_empty());
    }
}
