//! Core entity model for meshgate

use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::net::{IpAddr, SocketAddr};
use uuid::Uuid;

/// Where a user's credentials are managed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserOrigin {
    Local,
    External,
}

impl Default for UserOrigin {
    fn default() -> Self {
        Self::Local
    }
}

impl std::fmt::Display for UserOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::External => write!(f, "external"),
        }
    }
}

// ============================================================================
// Users
// ============================================================================

/// Stored user record. `password` holds the credential hash, never plaintext.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub is_super_admin: bool,
    /// Remote access gateways this user may connect through
    #[serde(default)]
    pub remote_gw_ids: BTreeSet<Uuid>,
    #[serde(default)]
    pub origin: UserOrigin,
    #[serde(default)]
    pub last_login: Option<i64>,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub updated_at: i64,
}

impl User {
    pub fn new(username: impl Into<String>, password_hash: impl Into<String>) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            username: username.into(),
            password: password_hash.into(),
            is_admin: false,
            is_super_admin: false,
            remote_gw_ids: BTreeSet::new(),
            origin: UserOrigin::Local,
            last_login: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Admins and the super-admin see every gateway implicitly
    pub fn is_elevated(&self) -> bool {
        self.is_admin || self.is_super_admin
    }

    pub fn is_external(&self) -> bool {
        self.origin != UserOrigin::Local
    }

    pub fn touch(&mut self) {
        self.updated_at = chrono::Utc::now().timestamp();
    }
}

/// User as returned to API callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserView {
    pub username: String,
    pub is_admin: bool,
    pub is_super_admin: bool,
    pub remote_gw_ids: BTreeSet<Uuid>,
    pub origin: UserOrigin,
    pub last_login: Option<i64>,
}

impl From<&User> for UserView {
    fn from(user: &User) -> Self {
        Self {
            username: user.username.clone(),
            is_admin: user.is_admin,
            is_super_admin: user.is_super_admin,
            remote_gw_ids: user.remote_gw_ids.clone(),
            origin: user.origin,
            last_login: user.last_login,
        }
    }
}

// ============================================================================
// Hosts and nodes
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostInterface {
    pub name: String,
    #[serde(default)]
    pub address: String,
}

/// A physical or virtual device. Owns one node per network it joins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Host {
    pub id: Uuid,
    pub name: String,
    pub interface: String,
    #[serde(default)]
    pub listen_port: u16,
    #[serde(default)]
    pub mtu: u32,
    /// Base64 WireGuard public key, empty when unknown
    #[serde(default)]
    pub public_key: String,
    /// Canonical `aa:bb:cc:dd:ee:ff`, empty when unknown
    #[serde(default)]
    pub mac_address: String,
    #[serde(default)]
    pub traffic_key_public: String,
    #[serde(default)]
    pub internet_gateway: Option<SocketAddr>,
    #[serde(default)]
    pub endpoint_ip: Option<IpAddr>,
    #[serde(default)]
    pub interfaces: Vec<HostInterface>,
    #[serde(default)]
    pub ip_forwarding: bool,
    #[serde(default)]
    pub auto_update: bool,
    #[serde(default)]
    pub is_docker: bool,
    #[serde(default)]
    pub is_k8s: bool,
    #[serde(default)]
    pub is_static: bool,
    #[serde(default)]
    pub nodes: Vec<Uuid>,
}

impl Host {
    pub fn new(name: impl Into<String>, interface: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            interface: interface.into(),
            listen_port: 0,
            mtu: 0,
            public_key: String::new(),
            mac_address: String::new(),
            traffic_key_public: String::new(),
            internet_gateway: None,
            endpoint_ip: None,
            interfaces: Vec::new(),
            ip_forwarding: false,
            auto_update: false,
            is_docker: false,
            is_k8s: false,
            is_static: false,
            nodes: Vec::new(),
        }
    }
}

/// A host's membership in one network
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: Uuid,
    pub host_id: Uuid,
    pub network: String,
    #[serde(default)]
    pub address: Option<IpNetwork>,
    #[serde(default)]
    pub address6: Option<IpNetwork>,
    #[serde(default)]
    pub local_address: Option<IpAddr>,
    #[serde(default)]
    pub server: String,
    #[serde(default)]
    pub connected: bool,
    #[serde(default)]
    pub is_egress_gateway: bool,
    #[serde(default)]
    pub egress_gateway_ranges: Vec<String>,
    #[serde(default)]
    pub egress_gateway_nat_enabled: bool,
    #[serde(default)]
    pub is_ingress_gateway: bool,
    #[serde(default)]
    pub ingress_gateway_range: String,
    #[serde(default)]
    pub ingress_gateway_range6: String,
    #[serde(default)]
    pub is_relay: bool,
    #[serde(default)]
    pub is_relayed: bool,
    #[serde(default)]
    pub relayed_nodes: Vec<String>,
    #[serde(default)]
    pub dns_on: bool,
    /// Seconds
    #[serde(default)]
    pub persistent_keepalive: u32,
    #[serde(default)]
    pub default_acl: String,
    #[serde(default)]
    pub owner_id: String,
    #[serde(default)]
    pub failover: bool,
    #[serde(default)]
    pub failover_node: Option<Uuid>,
    #[serde(default)]
    pub pending_delete: bool,
    #[serde(default)]
    pub expiration: Option<i64>,
    #[serde(default)]
    pub last_modified: i64,
}

impl Node {
    pub fn new(id: Uuid, host_id: Uuid, network: impl Into<String>) -> Self {
        Self {
            id,
            host_id,
            network: network.into(),
            address: None,
            address6: None,
            local_address: None,
            server: String::new(),
            connected: false,
            is_egress_gateway: false,
            egress_gateway_ranges: Vec::new(),
            egress_gateway_nat_enabled: false,
            is_ingress_gateway: false,
            ingress_gateway_range: String::new(),
            ingress_gateway_range6: String::new(),
            is_relay: false,
            is_relayed: false,
            relayed_nodes: Vec::new(),
            dns_on: false,
            persistent_keepalive: 0,
            default_acl: String::new(),
            owner_id: String::new(),
            failover: false,
            failover_node: None,
            pending_delete: false,
            expiration: None,
            last_modified: chrono::Utc::now().timestamp(),
        }
    }
}

// ============================================================================
// Remote access clients
// ============================================================================

/// Remote access client profile bound to one ingress gateway node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtClient {
    pub client_id: String,
    pub network: String,
    pub owner_id: String,
    pub ingress_gateway_id: Uuid,
    #[serde(default)]
    pub remote_access_client_id: String,
    #[serde(default)]
    pub public_key: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub last_modified: i64,
}

fn default_true() -> bool {
    true
}

impl ExtClient {
    /// Store key; client ids are only unique within a network
    pub fn record_key(&self) -> String {
        ext_client_key(&self.network, &self.client_id)
    }
}

pub fn ext_client_key(network: &str, client_id: &str) -> String {
    format!("{}/{}", network, client_id)
}

/// One entry of a user's remote access gateway view
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRemoteGateway {
    pub gw_id: Uuid,
    pub gw_name: String,
    pub network: String,
    #[serde(default)]
    pub gw_client: Option<ExtClient>,
    pub connected: bool,
}

// ============================================================================
// Server descriptor
// ============================================================================

/// Broker and key material handed to a freshly registered host
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub server: String,
    pub api_endpoint: String,
    pub broker_endpoint: String,
    pub broker_type: String,
    #[serde(default)]
    pub mq_username: String,
    #[serde(default)]
    pub traffic_key: String,
    pub version: String,
}

impl ServerConfig {
    /// EMQX brokers authenticate hosts by their host id
    pub fn is_emqx(&self) -> bool {
        self.broker_type.eq_ignore_ascii_case("emqx")
    }
}

/// Everything a host needs after joining or migrating
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostPull {
    pub host: Host,
    pub nodes: Vec<Node>,
    pub server_config: ServerConfig,
}

// ============================================================================
// Legacy records
// ============================================================================

/// Pre-split node record. Booleans are stored as strings ("yes"/"no").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LegacyNode {
    pub id: String,
    pub name: String,
    pub network: String,
    pub password: String,
    pub address: String,
    pub address6: String,
    #[serde(rename = "localaddress")]
    pub local_address: String,
    #[serde(rename = "networksettings")]
    pub network_settings: LegacyNetworkSettings,
    #[serde(rename = "listenport")]
    pub listen_port: i32,
    pub mtu: i32,
    #[serde(rename = "publickey")]
    pub public_key: String,
    #[serde(rename = "macaddress")]
    pub mac_address: String,
    #[serde(rename = "traffickeys")]
    pub traffic_keys: LegacyTrafficKeys,
    #[serde(rename = "internetgateway")]
    pub internet_gateway: String,
    pub interfaces: Vec<LegacyInterface>,
    pub endpoint: String,
    #[serde(rename = "persistentkeepalive")]
    pub persistent_keepalive: i32,
    #[serde(rename = "expdatetime")]
    pub expiration_date_time: i64,
    pub server: String,
    pub connected: String,
    #[serde(rename = "ipforwarding")]
    pub ip_forwarding: String,
    #[serde(rename = "isdocker")]
    pub is_docker: String,
    #[serde(rename = "isk8s")]
    pub is_k8s: String,
    #[serde(rename = "isstatic")]
    pub is_static: String,
    #[serde(rename = "isegressgateway")]
    pub is_egress_gateway: String,
    #[serde(rename = "egressgatewayranges")]
    pub egress_gateway_ranges: Vec<String>,
    #[serde(rename = "egressgatewaynatenabled")]
    pub egress_gateway_nat_enabled: String,
    #[serde(rename = "isingressgateway")]
    pub is_ingress_gateway: String,
    #[serde(rename = "ingressgatewayrange")]
    pub ingress_gateway_range: String,
    #[serde(rename = "ingressgatewayrange6")]
    pub ingress_gateway_range6: String,
    #[serde(rename = "isrelayed")]
    pub is_relayed: String,
    #[serde(rename = "isrelay")]
    pub is_relay: String,
    #[serde(rename = "relayaddrs")]
    pub relay_addrs: Vec<String>,
    #[serde(rename = "dnson")]
    pub dns_on: String,
    #[serde(rename = "defaultacl")]
    pub default_acl: String,
    #[serde(rename = "ownerid")]
    pub owner_id: String,
    #[serde(rename = "failovernode")]
    pub failover_node: String,
    pub failover: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LegacyNetworkSettings {
    #[serde(rename = "addressrange")]
    pub address_range: String,
    #[serde(rename = "addressrange6")]
    pub address_range6: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LegacyTrafficKeys {
    pub mine: String,
    pub server: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LegacyInterface {
    pub name: String,
    #[serde(rename = "addressstring")]
    pub address_string: String,
}

/// Credentials for one legacy record in a migration batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegacyCredentials {
    pub id: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationRequest {
    #[serde(default)]
    pub host_name: String,
    pub legacy_nodes: Vec<LegacyCredentials>,
}
