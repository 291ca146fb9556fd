//! Legacy node migration
//!
//! Converts a batch of pre-split node records into one Host and one Node per
//! record. The batch is verified up front: a missing, undecodable or wrongly
//! authenticated record aborts before anything is written. After the Host is
//! stored, each Node is written on its own; a Node that fails to persist is
//! logged and left out of the result.
//!
//! Legacy ids are claimed for the whole run. A request naming an id that
//! another migration holds is rejected, and once that migration finishes the
//! consumed record is gone, so every legacy node yields at most one Host.

use base64::{engine::general_purpose::STANDARD, Engine};
use ipnetwork::IpNetwork;
use meshgate_common::{
    CredentialVerifier, Error, Host, HostInterface, HostPull, LegacyNode, MigrationRequest, Node,
    RecordStore, Result,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::server_info::ServerInfoProvider;

/// Host settings not carried by legacy records
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationDefaults {
    #[serde(default = "default_auto_update")]
    pub auto_update: bool,
    #[serde(default = "default_interface_name")]
    pub interface_name: String,
}

fn default_auto_update() -> bool { true }
fn default_interface_name() -> String { "meshgate".to_string() }

impl Default for MigrationDefaults {
    fn default() -> Self {
        Self {
            auto_update: default_auto_update(),
            interface_name: default_interface_name(),
        }
    }
}

/// Legacy booleans are strings; `yes`, `true`, `on` and `1` mean true
pub fn parse_legacy_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "yes" | "true" | "on" | "1"
    )
}

/// Canonical lowercase `aa:bb:cc:dd:ee:ff`; accepts `:` or `-` separators
pub fn parse_mac(value: &str) -> Option<String> {
    let octets: Vec<&str> = value.trim().split(|c: char| c == ':' || c == '-').collect();
    if octets.len() != 6 {
        return None;
    }
    let mut canonical = Vec::with_capacity(6);
    for octet in octets {
        if octet.len() != 2 {
            return None;
        }
        let byte = u8::from_str_radix(octet, 16).ok()?;
        canonical.push(format!("{:02x}", byte));
    }
    Some(canonical.join(":"))
}

/// Combine a bare address with the prefix length of its network range
pub fn parse_cidr_address(range: &str, address: &str) -> Option<IpNetwork> {
    if range.is_empty() || address.is_empty() {
        return None;
    }
    let range: IpNetwork = range.parse().ok()?;
    let ip: IpAddr = address
        .parse()
        .or_else(|_| address.parse::<IpNetwork>().map(|net| net.ip()))
        .ok()?;
    IpNetwork::new(ip, range.prefix()).ok()
}

fn is_wireguard_key(value: &str) -> bool {
    STANDARD.decode(value).map_or(false, |bytes| bytes.len() == 32)
}

fn parse_ip(value: &str) -> Option<IpAddr> {
    value
        .parse()
        .ok()
        .or_else(|| value.parse::<IpNetwork>().ok().map(|net| net.ip()))
}

pub struct LegacyMigrator {
    store: Arc<dyn RecordStore>,
    verifier: Arc<dyn CredentialVerifier>,
    server_info: Arc<dyn ServerInfoProvider>,
    defaults: MigrationDefaults,
    in_flight: Mutex<HashSet<String>>,
}

/// Legacy ids held by one migration; released on drop
struct Claim<'a> {
    ids: Vec<String>,
    in_flight: &'a Mutex<HashSet<String>>,
}

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        let mut in_flight = self.in_flight.lock();
        for id in &self.ids {
            in_flight.remove(id);
        }
    }
}

struct VerifiedRecord {
    key: String,
    id: Uuid,
    legacy: LegacyNode,
}

impl LegacyMigrator {
    pub fn new(
        store: Arc<dyn RecordStore>,
        verifier: Arc<dyn CredentialVerifier>,
        server_info: Arc<dyn ServerInfoProvider>,
        defaults: MigrationDefaults,
    ) -> Self {
        Self {
            store,
            verifier,
            server_info,
            defaults,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub fn migrate(&self, request: &MigrationRequest) -> Result<HostPull> {
        if request.legacy_nodes.is_empty() {
            return Err(Error::bad_request("no legacy nodes to migrate"));
        }

        let _claim = self.claim(request)?;
        let verified = self.verify_batch(request)?;
        let first = &verified[0];

        // Fetched before anything is written so a failure leaves no orphan host
        let traffic_key = self
            .server_info
            .traffic_public_key()
            .map_err(|e| Error::internal(format!("failed to retrieve server traffic key: {}", e)))?;

        let mut host = self.build_host(&first.legacy, &request.host_name);
        self.store
            .put_host(&host)
            .map_err(|e| Error::internal(format!("failed to create host: {}", e)))?;
        info!(host = %host.id, name = %host.name, "Created host from legacy record");

        let mut server_config = self.server_info.server_config();
        server_config.traffic_key = traffic_key;
        if server_config.is_emqx() {
            server_config.mq_username = host.id.to_string();
        }

        let mut nodes = Vec::with_capacity(verified.len());
        for record in &verified {
            let node = build_node(record.id, host.id, &record.legacy);
            if let Err(e) = self.store.put_node(&node) {
                error!(node_id = %node.id, network = %node.network, error = %e, "Failed to store migrated node, skipping");
                continue;
            }
            if let Err(e) = self.store.delete_legacy_record(&record.key) {
                warn!(node_id = %node.id, error = %e, "Failed to remove consumed legacy record");
            }
            nodes.push(node);
        }

        host.nodes = nodes.iter().map(|n| n.id).collect();
        if let Err(e) = self.store.put_host(&host) {
            error!(host = %host.id, error = %e, "Failed to record migrated nodes on host");
        }

        info!(host = %host.id, migrated = nodes.len(), requested = verified.len(), "Legacy migration complete");
        Ok(HostPull {
            host,
            nodes,
            server_config,
        })
    }

    /// Take every legacy id of the request, or none when one is taken
    fn claim(&self, request: &MigrationRequest) -> Result<Claim<'_>> {
        let mut in_flight = self.in_flight.lock();
        if let Some(busy) = request
            .legacy_nodes
            .iter()
            .find(|creds| in_flight.contains(&creds.id))
        {
            warn!(node_id = %busy.id, "Legacy node is already being migrated");
            return Err(Error::bad_request(format!(
                "legacy node {} is already being migrated",
                busy.id
            )));
        }

        let ids: Vec<String> = request.legacy_nodes.iter().map(|c| c.id.clone()).collect();
        in_flight.extend(ids.iter().cloned());
        Ok(Claim {
            ids,
            in_flight: &self.in_flight,
        })
    }

    /// Fetch, decode and authenticate every entry. Writes nothing.
    fn verify_batch(&self, request: &MigrationRequest) -> Result<Vec<VerifiedRecord>> {
        let mut seen = HashSet::new();
        let mut verified = Vec::with_capacity(request.legacy_nodes.len());

        for creds in &request.legacy_nodes {
            let raw = self
                .store
                .get_legacy_record(&creds.id)?
                .ok_or_else(|| Error::not_found("legacy node", &creds.id))?;

            let legacy: LegacyNode = serde_json::from_str(&raw).map_err(|e| {
                Error::bad_request(format!("failed to decode legacy node {}: {}", creds.id, e))
            })?;
            let id = Uuid::parse_str(&creds.id).map_err(|_| {
                Error::bad_request(format!("legacy node id {} is not a valid uuid", creds.id))
            })?;
            if !seen.insert(id) {
                return Err(Error::bad_request(format!("legacy node {} listed twice", creds.id)));
            }

            let matched = self
                .verifier
                .compare(&legacy.password, &creds.password)
                .unwrap_or_else(|e| {
                    warn!(node_id = %creds.id, error = %e, "Legacy password hash is unusable");
                    false
                });
            if !matched {
                return Err(Error::unauthorized(format!(
                    "incorrect password for legacy node {}",
                    creds.id
                )));
            }

            verified.push(VerifiedRecord {
                key: creds.id.clone(),
                id,
                legacy,
            });
        }

        Ok(verified)
    }

    fn build_host(&self, legacy: &LegacyNode, host_name: &str) -> Host {
        let name = if host_name.trim().is_empty() {
            legacy.name.clone()
        } else {
            host_name.trim().to_string()
        };
        let mut host = Host::new(name, self.defaults.interface_name.clone());

        host.listen_port = u16::try_from(legacy.listen_port).unwrap_or_else(|_| {
            warn!(node_id = %legacy.id, port = legacy.listen_port, "Invalid legacy listen port");
            0
        });
        host.mtu = u32::try_from(legacy.mtu).unwrap_or_else(|_| {
            warn!(node_id = %legacy.id, mtu = legacy.mtu, "Invalid legacy mtu");
            0
        });

        if is_wireguard_key(&legacy.public_key) {
            host.public_key = legacy.public_key.clone();
        } else if !legacy.public_key.is_empty() {
            warn!(node_id = %legacy.id, "Invalid legacy public key");
        }

        if !legacy.mac_address.is_empty() {
            match parse_mac(&legacy.mac_address) {
                Some(mac) => host.mac_address = mac,
                None => warn!(node_id = %legacy.id, mac = %legacy.mac_address, "Invalid legacy mac address"),
            }
        }

        host.traffic_key_public = legacy.traffic_keys.mine.clone();

        if !legacy.internet_gateway.is_empty() {
            match legacy.internet_gateway.parse::<SocketAddr>() {
                Ok(addr) => host.internet_gateway = Some(addr),
                Err(_) => warn!(node_id = %legacy.id, gateway = %legacy.internet_gateway, "Invalid legacy internet gateway"),
            }
        }
        if !legacy.endpoint.is_empty() {
            match parse_ip(&legacy.endpoint) {
                Some(ip) => host.endpoint_ip = Some(ip),
                None => warn!(node_id = %legacy.id, endpoint = %legacy.endpoint, "Invalid legacy endpoint"),
            }
        }

        host.interfaces = legacy
            .interfaces
            .iter()
            .map(|iface| HostInterface {
                name: iface.name.clone(),
                address: iface.address_string.clone(),
            })
            .collect();

        host.ip_forwarding = parse_legacy_bool(&legacy.ip_forwarding);
        host.auto_update = self.defaults.auto_update;
        host.is_docker = parse_legacy_bool(&legacy.is_docker);
        host.is_k8s = parse_legacy_bool(&legacy.is_k8s);
        host.is_static = parse_legacy_bool(&legacy.is_static);
        host
    }
}

fn build_node(id: Uuid, host_id: Uuid, legacy: &LegacyNode) -> Node {
    let mut node = Node::new(id, host_id, legacy.network.clone());

    node.address = address_field(legacy, &legacy.network_settings.address_range, &legacy.address);
    node.address6 = address_field(legacy, &legacy.network_settings.address_range6, &legacy.address6);
    if !legacy.local_address.is_empty() {
        node.local_address = parse_ip(&legacy.local_address);
    }

    node.server = legacy.server.clone();
    node.connected = parse_legacy_bool(&legacy.connected);
    node.is_egress_gateway = parse_legacy_bool(&legacy.is_egress_gateway);
    node.egress_gateway_ranges = legacy.egress_gateway_ranges.clone();
    node.egress_gateway_nat_enabled = parse_legacy_bool(&legacy.egress_gateway_nat_enabled);
    node.is_ingress_gateway = parse_legacy_bool(&legacy.is_ingress_gateway);
    node.ingress_gateway_range = legacy.ingress_gateway_range.clone();
    node.ingress_gateway_range6 = legacy.ingress_gateway_range6.clone();
    node.is_relay = parse_legacy_bool(&legacy.is_relay);
    node.is_relayed = parse_legacy_bool(&legacy.is_relayed);
    node.relayed_nodes = legacy.relay_addrs.clone();
    node.dns_on = parse_legacy_bool(&legacy.dns_on);
    node.persistent_keepalive = u32::try_from(legacy.persistent_keepalive).unwrap_or(0);
    node.default_acl = legacy.default_acl.clone();
    node.owner_id = legacy.owner_id.clone();
    node.failover = parse_legacy_bool(&legacy.failover);
    node.failover_node = Uuid::parse_str(&legacy.failover_node).ok();
    node.expiration = (legacy.expiration_date_time > 0).then_some(legacy.expiration_date_time);
    node
}

fn address_field(legacy: &LegacyNode, range: &str, address: &str) -> Option<IpNetwork> {
    let parsed = parse_cidr_address(range, address);
    if parsed.is_none() && !address.is_empty() {
        warn!(node_id = %legacy.id, address = %address, range = %range, "Unparseable legacy address");
    }
    parsed
}
