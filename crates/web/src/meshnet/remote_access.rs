//! Per-user view of remote access gateways.
//!
//! Gateways the user is authorized for are reported either as connected
//! (an ext client of the user with the requested remote access client id is
//! bound to it) or idle. Each gateway appears at most once. Entries are
//! grouped by network and keep discovery order: connected gateways in ext
//! client scan order first, then the remaining idle ones.

use meshgate_common::{Error, Host, Node, RecordStore, Result, UserRemoteGateway};
use std::collections::BTreeMap;
use tracing::debug;
use uuid::Uuid;

pub type GatewaysByNetwork = BTreeMap<String, Vec<UserRemoteGateway>>;

/// Resolve a gateway id to its node and host, or `None` when either is
/// missing or the node is being deleted
fn resolve_gateway(store: &dyn RecordStore, gateway_id: Uuid) -> Option<(Node, Host)> {
    let node = match store.get_node(gateway_id) {
        Ok(Some(node)) if !node.pending_delete => node,
        Ok(_) => return None,
        Err(e) => {
            debug!(gateway = %gateway_id, error = %e, "Skipping unreadable gateway node");
            return None;
        }
    };
    match store.get_host(node.host_id) {
        Ok(Some(host)) => Some((node, host)),
        Ok(None) => None,
        Err(e) => {
            debug!(gateway = %gateway_id, host = %node.host_id, error = %e, "Skipping unreadable gateway host");
            None
        }
    }
}

pub fn resolve_user_gateways(
    store: &dyn RecordStore,
    username: &str,
    remote_access_client_id: &str,
) -> Result<GatewaysByNetwork> {
    if username.is_empty() || remote_access_client_id.is_empty() {
        return Err(Error::bad_request("username and remote access client id are required"));
    }

    let user = store.fetch_user(username)?;
    if user.is_elevated() {
        return Err(Error::bad_request("admins can visit dashboard to create remote clients"));
    }

    let clients = store
        .list_ext_clients()
        .map_err(|e| Error::internal(format!("failed to fetch extclients: {}", e)))?;

    let mut pending = user.remote_gw_ids.clone();
    let mut result = GatewaysByNetwork::new();

    for client in clients {
        if client.remote_access_client_id != remote_access_client_id || client.owner_id != username {
            continue;
        }
        let Some((node, host)) = resolve_gateway(store, client.ingress_gateway_id) else {
            continue;
        };
        if !pending.remove(&node.id) {
            continue;
        }
        result
            .entry(node.network.clone())
            .or_default()
            .push(UserRemoteGateway {
                gw_id: node.id,
                gw_name: host.name,
                network: node.network,
                gw_client: Some(client),
                connected: true,
            });
    }

    for gateway_id in pending {
        let Some((node, host)) = resolve_gateway(store, gateway_id) else {
            continue;
        };
        result
            .entry(node.network.clone())
            .or_default()
            .push(UserRemoteGateway {
                gw_id: node.id,
                gw_name: host.name,
                network: node.network,
                gw_client: None,
                connected: false,
            });
    }

    Ok(result)
}
