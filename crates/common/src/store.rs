//! Record store abstraction
//!
//! Records are JSON documents keyed by a stable identifier, one collection
//! per entity type. Implementations only provide the raw operations; the
//! typed accessors are built on top of them.

use crate::types::{ExtClient, Host, Node, User};
use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

/// Key of the singleton record naming the current super-admin
pub const SUPER_ADMIN_KEY: &str = "system.superAdminUsername";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Users,
    Hosts,
    Nodes,
    ExtClients,
    LegacyNodes,
    System,
}

impl Collection {
    pub const ALL: [Collection; 6] = [
        Collection::Users,
        Collection::Hosts,
        Collection::Nodes,
        Collection::ExtClients,
        Collection::LegacyNodes,
        Collection::System,
    ];

    pub fn table(&self) -> &'static str {
        match self {
            Self::Users => "users",
            Self::Hosts => "hosts",
            Self::Nodes => "nodes",
            Self::ExtClients => "ext_clients",
            Self::LegacyNodes => "legacy_nodes",
            Self::System => "system",
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Users => "user",
            Self::Hosts => "host",
            Self::Nodes => "node",
            Self::ExtClients => "extclient",
            Self::LegacyNodes => "legacy node",
            Self::System => "system record",
        }
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.table())
    }
}

/// State a record must still be in when a conditional batch commits
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Precondition {
    pub collection: Collection,
    pub id: String,
    /// Raw body the record must hold; `None` requires it to be absent
    pub body: Option<String>,
}

impl Precondition {
    /// The record must still hold `body` as read earlier
    pub fn unchanged(collection: Collection, id: impl Into<String>, body: Option<String>) -> Self {
        Self {
            collection,
            id: id.into(),
            body,
        }
    }

    pub fn absent(collection: Collection, id: impl Into<String>) -> Self {
        Self::unchanged(collection, id, None)
    }
}

/// Encode a record for `put_batch`
pub fn batch_entry<T: Serialize>(
    collection: Collection,
    id: impl Into<String>,
    record: &T,
) -> Result<(Collection, String, String)> {
    Ok((collection, id.into(), serde_json::to_string(record)?))
}

fn decode<T: DeserializeOwned>(body: Option<String>) -> Result<Option<T>> {
    match body {
        Some(body) => Ok(Some(serde_json::from_str(&body)?)),
        None => Ok(None),
    }
}

fn decode_all<T: DeserializeOwned>(rows: Vec<(String, String)>) -> Result<Vec<T>> {
    rows.into_iter()
        .map(|(_, body)| serde_json::from_str(&body).map_err(Error::from))
        .collect()
}

/// Key/value persistence for users, hosts, nodes and ext clients
pub trait RecordStore: Send + Sync {
    fn get_raw(&self, collection: Collection, id: &str) -> Result<Option<String>>;

    fn put_raw(&self, collection: Collection, id: &str, body: &str) -> Result<()>;

    /// Write every record or none of them
    fn put_batch(&self, records: &[(Collection, String, String)]) -> Result<()> {
        self.put_batch_if(&[], records).map(|_| ())
    }

    /// Check every precondition and write every record in one transaction.
    /// Returns false, with nothing written, when a precondition fails.
    fn put_batch_if(
        &self,
        expected: &[Precondition],
        records: &[(Collection, String, String)],
    ) -> Result<bool>;

    fn delete_raw(&self, collection: Collection, id: &str) -> Result<bool>;

    /// All records of a collection in insertion order
    fn list_raw(&self, collection: Collection) -> Result<Vec<(String, String)>>;

    // ------------------------------------------------------------------------
    // Users
    // ------------------------------------------------------------------------

    fn get_user(&self, username: &str) -> Result<Option<User>> {
        decode(self.get_raw(Collection::Users, username)?)
    }

    /// Like `get_user`, but absence is an error
    fn fetch_user(&self, username: &str) -> Result<User> {
        self.get_user(username)?
            .ok_or_else(|| Error::not_found(Collection::Users.kind(), username))
    }

    /// A user together with the raw body it was decoded from, for use in a
    /// `Precondition`
    fn fetch_user_versioned(&self, username: &str) -> Result<(User, String)> {
        let body = self
            .get_raw(Collection::Users, username)?
            .ok_or_else(|| Error::not_found(Collection::Users.kind(), username))?;
        Ok((serde_json::from_str(&body)?, body))
    }

    fn put_user(&self, user: &User) -> Result<()> {
        self.put_raw(Collection::Users, &user.username, &serde_json::to_string(user)?)
    }

    fn delete_user(&self, username: &str) -> Result<bool> {
        self.delete_raw(Collection::Users, username)
    }

    fn list_users(&self) -> Result<Vec<User>> {
        decode_all(self.list_raw(Collection::Users)?)
    }

    fn super_admin_pointer(&self) -> Result<Option<String>> {
        decode(self.get_raw(Collection::System, SUPER_ADMIN_KEY)?)
    }

    // ------------------------------------------------------------------------
    // Hosts and nodes
    // ------------------------------------------------------------------------

    fn get_host(&self, id: Uuid) -> Result<Option<Host>> {
        decode(self.get_raw(Collection::Hosts, &id.to_string())?)
    }

    fn put_host(&self, host: &Host) -> Result<()> {
        self.put_raw(Collection::Hosts, &host.id.to_string(), &serde_json::to_string(host)?)
    }

    fn list_hosts(&self) -> Result<Vec<Host>> {
        decode_all(self.list_raw(Collection::Hosts)?)
    }

    fn get_node(&self, id: Uuid) -> Result<Option<Node>> {
        decode(self.get_raw(Collection::Nodes, &id.to_string())?)
    }

    fn put_node(&self, node: &Node) -> Result<()> {
        self.put_raw(Collection::Nodes, &node.id.to_string(), &serde_json::to_string(node)?)
    }

    fn list_nodes(&self) -> Result<Vec<Node>> {
        decode_all(self.list_raw(Collection::Nodes)?)
    }

    // ------------------------------------------------------------------------
    // Ext clients
    // ------------------------------------------------------------------------

    fn put_ext_client(&self, client: &ExtClient) -> Result<()> {
        self.put_raw(
            Collection::ExtClients,
            &client.record_key(),
            &serde_json::to_string(client)?,
        )
    }

    fn delete_ext_client(&self, network: &str, client_id: &str) -> Result<bool> {
        self.delete_raw(
            Collection::ExtClients,
            &crate::types::ext_client_key(network, client_id),
        )
    }

    fn list_ext_clients(&self) -> Result<Vec<ExtClient>> {
        decode_all(self.list_raw(Collection::ExtClients)?)
    }

    // ------------------------------------------------------------------------
    // Legacy records
    // ------------------------------------------------------------------------

    /// Raw legacy document; decoding is left to the migration boundary
    fn get_legacy_record(&self, id: &str) -> Result<Option<String>> {
        self.get_raw(Collection::LegacyNodes, id)
    }

    fn put_legacy_record(&self, id: &str, body: &str) -> Result<()> {
        self.put_raw(Collection::LegacyNodes, id, body)
    }

    fn delete_legacy_record(&self, id: &str) -> Result<bool> {
        self.delete_raw(Collection::LegacyNodes, id)
    }
}
