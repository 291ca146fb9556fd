//! Remote access gateway bindings on users

use meshgate_common::{Error, RecordStore, Result, UserView};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use super::cleanup::{CleanupJob, CleanupQueue};

pub struct GatewayBindings {
    store: Arc<dyn RecordStore>,
    cleanup: CleanupQueue,
}

impl GatewayBindings {
    pub fn new(store: Arc<dyn RecordStore>, cleanup: CleanupQueue) -> Self {
        Self { store, cleanup }
    }

    /// Authorize `username` to use the ingress gateway `gateway_id`. Idempotent.
    pub fn attach(&self, username: &str, gateway_id: Uuid) -> Result<UserView> {
        let mut user = self.store.fetch_user(username)?;
        if user.is_elevated() {
            return Err(Error::bad_request("superadmins/admins have access to all gateways"));
        }

        let node = self.store.get_node(gateway_id)?.ok_or_else(|| {
            Error::bad_request(format!("failed to fetch remote access gateway node {}", gateway_id))
        })?;
        if !node.is_ingress_gateway {
            return Err(Error::bad_request(format!(
                "node {} is not a remote access gateway",
                gateway_id
            )));
        }

        if user.remote_gw_ids.insert(gateway_id) {
            user.touch();
        }
        self.store.put_user(&user)?;

        info!(user = %username, gateway = %gateway_id, network = %node.network, "Attached remote access gateway");
        Ok(UserView::from(&user))
    }

    /// Revoke a binding and queue removal of the user's clients on that gateway.
    /// Detaching an unbound gateway changes nothing.
    pub fn detach(&self, username: &str, gateway_id: Uuid) -> Result<UserView> {
        let mut user = self.store.fetch_user(username)?;
        if !user.remote_gw_ids.remove(&gateway_id) {
            debug!(user = %username, gateway = %gateway_id, "Gateway not bound, nothing to detach");
            return Ok(UserView::from(&user));
        }

        user.touch();
        self.store.put_user(&user)?;

        self.cleanup.submit(CleanupJob {
            owner: user.username.clone(),
            gateway_id,
        });

        info!(user = %username, gateway = %gateway_id, "Detached remote access gateway");
        Ok(UserView::from(&user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meshnet::cleanup::CleanupWorker;
    use meshgate_common::{Database, ErrorKind, ExtClient, Node, User};

    fn setup() -> (Arc<Database>, GatewayBindings, CleanupWorker, Uuid) {
        let db = Arc::new(Database::open_memory().unwrap());
        db.put_user(&User::new("alice", "hash")).unwrap();
        let mut admin = User::new("bob", "hash");
        admin.is_admin = true;
        db.put_user(&admin).unwrap();

        let mut gateway = Node::new(Uuid::new_v4(), Uuid::new_v4(), "office");
        gateway.is_ingress_gateway = true;
        db.put_node(&gateway).unwrap();

        let (queue, worker) = CleanupWorker::new(db.clone(), 8);
        let bindings = GatewayBindings::new(db.clone(), queue);
        (db, bindings, worker, gateway.id)
    }

    fn ext_client(owner: &str, gateway: Uuid) -> ExtClient {
        ExtClient {
            client_id: format!("{}-laptop", owner),
            network: "office".into(),
            owner_id: owner.into(),
            ingress_gateway_id: gateway,
            remote_access_client_id: "rac".into(),
            public_key: String::new(),
            address: None,
            enabled: true,
            last_modified: 0,
        }
    }

    #[test]
    fn test_attach_is_idempotent() {
        let (db, bindings, _worker, gw) = setup();
        bindings.attach("alice", gw).unwrap();
        bindings.attach("alice", gw).unwrap();
        assert_eq!(db.fetch_user("alice").unwrap().remote_gw_ids.len(), 1);
    }

    #[test]
    fn test_attach_rejections() {
        let (db, bindings, _worker, gw) = setup();

        assert_eq!(bindings.attach("bob", gw).unwrap_err().kind(), ErrorKind::BadRequest);
        assert_eq!(bindings.attach("ghost", gw).unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(
            bindings.attach("alice", Uuid::new_v4()).unwrap_err().kind(),
            ErrorKind::BadRequest
        );

        let plain = Node::new(Uuid::new_v4(), Uuid::new_v4(), "office");
        db.put_node(&plain).unwrap();
        assert_eq!(bindings.attach("alice", plain.id).unwrap_err().kind(), ErrorKind::BadRequest);

        assert!(db.fetch_user("alice").unwrap().remote_gw_ids.is_empty());
    }

    #[tokio::test]
    async fn test_detach_unbound_is_noop() {
        let (db, bindings, worker, gw) = setup();
        db.put_ext_client(&ext_client("alice", gw)).unwrap();
        let handle = worker.spawn();

        let view = bindings.detach("alice", gw).unwrap();
        assert!(view.remote_gw_ids.is_empty());

        drop(bindings);
        handle.await.unwrap();
        assert_eq!(db.list_ext_clients().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_detach_removes_bound_clients() {
        let (db, bindings, worker, gw) = setup();
        bindings.attach("alice", gw).unwrap();
        db.put_ext_client(&ext_client("alice", gw)).unwrap();
        db.put_ext_client(&ext_client("carol", gw)).unwrap();
        let handle = worker.spawn();

        bindings.detach("alice", gw).unwrap();
        assert!(db.fetch_user("alice").unwrap().remote_gw_ids.is_empty());

        drop(bindings);
        handle.await.unwrap();
        let owners: Vec<_> = db
            .list_ext_clients()
            .unwrap()
            .into_iter()
            .map(|c| c.owner_id)
            .collect();
        assert_eq!(owners, vec!["carol"]);
    }
}
