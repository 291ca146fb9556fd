//! User management
//!
//! Every mutating operation runs the caller through the policy engine
//! before anything is written.

use meshgate_common::store::{batch_entry, SUPER_ADMIN_KEY};
use meshgate_common::{
    Collection, CredentialVerifier, Error, Precondition, RecordStore, Result, User, UserView,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use super::username::{validate_password, validate_username};
use crate::auth::{PolicyEngine, UserChange};

/// Payload for creating a user
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewUser {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub is_super_admin: bool,
}

pub struct UserService {
    store: Arc<dyn RecordStore>,
    verifier: Arc<dyn CredentialVerifier>,
    policy: PolicyEngine,
    basic_auth: bool,
}

impl UserService {
    pub fn new(
        store: Arc<dyn RecordStore>,
        verifier: Arc<dyn CredentialVerifier>,
        basic_auth: bool,
    ) -> Self {
        Self {
            store,
            verifier,
            policy: PolicyEngine::new(),
            basic_auth,
        }
    }

    /// True when the singleton pointer names a user that still holds the role
    pub fn has_super_admin(&self) -> Result<bool> {
        let Some(username) = self.store.super_admin_pointer()? else {
            return Ok(false);
        };
        Ok(self
            .store
            .get_user(&username)?
            .map_or(false, |user| user.is_super_admin))
    }

    /// Bootstrap the first super-admin
    pub fn create_super_admin(&self, username: &str, password: &str) -> Result<UserView> {
        if !self.basic_auth {
            return Err(Error::bad_request("basic auth is disabled"));
        }
        // Read before the check so the commit can prove nothing moved since
        let pointer = self.store.get_raw(Collection::System, SUPER_ADMIN_KEY)?;
        if self.has_super_admin()? {
            return Err(Error::bad_request("superadmin user already exists"));
        }

        let mut user = self.new_user_record(username, password)?;
        user.is_super_admin = true;

        let committed = self.store.put_batch_if(
            &[
                Precondition::unchanged(Collection::System, SUPER_ADMIN_KEY, pointer),
                Precondition::absent(Collection::Users, user.username.clone()),
            ],
            &[
                batch_entry(Collection::Users, user.username.clone(), &user)?,
                batch_entry(Collection::System, SUPER_ADMIN_KEY, &user.username)?,
            ],
        )?;
        if !committed {
            warn!(user = %user.username, "Concurrent superadmin bootstrap, nothing written");
            if self.has_super_admin()? {
                return Err(Error::bad_request("superadmin user already exists"));
            }
            return Err(Error::AlreadyExists {
                kind: "user".to_string(),
                id: user.username,
            });
        }

        info!(user = %user.username, "Created superadmin");
        Ok(UserView::from(&user))
    }

    pub fn create_user(&self, caller: &User, request: &NewUser) -> Result<UserView> {
        self.policy
            .can_create(caller, request.is_admin, request.is_super_admin)
            .into_result()?;

        let mut user = self.new_user_record(&request.username, &request.password)?;
        user.is_admin = request.is_admin;
        self.store.put_user(&user)?;

        info!(user = %user.username, by = %caller.username, admin = user.is_admin, "Created user");
        Ok(UserView::from(&user))
    }

    pub fn get_user(&self, caller: &User, username: &str) -> Result<UserView> {
        self.policy.can_view(caller, username).into_result()?;
        Ok(UserView::from(&self.store.fetch_user(username)?))
    }

    /// All users, sorted by username
    pub fn list_users(&self, caller: &User) -> Result<Vec<UserView>> {
        self.policy.require_admin(caller).into_result()?;
        let mut users: Vec<UserView> = self.store.list_users()?.iter().map(UserView::from).collect();
        users.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(users)
    }

    pub fn update_user(&self, caller: &User, username: &str, change: &UserChange) -> Result<UserView> {
        let mut target = self.store.fetch_user(username)?;
        if let Err(e) = self.policy.can_modify(caller, &target, change).into_result() {
            warn!(user = %username, by = %caller.username, reason = %e, "User update denied");
            return Err(e);
        }

        if let Some(password) = change.password.as_deref().filter(|p| !p.is_empty()) {
            validate_password(password)?;
            target.password = self.verifier.hash(password)?;
        }
        if let Some(is_admin) = change.is_admin {
            target.is_admin = is_admin;
        }

        target.touch();
        self.store.put_user(&target)?;

        info!(user = %username, by = %caller.username, "Updated user");
        Ok(UserView::from(&target))
    }

    pub fn delete_user(&self, caller: &User, username: &str) -> Result<()> {
        let target = self.store.fetch_user(username)?;
        self.policy.can_delete(caller, &target).into_result()?;

        if !self.store.delete_user(username)? {
            return Err(Error::not_found("user", username));
        }

        info!(user = %username, by = %caller.username, "Deleted user");
        Ok(())
    }

    fn new_user_record(&self, username: &str, password: &str) -> Result<User> {
        validate_username(username)?;
        validate_password(password)?;

        if self.store.get_user(username)?.is_some() {
            return Err(Error::AlreadyExists {
                kind: "user".to_string(),
                id: username.to_string(),
            });
        }

        Ok(User::new(username, self.verifier.hash(password)?))
    }
}
