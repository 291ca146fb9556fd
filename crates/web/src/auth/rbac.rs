//! Role hierarchy and user modification rules.
//!
//! Three fixed roles: user < admin < super-admin. Every decision here is a
//! pure function of the caller, the target and the requested change; the
//! services persist nothing until a decision allows it.

use meshgate_common::{Error, Result, User};
use serde::{Deserialize, Serialize};

/// Requested changes to a user. `None` leaves the field untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserChange {
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub is_admin: Option<bool>,
    #[serde(default)]
    pub is_super_admin: Option<bool>,
}

impl UserChange {
    /// True when the change flips either role flag on `target`
    pub fn alters_roles(&self, target: &User) -> bool {
        self.is_admin.map_or(false, |v| v != target.is_admin)
            || self.is_super_admin.map_or(false, |v| v != target.is_super_admin)
    }

    /// True when the change touches fields owned by the credential origin
    pub fn touches_profile(&self) -> bool {
        self.password.as_deref().map_or(false, |p| !p.is_empty())
    }
}

/// Outcome of a permission check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(String),
}

impl Decision {
    fn deny(reason: &str) -> Self {
        Decision::Deny(reason.to_string())
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }

    /// Surface a denial as a forbidden error
    pub fn into_result(self) -> Result<()> {
        match self {
            Decision::Allow => Ok(()),
            Decision::Deny(reason) => Err(Error::forbidden(reason)),
        }
    }
}

/// Evaluates the role rules for user management
#[derive(Debug, Clone, Copy, Default)]
pub struct PolicyEngine;

impl PolicyEngine {
    pub fn new() -> Self {
        Self
    }

    /// May `caller` apply `change` to `target`? Rules are checked in order.
    pub fn can_modify(&self, caller: &User, target: &User, change: &UserChange) -> Decision {
        let self_update = caller.username == target.username;

        if !caller.is_super_admin {
            if target.is_super_admin {
                return Decision::deny("cannot update superadmin user");
            }
            if !self_update && !caller.is_admin {
                return Decision::deny("not authorized");
            }
        }

        if self_update && change.alters_roles(target) {
            return Decision::deny("user not allowed to self assign role");
        }

        if !caller.is_super_admin
            && !self_update
            && caller.is_admin
            && (target.is_admin || change.is_admin == Some(true))
        {
            return Decision::deny("admin user cannot update another admin");
        }

        if change.is_super_admin == Some(true) && !target.is_super_admin {
            return Decision::deny("superadmin role can only be transferred");
        }

        // Externally authenticated users keep credentials at their identity
        // provider, so only the password is locked here. Role flags stay
        // manageable by admins, unlike a blanket lock on every update.
        if target.is_external() && change.touches_profile() {
            return Decision::Deny(format!(
                "cannot update user info for externally authenticated user {}",
                target.username
            ));
        }

        Decision::Allow
    }

    /// May `caller` create a user with the requested role flags?
    pub fn can_create(&self, caller: &User, is_admin: bool, is_super_admin: bool) -> Decision {
        if !caller.is_elevated() {
            return Decision::deny("only admins can create users");
        }
        if is_super_admin {
            return Decision::deny("additional superadmins cannot be created");
        }
        if is_admin && !caller.is_super_admin {
            return Decision::deny("only superadmin can create admin users");
        }
        Decision::Allow
    }

    /// May `caller` delete `target`? The super-admin is never deletable.
    pub fn can_delete(&self, caller: &User, target: &User) -> Decision {
        if target.is_super_admin {
            return Decision::deny("superadmin cannot be deleted");
        }
        if !caller.is_elevated() {
            return Decision::deny("not authorized");
        }
        if !caller.is_super_admin && caller.is_admin && target.is_admin {
            return Decision::deny("admin cannot delete another admin user");
        }
        Decision::Allow
    }

    /// Self or any admin may read a user
    pub fn can_view(&self, caller: &User, username: &str) -> Decision {
        if caller.username == username || caller.is_elevated() {
            Decision::Allow
        } else {
            Decision::deny("not authorized")
        }
    }

    /// Only the named user may act; admins get no override
    pub fn require_self(&self, caller: &User, username: &str) -> Decision {
        if caller.username == username {
            Decision::Allow
        } else {
            Decision::deny("not authorized")
        }
    }

    pub fn require_admin(&self, caller: &User) -> Decision {
        if caller.is_elevated() {
            Decision::Allow
        } else {
            Decision::deny("admin privileges required")
        }
    }
}
