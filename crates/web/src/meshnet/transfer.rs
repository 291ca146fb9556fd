//! Superadmin role transfer and singleton repair.
//!
//! The target promotion, the caller demotion and the singleton pointer are
//! written in one conditional store transaction. The transaction only commits
//! when the caller, the target and the pointer still hold what the checks
//! were made against, so overlapping transfers cannot both succeed.
//! `reconcile_super_admins` runs at startup and repairs stores that ended up
//! with more than one super-admin.

use meshgate_common::store::{batch_entry, SUPER_ADMIN_KEY};
use meshgate_common::{Collection, Error, Precondition, RecordStore, Result, User, UserView};
use tracing::{error, info, warn};

/// Hand the super-admin role from `caller` to the admin `target_username`
pub fn transfer_super_admin(
    store: &dyn RecordStore,
    caller: &User,
    target_username: &str,
) -> Result<UserView> {
    if !caller.is_super_admin {
        return Err(Error::forbidden(
            "only superadmin can assign the superadmin role to another user",
        ));
    }

    // The request-time copy of the caller may be stale; decide on stored state
    let pointer = store.get_raw(Collection::System, SUPER_ADMIN_KEY)?;
    let (mut previous, previous_body) = store.fetch_user_versioned(&caller.username)?;
    if !previous.is_super_admin {
        return Err(Error::forbidden(
            "only superadmin can assign the superadmin role to another user",
        ));
    }

    let (mut target, target_body) = store.fetch_user_versioned(target_username)?;
    if target.is_super_admin {
        return Err(Error::bad_request(format!(
            "user {} is already the superadmin",
            target.username
        )));
    }
    if !target.is_admin {
        return Err(Error::forbidden("only admins can be promoted to superadmin role"));
    }

    target.is_super_admin = true;
    target.is_admin = false;
    target.touch();

    previous.is_super_admin = false;
    previous.is_admin = true;
    previous.touch();

    let expected = [
        Precondition::unchanged(Collection::Users, previous.username.clone(), Some(previous_body)),
        Precondition::unchanged(Collection::Users, target.username.clone(), Some(target_body)),
        Precondition::unchanged(Collection::System, SUPER_ADMIN_KEY, pointer),
    ];
    let records = [
        batch_entry(Collection::Users, target.username.clone(), &target)?,
        batch_entry(Collection::Users, previous.username.clone(), &previous)?,
        batch_entry(Collection::System, SUPER_ADMIN_KEY, &target.username)?,
    ];
    match store.put_batch_if(&expected, &records) {
        Ok(true) => {}
        Ok(false) => {
            warn!(from = %previous.username, to = %target.username, "Superadmin transfer lost a race, no records changed");
            return Err(Error::forbidden("superadmin role changed during transfer"));
        }
        Err(e) => {
            error!(from = %previous.username, to = %target.username, error = %e, "Superadmin transfer failed, no records changed");
            return Err(Error::internal(format!("failed to transfer superadmin role: {}", e)));
        }
    }

    info!(from = %previous.username, to = %target.username, "Transferred superadmin role");
    Ok(UserView::from(&target))
}

/// Enforce a single super-admin and a consistent pointer.
///
/// Keeps the user named by the pointer when it still holds the role, else
/// the most recently updated super-admin. Returns the kept username.
pub fn reconcile_super_admins(store: &dyn RecordStore) -> Result<Option<String>> {
    let supers: Vec<User> = store
        .list_users()?
        .into_iter()
        .filter(|u| u.is_super_admin)
        .collect();
    let pointer = store.super_admin_pointer()?;

    if supers.is_empty() {
        if let Some(stale) = pointer {
            warn!(user = %stale, "Superadmin pointer names a user without the role, clearing it");
            store.delete_raw(Collection::System, SUPER_ADMIN_KEY)?;
        }
        return Ok(None);
    }

    let keeper = pointer
        .as_deref()
        .and_then(|name| supers.iter().find(|u| u.username == name))
        .or_else(|| supers.iter().max_by_key(|u| u.updated_at))
        .map(|u| u.username.clone())
        .ok_or_else(|| Error::internal("no superadmin candidate"))?;

    let mut records = Vec::new();
    for mut user in supers.into_iter().filter(|u| u.username != keeper) {
        warn!(user = %user.username, keeper = %keeper, "Demoting extra superadmin to admin");
        user.is_super_admin = false;
        user.is_admin = true;
        user.touch();
        records.push(batch_entry(Collection::Users, user.username.clone(), &user)?);
    }
    if pointer.as_deref() != Some(keeper.as_str()) {
        info!(user = %keeper, "Repairing superadmin pointer");
        records.push(batch_entry(Collection::System, SUPER_ADMIN_KEY, &keeper)?);
    }

    if !records.is_empty() {
        store.put_batch(&records)?;
    }

    Ok(Some(keeper))
}
