//! Meshgate control plane services
//!
//! This module implements the identity and access side of the control plane:
//! - User management and the super-admin singleton
//! - Remote access gateway bindings with background ext client cleanup
//! - The per-user remote access gateway view
//! - Migration of legacy node records into hosts and nodes
//!
//! Server broker details come through the ServerInfoProvider trait.

pub mod cleanup;
pub mod gateways;
pub mod migrate;
pub mod remote_access;
pub mod routes;
pub mod server_info;
#[cfg(test)]
pub(crate) mod testing;
pub mod transfer;
pub mod username;
pub mod users;

pub use cleanup::{CleanupJob, CleanupQueue, CleanupWorker};
pub use gateways::GatewayBindings;
pub use migrate::{parse_legacy_bool, LegacyMigrator, MigrationDefaults};
pub use remote_access::{resolve_user_gateways, GatewaysByNetwork};
pub use routes::{api_router, AppState};
pub use server_info::{BrokerSettings, ServerInfoProvider, StoreServerInfo};
pub use transfer::{reconcile_super_admins, transfer_super_admin};
pub use username::validate_username;
pub use users::{NewUser, UserService};
