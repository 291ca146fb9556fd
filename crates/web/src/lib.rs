//! Meshgate Web API
//!
//! Identity, access control and legacy migration services of the meshgate
//! control plane, exposed over an axum router.

pub mod auth;
pub mod blocking;
pub mod error;
pub mod meshnet;

pub use auth::{AuthConfig, AuthManager, Decision, PolicyEngine, UserChange};
pub use error::{ApiError, ApiResult};
pub use meshnet::{
    api_router, reconcile_super_admins, AppState, BrokerSettings, CleanupQueue, CleanupWorker,
    MigrationDefaults, StoreServerInfo,
};
