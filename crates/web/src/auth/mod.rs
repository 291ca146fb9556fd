//! Authentication and the role hierarchy.
//!
//! - Username/password login issuing HS256 session tokens
//! - Bearer token extraction for handlers
//! - The role and permission engine for user management

pub mod middleware;
pub mod provider;
pub mod rbac;
pub mod types;

pub use middleware::CurrentUser;
pub use provider::{AuthConfig, AuthManager};
pub use rbac::{Decision, PolicyEngine, UserChange};
pub use types::*;
