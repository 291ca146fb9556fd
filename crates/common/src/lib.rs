//! Meshgate Common Library
//!
//! Entity model, record store and credential primitives shared by the
//! meshgate control plane.

pub mod crypto;
pub mod db;
pub mod error;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use crypto::{CredentialVerifier, PasswordHasher};
pub use db::Database;
pub use error::{Error, ErrorKind, Result};
pub use store::{Collection, Precondition, RecordStore};
pub use types::*;

/// Meshgate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default store path
pub fn default_store_path() -> std::path::PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join(".meshgate")
}

/// Home directory helper
mod dirs {
    pub fn home_dir() -> Option<std::path::PathBuf> {
        std::env::var_os("HOME").map(std::path::PathBuf::from)
    }
}
