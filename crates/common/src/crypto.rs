//! Credential hashing and verification
//!
//! New hashes are Argon2id PHC strings. Verification also accepts bcrypt
//! hashes, which is what legacy node records carry.

use crate::{Error, Result};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString},
    Argon2,
};

/// One-way password hashing with constant-time comparison
pub trait CredentialVerifier: Send + Sync {
    /// Hash a plaintext secret for storage
    fn hash(&self, plaintext: &str) -> Result<String>;

    /// `Ok(false)` on mismatch; `Err` only when the stored hash is unusable
    fn compare(&self, hash: &str, plaintext: &str) -> Result<bool>;
}

/// Argon2id hasher that also verifies bcrypt hashes
#[derive(Debug, Clone, Default)]
pub struct PasswordHasher;

impl PasswordHasher {
    pub fn new() -> Self {
        Self
    }
}

fn is_bcrypt(hash: &str) -> bool {
    ["$2a$", "$2b$", "$2x$", "$2y$"]
        .iter()
        .any(|prefix| hash.starts_with(prefix))
}

impl CredentialVerifier for PasswordHasher {
    fn hash(&self, plaintext: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(plaintext.as_bytes(), &salt)
            .map_err(|e| Error::Crypto(format!("Failed to hash password: {}", e)))?;
        Ok(hash.to_string())
    }

    fn compare(&self, hash: &str, plaintext: &str) -> Result<bool> {
        if is_bcrypt(hash) {
            return bcrypt::verify(plaintext, hash)
                .map_err(|e| Error::Crypto(format!("Invalid bcrypt hash: {}", e)));
        }

        let parsed =
            PasswordHash::new(hash).map_err(|e| Error::Crypto(format!("Invalid password hash: {}", e)))?;
        Ok(Argon2::default()
            .verify_password(plaintext.as_bytes(), &parsed)
            .is_ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_argon2_hash_and_compare() {
        let hasher = PasswordHasher::new();
        let hash = hasher.hash("correct horse").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(hasher.compare(&hash, "correct horse").unwrap());
        assert!(!hasher.compare(&hash, "battery staple").unwrap());
    }

    #[test]
    fn test_bcrypt_compare() {
        let hasher = PasswordHasher::new();
        let hash = bcrypt::hash("legacy-secret", 4).unwrap();
        assert!(hasher.compare(&hash, "legacy-secret").unwrap());
        assert!(!hasher.compare(&hash, "wrong").unwrap());
    }

    #[test]
    fn test_garbage_hash_is_error() {
        let hasher = PasswordHasher::new();
        assert!(hasher.compare("not-a-hash", "anything").is_err());
    }
}
