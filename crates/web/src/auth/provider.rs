//! Password login and bearer token validation.
//!
//! Tokens are HS256 JWTs. A valid token only names the caller; every request
//! re-loads the user record so role changes and deletions apply immediately.

use base64::{engine::general_purpose::STANDARD, Engine};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use meshgate_common::{CredentialVerifier, Error, RecordStore, Result, User};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::types::{Claims, TokenResponse};

/// Authentication settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Allow username/password login and super-admin bootstrap
    #[serde(default = "default_true")]
    pub basic_auth: bool,

    /// Token signing secret; a random per-process secret is used when unset
    #[serde(default)]
    pub jwt_secret: Option<String>,

    /// Token TTL in seconds
    #[serde(default = "default_token_ttl")]
    pub token_ttl_secs: i64,
}

fn default_true() -> bool { true }
fn default_token_ttl() -> i64 { 24 * 60 * 60 } // 24 hours

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            basic_auth: true,
            jwt_secret: None,
            token_ttl_secs: default_token_ttl(),
        }
    }
}

/// Issues and validates session tokens
pub struct AuthManager {
    pub config: AuthConfig,
    store: Arc<dyn RecordStore>,
    verifier: Arc<dyn CredentialVerifier>,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    /// Compared against on unknown usernames so both paths cost one hash check
    decoy_hash: String,
}

impl AuthManager {
    pub fn new(
        config: AuthConfig,
        store: Arc<dyn RecordStore>,
        verifier: Arc<dyn CredentialVerifier>,
    ) -> Self {
        let secret = match config.jwt_secret.as_deref() {
            Some(secret) if !secret.is_empty() => secret.as_bytes().to_vec(),
            _ => {
                debug!("No jwt_secret configured, generating a per-process secret");
                let mut bytes = vec![0u8; 32];
                rand::thread_rng().fill_bytes(&mut bytes);
                bytes
            }
        };

        let mut decoy = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut decoy);
        let decoy_hash = verifier
            .hash(&STANDARD.encode(decoy))
            .unwrap_or_else(|e| {
                warn!(error = %e, "Failed to prepare decoy password hash");
                String::new()
            });

        Self {
            encoding_key: EncodingKey::from_secret(&secret),
            decoding_key: DecodingKey::from_secret(&secret),
            decoy_hash,
            config,
            store,
            verifier,
        }
    }

    /// Verify a username/password pair and issue a token
    pub fn authenticate(&self, username: &str, password: &str) -> Result<TokenResponse> {
        if !self.config.basic_auth {
            return Err(Error::bad_request("basic auth is disabled"));
        }
        if username.is_empty() || password.is_empty() {
            return Err(Error::bad_request("username and password are required"));
        }

        let mut user = match self.store.get_user(username)? {
            Some(user) => user,
            None => {
                debug!(user = %username, "Login for unknown user");
                let _ = self.verifier.compare(&self.decoy_hash, password);
                return Err(Error::unauthorized("incorrect credentials"));
            }
        };

        let matched = self.verifier.compare(&user.password, password).unwrap_or_else(|e| {
            warn!(user = %username, error = %e, "Stored password hash is unusable");
            false
        });
        if !matched {
            return Err(Error::unauthorized("incorrect credentials"));
        }

        let now = chrono::Utc::now().timestamp();
        user.last_login = Some(now);
        self.store.put_user(&user)?;

        let auth_token = self.issue_token(&user, now)?;
        info!(user = %username, "User authenticated");

        Ok(TokenResponse {
            username: user.username,
            auth_token,
            expires_at: now + self.config.token_ttl_secs,
        })
    }

    pub fn issue_token(&self, user: &User, issued_at: i64) -> Result<String> {
        let claims = Claims::for_user(user, issued_at, self.config.token_ttl_secs);
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| Error::Crypto(format!("Failed to sign token: {}", e)))
    }

    /// Check signature and expiry
    pub fn validate_token(&self, token: &str) -> Result<Claims> {
        decode::<Claims>(token, &self.decoding_key, &Validation::new(Algorithm::HS256))
            .map(|data| data.claims)
            .map_err(|e| {
                debug!(error = %e, "Rejected token");
                Error::unauthorized("invalid or expired token")
            })
    }

    /// Resolve a token to the current user record
    pub fn caller(&self, token: &str) -> Result<User> {
        let claims = self.validate_token(token)?;
        self.store.fetch_user(&claims.sub)
    }
}
