//! Token and login payloads.

use meshgate_common::User;
use serde::{Deserialize, Serialize};

/// JWT claims issued on login
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Username
    pub sub: String,
    pub is_admin: bool,
    pub is_super_admin: bool,
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    pub fn for_user(user: &User, issued_at: i64, ttl_secs: i64) -> Self {
        Self {
            sub: user.username.clone(),
            is_admin: user.is_admin,
            is_super_admin: user.is_super_admin,
            iat: issued_at,
            exp: issued_at + ttl_secs,
        }
    }
}

/// Username/password login
#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub username: String,
    pub auth_token: String,
    pub expires_at: i64,
}
