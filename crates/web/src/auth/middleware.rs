//! Bearer token extraction for Axum handlers.

use async_trait::async_trait;
use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts, HeaderMap},
};
use meshgate_common::{Error, User};
use std::sync::Arc;

use super::provider::AuthManager;
use crate::blocking::run_blocking;
use crate::error::ApiError;

/// The authenticated caller, re-loaded from the record store
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    Arc<AuthManager>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let auth = Arc::<AuthManager>::from_ref(state);
        let token = bearer_token(&parts.headers)
            .ok_or_else(|| Error::unauthorized("missing or invalid authorization header"))?
            .to_string();
        let user = run_blocking(move || auth.caller(&token)).await?;
        Ok(CurrentUser(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_bearer_token() {
        let mut headers = HeaderMap::new();
        assert!(bearer_token(&headers).is_none());

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert!(bearer_token(&headers).is_none());

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(bearer_token(&headers), Some("abc.def"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert!(bearer_token(&headers).is_none());
    }
}
