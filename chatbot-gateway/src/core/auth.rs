use async_trait::async_trait;
use axum::{
    extract::FromRef,
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::models::error::ApiError;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: i64,
    pub iat: i64,
}

/// Signs and verifies HS256 bearer tokens. The `sub` claim is the caller
/// identity every project and rate bucket is keyed by.
pub struct AuthManager {
    secret: String,
}

impl AuthManager {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    pub fn generate_token(
        &self,
        user_id: &str,
        expiry_hours: i64,
    ) -> Result<String, jsonwebtoken::errors::Error> {
        let now = Utc::now();
        let exp = now + Duration::hours(expiry_hours);

        let claims = Claims {
            sub: user_id.to_string(),
            exp: exp.timestamp(),
            iat: now.timestamp(),
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
    }

    pub fn verify_token(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::default(),
        )
        .map(|data| data.claims)
    }
}

/// Authenticated caller, taken from `Authorization: Bearer <jwt>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity(pub String);

impl CallerIdentity {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for CallerIdentity
where
    Arc<AuthManager>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ApiError::Unauthorized("Access token required".to_string()))?;

        let auth = Arc::<AuthManager>::from_ref(state);
        let claims = auth.verify_token(token).map_err(|e| {
            debug!("Rejected bearer token: {}", e);
            ApiError::Unauthorized("Invalid or expired token".to_string())
        })?;

        Ok(CallerIdentity(claims.sub))
    }
}
