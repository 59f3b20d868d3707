//! Signed identity tokens (HS256 JWT) carrying user id, email and role.

use std::time::Duration;

use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::Role;

/// Who a token says the caller is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub id:    String,
    pub email: String,
    pub role:  Role,
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub:   String,
    email: String,
    role:  Role,
    iat:   i64,
    exp:   i64,
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("invalid or expired token")]
    InvalidToken,
    #[error("token signing failed: {0}")]
    Signing(#[source] jsonwebtoken::errors::Error),
}

#[derive(Clone)]
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl:      Duration,
}

impl TokenService {
    pub fn new(secret: &str, ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
        }
    }

    pub fn issue(&self, identity: &Identity) -> Result<String, TokenError> {
        let now = Utc::now().timestamp();
        let ttl = i64::try_from(self.ttl.as_secs()).unwrap_or(i64::MAX);
        self.sign(identity, now, now.saturating_add(ttl))
    }

    fn sign(&self, identity: &Identity, iat: i64, exp: i64) -> Result<String, TokenError> {
        let claims = Claims {
            sub:   identity.id.clone(),
            email: identity.email.clone(),
            role:  identity.role,
            iat,
            exp,
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding).map_err(TokenError::Signing)
    }

    pub fn verify(&self, token: &str) -> Result<Identity, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        let data = decode::<Claims>(token, &self.decoding, &validation)
            .map_err(|_| TokenError::InvalidToken)?;
        Ok(Identity {
            id:    data.claims.sub,
            email: data.claims.email,
            role:  data.claims.role,
        })
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

impl std::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService").field("ttl", &self.ttl).finish_non_exhaustive()
    }
}
