//! HMAC-SHA256 signed bearer tokens carrying a username and role claims.

use std::time::Duration;

use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::Principal;

/// Shortest accepted signing secret.
pub const MIN_SECRET_BYTES: usize = 32;

/// Default token lifetime: five minutes.
pub const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("a bearer token is required")]
    Missing,

    #[error("the token is malformed")]
    Malformed,

    #[error("the token signature is invalid")]
    BadSignature,

    #[error("the token has expired")]
    Expired,

    #[error("the token was not issued for this service")]
    UntrustedIssuer,

    #[error("failed to sign token: {0}")]
    Signing(String),
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    roles: Vec<String>,
    iat: i64,
    exp: i64,
    iss: String,
    aud: String,
}

/// A signed token and when it stops being accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Token {
    pub value: String,
    pub expires_at: DateTime<Utc>,
}

pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    audience: String,
    lifetime: Duration,
}

impl TokenService {
    pub fn new(secret: &[u8], issuer: impl Into<String>, audience: impl Into<String>) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            issuer: issuer.into(),
            audience: audience.into(),
            lifetime: DEFAULT_TOKEN_LIFETIME,
        }
    }

    #[must_use]
    pub fn with_lifetime(mut self, lifetime: Duration) -> Self {
        self.lifetime = lifetime;
        self
    }

    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    pub fn issue(&self, principal: &Principal) -> Result<Token, AuthError> {
        self.issue_at(principal, Utc::now())
    }

    /// Issues a token as if the current time were `now`.
    pub fn issue_at(&self, principal: &Principal, now: DateTime<Utc>) -> Result<Token, AuthError> {
        let lifetime = i64::try_from(self.lifetime.as_secs()).unwrap_or(i64::MAX);
        let iat = now.timestamp();
        let exp = iat.saturating_add(lifetime);
        let claims = Claims {
            sub: principal.username.clone(),
            roles: principal.roles.iter().cloned().collect(),
            iat,
            exp,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };

        let value = jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AuthError::Signing(e.to_string()))?;
        let expires_at = DateTime::from_timestamp(exp, 0).unwrap_or(DateTime::<Utc>::MAX_UTC);

        tracing::debug!(user = %principal.username, %expires_at, "token issued");
        Ok(Token { value, expires_at })
    }

    pub fn verify(&self, raw: &str) -> Result<Principal, AuthError> {
        self.verify_at(raw, Utc::now())
    }

    /// Verifies `raw` as if the current time were `now`.
    ///
    /// The signature is checked before any claim, so a tampered payload is
    /// always reported as [`AuthError::BadSignature`].
    pub fn verify_at(&self, raw: &str, now: DateTime<Utc>) -> Result<Principal, AuthError> {
        let data = jsonwebtoken::decode::<Claims>(raw, &self.decoding, &self.validation())
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => AuthError::BadSignature,
                ErrorKind::InvalidIssuer | ErrorKind::InvalidAudience => AuthError::UntrustedIssuer,
                _ => AuthError::Malformed,
            })?;

        let claims = data.claims;
        if now.timestamp() > claims.exp {
            return Err(AuthError::Expired);
        }
        Ok(Principal::new(claims.sub, claims.roles))
    }

    fn validation(&self) -> Validation {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is checked against the caller's clock in `verify_at`.
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub", "iss", "aud"]);
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.audience]);
        validation
    }
}
