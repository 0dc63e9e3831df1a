//! Bearer token validation.
//!
//! Tokens are HS256 JWTs carrying a `user_id` and an `exp` claim. The
//! validator takes the clock as an argument so expiry is decided against an
//! explicit `now` (unix seconds).

use std::collections::HashSet;

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db::UserId;
use crate::{HubError, Result};

/// Why a credential was refused.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    /// The token's `exp` is not after `now`.
    #[error("credential expired")]
    Expired,
    /// Bad signature, not a JWT, or required claims missing.
    #[error("credential malformed")]
    Malformed,
    /// Any other decode failure.
    #[error("credential could not be decoded")]
    Unknown,
}

/// JWT claims structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Identity the token was issued for.
    pub user_id: UserId,
    /// Expiration timestamp.
    pub exp: i64,
    /// Issued at timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    /// JWT ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
    /// Token type as set by the issuer (e.g. "access").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
}

/// Validates bearer credentials against a shared secret.
#[derive(Clone)]
pub struct TokenValidator {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl TokenValidator {
    /// Create a new validator from a secret key.
    pub fn new(secret: &str) -> Self {
        let decoding_key = DecodingKey::from_secret(secret.as_bytes());

        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is checked against the caller's clock in `validate`.
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims = HashSet::from(["exp".to_string()]);

        Self {
            decoding_key,
            validation,
        }
    }

    /// Verify `credential` and return the identity it names.
    pub fn validate(&self, credential: &str, now: i64) -> std::result::Result<UserId, AuthError> {
        let data = decode::<TokenClaims>(credential, &self.decoding_key, &self.validation)
            .map_err(|e| {
                tracing::debug!(error = %e, "token decode failed");
                classify(e.kind())
            })?;

        if data.claims.exp <= now {
            return Err(AuthError::Expired);
        }

        Ok(data.claims.user_id)
    }
}

impl std::fmt::Debug for TokenValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenValidator").finish_non_exhaustive()
    }
}

fn classify(kind: &ErrorKind) -> AuthError {
    match kind {
        ErrorKind::ExpiredSignature => AuthError::Expired,
        ErrorKind::InvalidToken
        | ErrorKind::InvalidSignature
        | ErrorKind::MissingRequiredClaim(_)
        | ErrorKind::InvalidAlgorithm
        | ErrorKind::MissingAlgorithm
        | ErrorKind::InvalidIssuer
        | ErrorKind::InvalidAudience
        | ErrorKind::InvalidSubject
        | ErrorKind::ImmatureSignature
        | ErrorKind::Base64(_)
        | ErrorKind::Json(_)
        | ErrorKind::Utf8(_) => AuthError::Malformed,
        _ => AuthError::Unknown,
    }
}

/// Mint an access token for `user_id` valid for `ttl_secs` from `now`.
pub fn issue_token(secret: &str, user_id: UserId, ttl_secs: i64, now: i64) -> Result<String> {
    let claims = TokenClaims {
        user_id,
        exp: now + ttl_secs,
        iat: Some(now),
        jti: Some(uuid::Uuid::new_v4().simple().to_string()),
        token_type: Some("access".to_string()),
    };

    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| HubError::Auth(format!("failed to encode token: {e}")))
}
