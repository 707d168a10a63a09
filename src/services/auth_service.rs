//! Bearer credential verification.
//!
//! Credentials are HS256 JWTs carrying `{user_id, email, name, exp, iat}` claims. Issuing them
//! belongs to the identity service; [`JwtVerifier::issue`] exists for local tooling and tests.

use std::{env, time::Duration};

use axum::http::{HeaderMap, header::AUTHORIZATION};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;
use tracing::warn;
use uuid::Uuid;

use crate::error::ServiceError;

const JWT_SECRET_ENV: &str = "JWT_SECRET";
const DEFAULT_SECRET: &str = "retro-live-dev-secret";
const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Identity resolved from a valid credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    /// Stable user identifier.
    pub user_id: Uuid,
    /// Email claim, empty when absent.
    pub email: String,
    /// Display name announced to rooms.
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    user_id: Uuid,
    #[serde(default)]
    email: String,
    name: String,
    exp: i64,
    iat: i64,
}

/// Reasons a credential is refused.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No credential was supplied.
    #[error("bearer token required")]
    MissingToken,
    /// The credential is malformed, forged or expired.
    #[error("invalid or expired token")]
    InvalidToken(#[source] jsonwebtoken::errors::Error),
}

impl From<AuthError> for ServiceError {
    fn from(err: AuthError) -> Self {
        ServiceError::Unauthorized(err.to_string())
    }
}

/// Maps an opaque bearer credential to a user identity.
pub trait TokenVerifier: Send + Sync {
    /// Resolve `token` into the identity it was issued for.
    fn verify(&self, token: &str) -> Result<AuthenticatedUser, AuthError>;
}

/// HS256 verifier sharing one secret with the identity service.
pub struct JwtVerifier {
    decoding: DecodingKey,
    encoding: EncodingKey,
    validation: Validation,
    ttl: Duration,
}

impl JwtVerifier {
    /// Verifier signing and checking HS256 tokens with `secret`.
    pub fn new(secret: &[u8]) -> Self {
        Self {
            decoding: DecodingKey::from_secret(secret),
            encoding: EncodingKey::from_secret(secret),
            validation: Validation::new(Algorithm::HS256),
            ttl: DEFAULT_TOKEN_TTL,
        }
    }

    /// Build a verifier from `JWT_SECRET`, falling back to a development secret.
    pub fn from_env() -> Self {
        match env::var(JWT_SECRET_ENV) {
            Ok(secret) if !secret.is_empty() => Self::new(secret.as_bytes()),
            _ => {
                warn!("JWT_SECRET not set; using the development secret");
                Self::new(DEFAULT_SECRET.as_bytes())
            }
        }
    }

    /// Sign a credential for `user`.
    pub fn issue(&self, user: &AuthenticatedUser) -> Result<String, AuthError> {
        let iat = OffsetDateTime::now_utc().unix_timestamp();
        let claims = Claims {
            user_id: user.user_id,
            email: user.email.clone(),
            name: user.name.clone(),
            exp: iat + self.ttl.as_secs() as i64,
            iat,
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(AuthError::InvalidToken)
    }
}

impl TokenVerifier for JwtVerifier {
    fn verify(&self, token: &str) -> Result<AuthenticatedUser, AuthError> {
        if token.is_empty() {
            return Err(AuthError::MissingToken);
        }
        let data = decode::<Claims>(token, &self.decoding, &self.validation)
            .map_err(AuthError::InvalidToken)?;
        Ok(AuthenticatedUser {
            user_id: data.claims.user_id,
            email: data.claims.email,
            name: data.claims.name,
        })
    }
}

/// Extract the credential of an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or(AuthError::MissingToken)
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    fn user() -> AuthenticatedUser {
        AuthenticatedUser {
            user_id: Uuid::new_v4(),
            email: "joao@example.com".into(),
            name: "João da Silva".into(),
        }
    }

    #[test]
    fn issued_token_verifies() {
        let verifier = JwtVerifier::new(b"test-secret");
        let user = user();
        let token = verifier.issue(&user).unwrap();
        assert_eq!(verifier.verify(&token).unwrap(), user);
    }

    #[test]
    fn token_signed_with_another_secret_is_rejected() {
        let token = JwtVerifier::new(b"one").issue(&user()).unwrap();
        assert!(matches!(
            JwtVerifier::new(b"two").verify(&token),
            Err(AuthError::InvalidToken(_))
        ));
    }

    #[test]
    fn expired_token_is_rejected() {
        let mut verifier = JwtVerifier::new(b"test-secret");
        verifier.validation.leeway = 0;
        let iat = OffsetDateTime::now_utc().unix_timestamp() - 7200;
        let claims = Claims {
            user_id: Uuid::new_v4(),
            email: String::new(),
            name: "Old".into(),
            exp: iat + 3600,
            iat,
        };
        let token = encode(&Header::default(), &claims, &verifier.encoding).unwrap();
        assert!(verifier.verify(&token).is_err());
    }

    #[test]
    fn garbage_is_rejected() {
        let verifier = JwtVerifier::new(b"test-secret");
        assert!(verifier.verify("not.a.jwt.token").is_err());
        assert!(matches!(verifier.verify(""), Err(AuthError::MissingToken)));
    }

    #[test]
    fn bearer_header_parsing() {
        let mut headers = HeaderMap::new();
        assert!(bearer_token(&headers).is_err());

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        assert_eq!(bearer_token(&headers).unwrap(), "abc");

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Invalid abc"));
        assert!(bearer_token(&headers).is_err());

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert!(bearer_token(&headers).is_err());
    }
}
