//! JWT (JSON Web Token) handling for control API sessions

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Issuer written into every session token
pub const DEFAULT_ISSUER: &str = "reqtrap";

/// Session token claims
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JwtClaims {
    /// Subject (username)
    pub sub: String,
    /// Issued at (timestamp)
    pub iat: i64,
    /// Expiration time (timestamp)
    pub exp: i64,
    /// Issuer
    pub iss: String,
}

impl JwtClaims {
    pub fn new(username: String, issuer: String, validity: Duration) -> Self {
        let now = Utc::now();
        let exp = now + validity;

        Self {
            sub: username,
            iat: now.timestamp(),
            exp: exp.timestamp(),
            iss: issuer,
        }
    }
}

/// JWT errors
#[derive(Debug, Error)]
pub enum JwtError {
    #[error("JWT error: {0}")]
    EncodingError(#[from] jsonwebtoken::errors::Error),

    #[error("Token has an empty subject")]
    MissingSubject,
}

/// HS256 session token signer and validator
pub struct JwtValidator {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtValidator {
    /// Create a validator for the given shared secret
    ///
    /// Validates signature and expiration; issuer is checked only when
    /// `with_issuer` is called.
    pub fn new(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.validate_aud = false;
        validation.validate_nbf = false;
        validation.leeway = 0;

        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
        }
    }

    pub fn with_issuer(mut self, issuer: &str) -> Self {
        self.validation.set_issuer(&[issuer]);
        self
    }

    pub fn validate(&self, token: &str) -> Result<JwtClaims, JwtError> {
        let token_data = decode::<JwtClaims>(token, &self.decoding_key, &self.validation)?;

        if token_data.claims.sub.is_empty() {
            return Err(JwtError::MissingSubject);
        }

        Ok(token_data.claims)
    }

    /// Sign claims with this validator's secret
    pub fn sign(&self, claims: &JwtClaims) -> Result<String, JwtError> {
        Ok(encode(
            &Header::new(Algorithm::HS256),
            claims,
            &self.encoding_key,
        )?)
    }
}
