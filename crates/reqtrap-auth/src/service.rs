//! Authentication service: login, token validation and operator provisioning

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use reqtrap_db::{entities::user, UserStore};
use tracing::{debug, info};

use crate::error::AuthError;
use crate::jwt::{JwtClaims, JwtValidator, DEFAULT_ISSUER};
use crate::password;

/// Configuration for the authentication service
#[derive(Clone)]
pub struct AuthServiceConfig {
    /// HS256 signing secret; must be provisioned by the operator
    pub jwt_secret: String,
    /// Session token lifetime
    pub token_ttl: Duration,
}

impl AuthServiceConfig {
    pub fn new(jwt_secret: impl Into<String>) -> Self {
        Self {
            jwt_secret: jwt_secret.into(),
            token_ttl: Duration::minutes(60),
        }
    }

    pub fn with_token_ttl(mut self, ttl: Duration) -> Self {
        self.token_ttl = ttl;
        self
    }
}

/// A freshly issued session token
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
}

/// Authentication service over a user store
pub struct AuthService {
    users: Arc<dyn UserStore>,
    validator: JwtValidator,
    token_ttl: Duration,
}

impl AuthService {
    pub fn new(users: Arc<dyn UserStore>, config: AuthServiceConfig) -> Self {
        Self {
            users,
            validator: JwtValidator::new(config.jwt_secret.as_bytes()).with_issuer(DEFAULT_ISSUER),
            token_ttl: config.token_ttl,
        }
    }

    /// Exchange a username and password for a session token
    pub async fn login(&self, username: &str, password: &str) -> Result<IssuedToken, AuthError> {
        let user = self
            .users
            .find_user(username)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        if !verify_blocking(password, &user.password_hash).await? {
            debug!(username, "Rejected login: password mismatch");
            return Err(AuthError::InvalidCredentials);
        }

        let claims = JwtClaims::new(user.username, DEFAULT_ISSUER.to_string(), self.token_ttl);
        let access_token = self.validator.sign(&claims)?;
        let expires_at = DateTime::<Utc>::from_timestamp(claims.exp, 0).unwrap_or_else(Utc::now);

        info!(username, "Issued session token");
        Ok(IssuedToken {
            access_token,
            expires_at,
        })
    }

    /// Validate a bearer token and resolve the user it was issued to
    pub async fn authorize(&self, token: &str) -> Result<user::Model, AuthError> {
        let claims = self.validator.validate(token)?;

        self.users
            .find_user(&claims.sub)
            .await?
            .ok_or(AuthError::UnknownUser(claims.sub))
    }

    /// Create a new operator account
    pub async fn create_user(&self, username: &str, password: &str) -> Result<user::Model, AuthError> {
        let username = username.trim();
        if username.is_empty() || password.is_empty() {
            return Err(AuthError::EmptyCredentials);
        }

        if self.users.find_user(username).await?.is_some() {
            return Err(AuthError::UserExists(username.to_string()));
        }

        let hash = hash_blocking(password).await?;
        let created = self.users.create_user(username, &hash).await?;

        info!(username, "Created user");
        Ok(created)
    }
}

async fn hash_blocking(password: &str) -> Result<String, AuthError> {
    let password = password.to_string();
    tokio::task::spawn_blocking(move || password::hash_password(&password))
        .await
        .map_err(|e| AuthError::Task(e.to_string()))?
        .map_err(AuthError::from)
}

async fn verify_blocking(password: &str, hash: &str) -> Result<bool, AuthError> {
    let password = password.to_string();
    let hash = hash.to_string();
    tokio::task::spawn_blocking(move || password::verify_password(&password, &hash))
        .await
        .map_err(|e| AuthError::Task(e.to_string()))?
        .map_err(AuthError::from)
}
