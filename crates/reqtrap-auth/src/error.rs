//! Authentication error types

use thiserror::Error;

use crate::jwt::JwtError;
use crate::password::PasswordError;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Incorrect username or password")]
    InvalidCredentials,

    #[error("Could not validate credentials: {0}")]
    InvalidToken(#[from] JwtError),

    #[error("Token subject '{0}' is not a known user")]
    UnknownUser(String),

    #[error("User '{0}' already exists")]
    UserExists(String),

    #[error("Username and password must not be empty")]
    EmptyCredentials,

    #[error(transparent)]
    Password(#[from] PasswordError),

    #[error("Storage error: {0}")]
    Storage(reqtrap_db::StoreError),

    #[error("Hashing task failed: {0}")]
    Task(String),
}

impl From<reqtrap_db::StoreError> for AuthError {
    fn from(err: reqtrap_db::StoreError) -> Self {
        match err {
            reqtrap_db::StoreError::UserExists(name) => AuthError::UserExists(name),
            other => AuthError::Storage(other),
        }
    }
}

impl AuthError {
    /// Errors the caller caused by presenting bad credentials
    pub fn is_unauthorized(&self) -> bool {
        matches!(
            self,
            AuthError::InvalidCredentials | AuthError::InvalidToken(_) | AuthError::UnknownUser(_)
        )
    }
}
