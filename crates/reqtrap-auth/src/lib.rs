//! Operator authentication for the reqtrap control API
//!
//! Passwords are stored as Argon2id hashes; sessions are HS256 bearer tokens
//! whose signing secret comes from configuration.

pub mod error;
pub mod jwt;
pub mod password;
pub mod service;

pub use error::AuthError;
pub use jwt::{JwtClaims, JwtError, JwtValidator};
pub use password::{hash_password, verify_password, PasswordError};
pub use service::{AuthService, AuthServiceConfig, IssuedToken};
