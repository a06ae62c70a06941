//! Bearer token authentication for the control API
//!
//! Extracts the JWT from the `Authorization` header, validates it against the
//! auth service and makes the operator available to handlers via `Extension`.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, HeaderName, StatusCode},
    middleware::Next,
    response::Response,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::models::ErrorResponse;
use crate::AppState;

/// Authenticated operator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthUser {
    pub username: String,
}

/// 401 rejection carrying a `WWW-Authenticate: Bearer` challenge
pub type AuthRejection = (
    StatusCode,
    [(HeaderName, &'static str); 1],
    Json<ErrorResponse>,
);

pub fn unauthorized(error: impl Into<String>, code: &str) -> AuthRejection {
    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, "Bearer")],
        Json(ErrorResponse::new(error, code)),
    )
}

/// Require a valid `Authorization: Bearer <token>` header
///
/// Returns 401 when the header is missing or malformed, when the token fails
/// validation, or when its subject no longer exists.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthRejection> {
    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| unauthorized("Not authenticated", "MISSING_AUTH"))?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| {
            unauthorized(
                "Invalid Authorization header format. Expected 'Bearer <token>'",
                "INVALID_AUTH_FORMAT",
            )
        })?;

    let user = state.auth.authorize(token).await.map_err(|e| {
        if e.is_unauthorized() {
            debug!("Rejected bearer token: {}", e);
            unauthorized("Could not validate credentials", "INVALID_TOKEN")
        } else {
            warn!("Token validation failed: {}", e);
            unauthorized("Could not validate credentials", "AUTH_UNAVAILABLE")
        }
    })?;

    request.extensions_mut().insert(AuthUser {
        username: user.username,
    });

    Ok(next.run(request).await)
}
