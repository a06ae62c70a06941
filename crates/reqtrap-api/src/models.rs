//! Request and response types for the control API

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use reqtrap_db::entities::{mock_response, request_log};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// Error message
    pub error: String,
    /// Error code
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, code: &str) -> Self {
        Self {
            error: error.into(),
            code: Some(code.to_string()),
        }
    }
}

/// Form-encoded login request for `POST /token`
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TokenRequest {
    pub username: String,
    pub password: String,
}

/// Issued session token
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TokenResponse {
    pub access_token: String,
    /// Always `"bearer"`
    pub token_type: String,
    pub expires_at: DateTime<Utc>,
}

/// Query parameters for `GET /requests`
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct CapturedRequestQuery {
    /// Maximum number of entries to return (defaults to the server page size)
    pub limit: Option<u64>,
}

/// One captured request and, once answered, its response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CapturedRequest {
    pub id: i64,
    pub method: String,
    pub path: String,
    /// Raw query string
    pub query: Option<String>,
    /// Request headers as captured (JSON object text)
    pub headers: String,
    pub body: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub client_ip: Option<String>,
    pub origin: Option<String>,
    pub response_status: Option<i32>,
    /// Response headers (JSON object text)
    pub response_headers: Option<String>,
    pub response_body: Option<String>,
    pub response_time_ms: Option<i64>,
}

impl From<request_log::Model> for CapturedRequest {
    fn from(log: request_log::Model) -> Self {
        Self {
            id: log.id,
            method: log.method,
            path: log.path,
            query: log.query,
            headers: log.headers,
            body: log.body,
            timestamp: log.timestamp,
            client_ip: log.client_ip,
            origin: log.origin,
            response_status: log.response_status,
            response_headers: log.response_headers,
            response_body: log.response_body,
            response_time_ms: log.response_time_ms,
        }
    }
}

/// Mock response definition submitted to `POST /configure-response`
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ConfigureResponseRequest {
    pub method: String,
    pub path: String,
    #[serde(default = "default_status")]
    pub status: i64,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub body: Option<String>,
    /// Delay before answering, in seconds
    #[serde(default)]
    pub delay: i64,
}

fn default_status() -> i64 {
    200
}

/// The `(method, path)` pair a mock was configured for
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MockTarget {
    pub method: String,
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ConfigureResponseResponse {
    pub message: String,
    #[serde(rename = "for")]
    pub target: MockTarget,
}

/// Stored mock response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MockResponse {
    pub id: i64,
    pub method: String,
    pub path: String,
    pub status: i32,
    pub headers: BTreeMap<String, String>,
    pub body: String,
    pub delay: i64,
    pub updated_at: DateTime<Utc>,
}

impl From<mock_response::Model> for MockResponse {
    fn from(row: mock_response::Model) -> Self {
        Self {
            id: row.id,
            headers: serde_json::from_str(&row.headers).unwrap_or_default(),
            method: row.method,
            path: row.path,
            status: row.status,
            body: row.body.unwrap_or_default(),
            delay: row.delay,
            updated_at: row.updated_at,
        }
    }
}

/// Operator account creation request
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateUserRequest {
    pub username: String,
    pub password: String,
}

/// Plain acknowledgement
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}
