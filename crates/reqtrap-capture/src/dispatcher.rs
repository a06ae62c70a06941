//! Catch-all capture handler
//!
//! Every request that no control route claims ends up here. Each one is logged
//! before it is answered, answered exactly once (from the mock table or with the
//! fixed captured payload) and the outcome is written back onto the same entry.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    extract::{ConnectInfo, Request},
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use http_body_util::LengthLimitError;
use reqtrap_db::{NewRequestLog, RecordStore, ResponseRecord};
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, error, warn};

use crate::mock_table::{MockDefinition, MockTable};

/// Paths answered with an empty 204 and never logged
pub const RESERVED_PATHS: &[&str] = &[
    "/token",
    "/requests",
    "/configure-response",
    "/custom-responses",
    "/create-user",
    "/favicon.ico",
];

/// Body returned for requests without a configured mock
pub const CAPTURED_BODY: &str = r#"{"status":"captured"}"#;

/// Default cap on captured request bodies (10 MiB)
pub const DEFAULT_MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Requests with larger bodies are refused with 413 and not logged
    pub max_body_bytes: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

/// State shared by every capture invocation
#[derive(Clone)]
pub struct CaptureState {
    pub store: Arc<dyn RecordStore>,
    pub mocks: Arc<MockTable>,
    pub config: CaptureConfig,
}

impl CaptureState {
    pub fn new(store: Arc<dyn RecordStore>, mocks: Arc<MockTable>, config: CaptureConfig) -> Self {
        Self {
            store,
            mocks,
            config,
        }
    }
}

/// Error body for capture failures
#[derive(Debug, Serialize)]
struct CaptureError {
    error: String,
    code: Option<String>,
}

/// Log, optionally delay, answer and record one request
pub async fn dispatch(state: &CaptureState, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let path = decode_path(parts.uri.path());

    if is_reserved(&path) {
        return StatusCode::NO_CONTENT.into_response();
    }

    let bytes = match to_bytes(body, state.config.max_body_bytes).await {
        Ok(bytes) => bytes,
        Err(e) if exceeded_limit(&e) => {
            debug!(path = %path, "Refusing oversized request body");
            return StatusCode::PAYLOAD_TOO_LARGE.into_response();
        }
        Err(_) => {
            debug!(path = %path, "Failed to read request body");
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    let method = parts.method.as_str().to_ascii_uppercase();
    let client_ip = client_ip(
        &parts.headers,
        parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr),
    );

    let entry = NewRequestLog {
        method: method.clone(),
        path: path.clone(),
        query: parts.uri.query().map(str::to_string),
        headers: headers_to_json(&parts.headers),
        body: decode_body(&bytes),
        client_ip,
        origin: parts
            .headers
            .get(header::ORIGIN)
            .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned()),
    };

    let log = match state.store.create_request_log(entry).await {
        Ok(log) => log,
        Err(e) => {
            error!(method = %method, path = %path, "Failed to capture request: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(CaptureError {
                    error: "Failed to capture request".to_string(),
                    code: Some("CAPTURE_FAILED".to_string()),
                }),
            )
                .into_response();
        }
    };

    let started = Instant::now();

    let (response, record) = match state.mocks.lookup(&method, &path) {
        Some(mock) => {
            if mock.delay > 0 {
                debug!(id = log.id, delay_secs = mock.delay, "Delaying mocked response");
                tokio::time::sleep(mock.delay_duration()).await;
            }
            mocked_response(&mock)
        }
        None => captured_response(),
    };

    let record = ResponseRecord {
        response_time_ms: i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX),
        ..record
    };
    let status = record.status;

    if let Err(e) = state.store.record_response(log.id, record).await {
        warn!(id = log.id, "Failed to record response outcome: {}", e);
    }

    debug!(id = log.id, method = %method, path = %path, status, "Captured request");
    response
}

/// Percent-decode the request path; invalid UTF-8 is replaced with U+FFFD
fn decode_path(raw: &str) -> String {
    String::from_utf8_lossy(&urlencoding::decode_binary(raw.as_bytes())).into_owned()
}

fn is_reserved(path: &str) -> bool {
    RESERVED_PATHS.contains(&path)
}

fn exceeded_limit(err: &axum::Error) -> bool {
    let mut current: Option<&(dyn std::error::Error + 'static)> = Some(err);

    while let Some(e) = current {
        if e.is::<LengthLimitError>() {
            return true;
        }
        current = e.source();
    }

    false
}

/// First non-empty `X-Forwarded-For` hop, else the transport peer
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    match forwarded {
        Some(ip) => Some(ip.to_string()),
        None => peer.map(|addr| addr.ip().to_string()),
    }
}

/// Serialize headers as a JSON object; repeated names are joined with ", "
pub fn headers_to_json(headers: &HeaderMap) -> String {
    let mut map: BTreeMap<String, String> = BTreeMap::new();

    for (name, value) in headers {
        let value = String::from_utf8_lossy(value.as_bytes());
        match map.get_mut(name.as_str()) {
            Some(existing) => {
                existing.push_str(", ");
                existing.push_str(&value);
            }
            None => {
                map.insert(name.as_str().to_string(), value.into_owned());
            }
        }
    }

    serde_json::to_string(&map).unwrap_or_else(|_| "{}".to_string())
}

fn decode_body(bytes: &[u8]) -> Option<String> {
    if bytes.is_empty() {
        None
    } else {
        Some(String::from_utf8_lossy(bytes).into_owned())
    }
}

fn mocked_response(mock: &MockDefinition) -> (Response, ResponseRecord) {
    let status = StatusCode::from_u16(mock.status).unwrap_or(StatusCode::OK);
    let mut response = Response::new(Body::from(mock.body.clone()));
    *response.status_mut() = status;

    for (name, value) in &mock.headers {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                response.headers_mut().append(name, value);
            }
            _ => warn!(header = %name, "Skipping invalid mock header"),
        }
    }

    let record = ResponseRecord {
        status: status.as_u16(),
        headers: serde_json::to_string(&mock.headers).unwrap_or_else(|_| "{}".to_string()),
        body: mock.body.clone(),
        response_time_ms: 0,
    };

    (response, record)
}

fn captured_response() -> (Response, ResponseRecord) {
    let response = (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json")],
        CAPTURED_BODY,
    )
        .into_response();

    let record = ResponseRecord {
        status: StatusCode::OK.as_u16(),
        headers: "{}".to_string(),
        body: CAPTURED_BODY.to_string(),
        response_time_ms: 0,
    };

    (response, record)
}
