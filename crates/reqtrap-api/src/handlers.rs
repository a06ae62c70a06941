//! Control API handlers

use std::sync::Arc;

use axum::{
    extract::{Query, Request, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Form, Json,
};
use reqtrap_auth::AuthError;
use reqtrap_capture::MockDefinition;
use tracing::{debug, error, info, warn};

use crate::middleware::{unauthorized, AuthUser};
use crate::models::*;
use crate::AppState;

/// Upper bound for `GET /requests?limit=`
pub const MAX_PAGE_SIZE: u64 = 1000;

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, error: impl Into<String>, code: &str) -> ApiError {
    (status, Json(ErrorResponse::new(error, code)))
}

fn internal_error(context: &str, err: impl std::fmt::Display) -> ApiError {
    error!("{}: {}", context, err);
    api_error(StatusCode::INTERNAL_SERVER_ERROR, context, "INTERNAL_ERROR")
}

/// Exchange operator credentials for a bearer token
#[utoipa::path(
    post,
    path = "/token",
    request_body(content = TokenRequest, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Token issued", body = TokenResponse),
        (status = 401, description = "Incorrect username or password", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn issue_token(
    State(state): State<Arc<AppState>>,
    Form(req): Form<TokenRequest>,
) -> Result<Json<TokenResponse>, Response> {
    match state.auth.login(&req.username, &req.password).await {
        Ok(issued) => Ok(Json(TokenResponse {
            access_token: issued.access_token,
            token_type: "bearer".to_string(),
            expires_at: issued.expires_at,
        })),
        Err(e) if e.is_unauthorized() => {
            debug!(username = %req.username, "Login rejected");
            Err(unauthorized("Incorrect username or password", "INVALID_CREDENTIALS").into_response())
        }
        Err(e) => Err(internal_error("Login failed", e).into_response()),
    }
}

/// List the most recent captured requests, newest first
#[utoipa::path(
    get,
    path = "/requests",
    params(CapturedRequestQuery),
    responses(
        (status = 200, description = "Captured requests", body = Vec<CapturedRequest>),
        (status = 401, description = "Not authenticated", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "traffic"
)]
pub async fn list_requests(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<CapturedRequestQuery>,
) -> Result<Json<Vec<CapturedRequest>>, ApiError> {
    let limit = query.limit.unwrap_or(state.page_size).clamp(1, MAX_PAGE_SIZE);
    debug!(username = %user.username, limit, "Listing captured requests");

    let logs = state
        .store
        .latest_request_logs(limit)
        .await
        .map_err(|e| internal_error("Failed to load captured requests", e))?;

    Ok(Json(logs.into_iter().map(CapturedRequest::from).collect()))
}

/// Create or replace the mock response for a method and path
#[utoipa::path(
    post,
    path = "/configure-response",
    request_body = ConfigureResponseRequest,
    responses(
        (status = 200, description = "Mock response stored", body = ConfigureResponseResponse),
        (status = 400, description = "Invalid mock definition", body = ErrorResponse),
        (status = 401, description = "Not authenticated", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "mocks"
)]
pub async fn configure_response(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<ConfigureResponseRequest>,
) -> Result<Json<ConfigureResponseResponse>, ApiError> {
    let definition = MockDefinition::new(
        &req.method,
        &req.path,
        req.status,
        req.headers,
        req.body,
        req.delay,
    )
    .map_err(|e| api_error(StatusCode::BAD_REQUEST, e.to_string(), "INVALID_MOCK"))?;

    state
        .store
        .upsert_mock_response(definition.to_store_input())
        .await
        .map_err(|e| internal_error("Failed to store mock response", e))?;

    state
        .capture
        .mocks
        .reload(state.store.as_ref())
        .await
        .map_err(|e| internal_error("Failed to reload mock responses", e))?;

    info!(
        username = %user.username,
        method = %definition.method,
        path = %definition.path,
        status = definition.status,
        "Configured mock response"
    );

    Ok(Json(ConfigureResponseResponse {
        message: "Configured".to_string(),
        target: MockTarget {
            method: definition.method,
            path: definition.path,
        },
    }))
}

/// List every stored mock response
#[utoipa::path(
    get,
    path = "/custom-responses",
    responses(
        (status = 200, description = "Stored mock responses", body = Vec<MockResponse>),
        (status = 401, description = "Not authenticated", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "mocks"
)]
pub async fn list_custom_responses(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<MockResponse>>, ApiError> {
    let rows = state
        .store
        .mock_responses()
        .await
        .map_err(|e| internal_error("Failed to load mock responses", e))?;

    Ok(Json(rows.into_iter().map(MockResponse::from).collect()))
}

/// Create another operator account
#[utoipa::path(
    post,
    path = "/create-user",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "User created", body = MessageResponse),
        (status = 400, description = "Empty username or password", body = ErrorResponse),
        (status = 401, description = "Not authenticated", body = ErrorResponse),
        (status = 409, description = "User already exists", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn create_user(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<MessageResponse>), ApiError> {
    match state.auth.create_user(&req.username, &req.password).await {
        Ok(created) => {
            info!(by = %user.username, username = %created.username, "Operator created");
            Ok((
                StatusCode::CREATED,
                Json(MessageResponse {
                    message: format!("User {} created", created.username),
                }),
            ))
        }
        Err(AuthError::UserExists(name)) => {
            warn!(username = %name, "Refusing to create duplicate user");
            Err(api_error(
                StatusCode::CONFLICT,
                "User already exists",
                "USER_EXISTS",
            ))
        }
        Err(AuthError::EmptyCredentials) => Err(api_error(
            StatusCode::BAD_REQUEST,
            AuthError::EmptyCredentials.to_string(),
            "EMPTY_CREDENTIALS",
        )),
        Err(e) => Err(internal_error("Failed to create user", e)),
    }
}

/// Send anything the control routes do not serve to the capture path
pub async fn capture_fallback(State(state): State<Arc<AppState>>, request: Request) -> Response {
    reqtrap_capture::dispatch(&state.capture, request).await
}

/// Serve the generated OpenAPI document
pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    use utoipa::OpenApi;
    Json(crate::ApiDoc::openapi())
}
