//! HTTP surface for reqtrap: the authenticated control API plus the catch-all
//! capture route.

pub mod handlers;
pub mod middleware;
pub mod models;

use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use axum::{
    middleware as axum_middleware,
    routing::{get, post, MethodRouter},
    Router,
};
use reqtrap_auth::{AuthService, AuthServiceConfig};
use reqtrap_capture::{CaptureConfig, CaptureState, MockTable};
use reqtrap_db::{RecordStore, StoreError, UserStore};
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};
use tracing::info;
use utoipa::OpenApi;

/// Application state shared across handlers
pub struct AppState {
    pub store: Arc<dyn RecordStore>,
    pub auth: AuthService,
    pub capture: CaptureState,
    /// Default number of entries returned by `GET /requests`
    pub page_size: u64,
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    info(
        title = "reqtrap control API",
        version = "0.1.0",
        description = "Inspect captured HTTP traffic and configure mock responses"
    ),
    paths(
        handlers::issue_token,
        handlers::list_requests,
        handlers::configure_response,
        handlers::list_custom_responses,
        handlers::create_user,
    ),
    components(
        schemas(
            models::ErrorResponse,
            models::TokenRequest,
            models::TokenResponse,
            models::CapturedRequest,
            models::ConfigureResponseRequest,
            models::ConfigureResponseResponse,
            models::MockTarget,
            models::MockResponse,
            models::CreateUserRequest,
            models::MessageResponse,
        )
    ),
    tags(
        (name = "auth", description = "Operator authentication"),
        (name = "traffic", description = "Captured traffic inspection"),
        (name = "mocks", description = "Mock response configuration")
    )
)]
pub struct ApiDoc;

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    /// Address to bind the server
    pub bind_addr: SocketAddr,
    /// Permissive CORS on every route
    pub enable_cors: bool,
    /// Default page size for `GET /requests`
    pub page_size: u64,
    /// Directory served under `/static`, if any
    pub static_dir: Option<PathBuf>,
    /// Expose the OpenAPI document at `/openapi.json`
    pub enable_openapi: bool,
    pub capture: CaptureConfig,
}

impl Default for ApiServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8000)),
            enable_cors: false,
            page_size: 20,
            static_dir: None,
            enable_openapi: false,
            capture: CaptureConfig::default(),
        }
    }
}

/// API Server
pub struct ApiServer {
    config: ApiServerConfig,
    state: Arc<AppState>,
}

impl ApiServer {
    /// Create a new API server
    ///
    /// The mock table starts empty; call [`ApiServer::reload_mocks`] (or
    /// [`ApiServer::start`], which does it) to load stored definitions.
    pub fn new(
        config: ApiServerConfig,
        store: Arc<dyn RecordStore>,
        users: Arc<dyn UserStore>,
        auth_config: AuthServiceConfig,
    ) -> Self {
        let capture = CaptureState::new(
            store.clone(),
            Arc::new(MockTable::new()),
            config.capture.clone(),
        );

        let state = Arc::new(AppState {
            store,
            auth: AuthService::new(users, auth_config),
            capture,
            page_size: config.page_size,
        });

        Self { config, state }
    }

    pub fn state(&self) -> Arc<AppState> {
        self.state.clone()
    }

    /// Rebuild the mock table from storage
    pub async fn reload_mocks(&self) -> Result<usize, StoreError> {
        self.state
            .capture
            .mocks
            .reload(self.state.store.as_ref())
            .await
    }

    /// Build the router with all routes
    pub fn build_router(&self) -> Router {
        let state = self.state.clone();

        let protected = |route: MethodRouter<Arc<AppState>>| {
            route
                .route_layer(axum_middleware::from_fn_with_state(
                    state.clone(),
                    middleware::require_auth,
                ))
                .fallback(handlers::capture_fallback)
        };

        let mut router = Router::new()
            .route(
                "/token",
                post(handlers::issue_token).fallback(handlers::capture_fallback),
            )
            .route("/requests", protected(get(handlers::list_requests)))
            .route(
                "/configure-response",
                protected(post(handlers::configure_response)),
            )
            .route(
                "/custom-responses",
                protected(get(handlers::list_custom_responses)),
            )
            .route("/create-user", protected(post(handlers::create_user)));

        if self.config.enable_openapi {
            router = router.route("/openapi.json", get(handlers::openapi_json));
        }

        if let Some(dir) = &self.config.static_dir {
            router = router.nest_service("/static", ServeDir::new(dir));
        }

        let mut router = router
            .fallback(handlers::capture_fallback)
            .with_state(self.state.clone())
            .layer(TraceLayer::new_for_http());

        if self.config.enable_cors {
            router = router.layer(CorsLayer::permissive());
        }

        router
    }

    /// Load mocks, bind and serve until Ctrl-C
    pub async fn start(self) -> Result<(), anyhow::Error> {
        let loaded = self.reload_mocks().await?;
        info!("Loaded {} mock response(s)", loaded);

        let router = self.build_router();

        info!("Starting reqtrap on {}", self.config.bind_addr);
        if self.config.enable_openapi {
            info!(
                "OpenAPI spec: http://{}/openapi.json",
                self.config.bind_addr
            );
        }

        let listener = tokio::net::TcpListener::bind(self.config.bind_addr).await?;

        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

        info!("Server stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => tracing::error!("Failed to listen for shutdown signal: {}", e),
    }
}
