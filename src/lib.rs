//! EtnoApp backend - sync proxy over the managed backend, plus the offline
//! field client library.

pub mod baas;
pub mod client;
pub mod config;
pub mod local;
pub mod logging;
pub mod routes;

use axum::{
    http::{HeaderValue, Method},
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use thiserror::Error;
use tower_http::{
    compression::CompressionLayer,
    cors::{AllowOrigin, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::TraceLayer,
};

use crate::baas::{supabase::SupabaseBackend, Backend};
use crate::config::{AppConfig, ConfigError};

/// Shared handler state: the backend every request is forwarded to.
#[derive(Clone)]
pub struct AppState {
    pub backend: Arc<dyn Backend>,
}

impl AppState {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
    #[error("server error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configure CORS from the configured origin list.
/// An empty list accepts any origin, as mobile webviews use non-http schemes.
pub fn configure_cors(origins: &[String]) -> CorsLayer {
    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    let allow_origin = if parsed.is_empty() {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(parsed)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            axum::http::header::AUTHORIZATION,
        ])
}

/// Route table without the outer middleware stack.
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(routes::health::health_ping))
        .route("/ping", get(routes::health::ping))
        .route("/db-check", get(routes::health::db_check))
        .route("/auth/me", get(routes::auth::me))
        .route("/sync/login", post(routes::sync::sync_login))
        .route("/sync/nota", post(routes::sync::sync_nota))
        .route(
            "/sync/contacto-proyecto",
            post(routes::sync::sync_contacto_proyecto),
        )
        .with_state(state)
}

/// Create and configure the application router.
pub fn create_app(state: AppState, config: &AppConfig) -> Router {
    let cors = configure_cors(&config.allowed_origins);
    tracing::info!(origins = config.allowed_origins.len(), "CORS configured");

    routes(state)
        .layer(logging::middleware::propagate_request_id_layer())
        .layer(middleware::from_fn(logging::middleware::log_request))
        .layer(logging::middleware::request_id_layer())
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(RequestBodyLimitLayer::new(config.body_limit_bytes))
        .layer(cors)
}

/// Run the proxy (used by main).
pub async fn run() -> Result<(), StartupError> {
    dotenvy::dotenv().ok();

    // Held until return so buffered log lines are flushed.
    let _log_guards = logging::init();

    routes::health::init_start_time();

    let config = AppConfig::from_env().inspect_err(|e| {
        tracing::error!(error = %e, "refusing to start without backend credentials");
    })?;

    let backend = SupabaseBackend::new(&config)?;
    let app = create_app(AppState::new(Arc::new(backend)), &config);

    let addr = config.bind_addr();
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await.inspect_err(|e| {
        tracing::error!(error = %e, addr = %addr, "failed to bind");
    })?;

    axum::serve(listener, app).await?;
    Ok(())
}
