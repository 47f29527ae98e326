//! REST API server module
//!
//! Thin routing layer over [`CatalogMirror`]: every handler calls one
//! control operation and serializes its result.

use crate::{CatalogMirror, Config, Result};
use axum::{
    Router,
    http::HeaderValue,
    routing::{get, post},
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub mod error_response;
pub mod openapi;
pub mod routes;
pub mod state;

pub use openapi::ApiDoc;
pub use state::AppState;

/// Create the API router with all route definitions
///
/// # Routes
///
/// ## Mirror
/// - `GET /watch` - Check whether the remote index changed
/// - `POST /crawl/run` - Run every stage
/// - `POST /crawl/item/:kind/:id` - Materialize one item
/// - `GET /verify` - Local store verification report
///
/// ## Monitor
/// - `GET /monitor/status` - Poll loop status
/// - `POST /monitor/start` - Start the poll loop
/// - `POST /monitor/stop` - Stop the poll loop
/// - `POST /monitor/interval` - Change the poll interval
///
/// ## System
/// - `GET /health` - Health check
/// - `GET /openapi.json` - OpenAPI specification
/// - `GET /swagger-ui` - Interactive Swagger UI documentation (if enabled)
/// - `GET /events` - Server-sent events stream
///
/// Every mirror route accepts `?offline=true` to use the replay source.
pub fn create_router(mirror: Arc<CatalogMirror>, config: Arc<Config>) -> Router {
    let state = AppState::new(mirror, config.clone());

    let router = Router::new()
        // Mirror
        .route("/watch", get(routes::watch))
        .route("/crawl/run", post(routes::crawl_run))
        .route("/crawl/item/:kind/:id", post(routes::crawl_item))
        .route("/verify", get(routes::verify))
        // Monitor
        .route("/monitor/status", get(routes::monitor_status))
        .route("/monitor/start", post(routes::monitor_start))
        .route("/monitor/stop", post(routes::monitor_stop))
        .route("/monitor/interval", post(routes::monitor_interval))
        // System
        .route("/health", get(routes::health_check))
        .route("/openapi.json", get(routes::openapi_spec))
        .route("/events", get(routes::event_stream));

    let router = if config.server.api.swagger_ui {
        router.merge(SwaggerUi::new("/swagger-ui").url("/api/v1/openapi.json", ApiDoc::openapi()))
    } else {
        router
    };

    let router = router.with_state(state).layer(TraceLayer::new_for_http());

    if config.server.api.cors_enabled {
        let cors = build_cors_layer(&config.server.api.cors_origins);
        router.layer(cors)
    } else {
        router
    }
}

/// Build a CORS layer based on configured origins
///
/// `"*"` or an empty list allows any origin.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let allow_any = origins.iter().any(|o| o == "*");

    if allow_any || origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let allowed: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(AllowOrigin::list(allowed))
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

/// Start the API server on the configured bind address.
///
/// Runs until the server stops or fails.
///
/// # Example
///
/// ```no_run
/// use catalog_mirror::{CatalogMirror, Config};
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = Arc::new(Config::default());
/// let mirror = Arc::new(CatalogMirror::new((*config).clone()).await?);
///
/// // Start API server (blocks until shutdown)
/// catalog_mirror::api::start_api_server(mirror, config).await?;
/// # Ok(())
/// # }
/// ```
pub async fn start_api_server(mirror: Arc<CatalogMirror>, config: Arc<Config>) -> Result<()> {
    let bind_address = config.server.api.bind_address;

    tracing::info!(
        address = %bind_address,
        "Starting API server"
    );

    let app = create_router(mirror, config);

    let listener = TcpListener::bind(bind_address)
        .await
        .map_err(crate::error::Error::Io)?;

    tracing::info!(
        address = %bind_address,
        "API server listening"
    );

    axum::serve(listener, app)
        .await
        .map_err(|e| crate::error::Error::ApiServerError(e.to_string()))?;

    tracing::info!("API server stopped");
    Ok(())
}
