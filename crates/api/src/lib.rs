//! HTTP surface for the purchase saga.
//!
//! Provides REST endpoints for the product catalog, purchase submission and
//! status polling, with structured logging (tracing) and Prometheus metrics.

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;
pub mod state;

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use auth::{AuthenticatedUser, StaticTokenVerifier, TokenClaims, TokenVerifier};
pub use config::{Config, ConfigError, LogFormat};
pub use error::ApiError;
pub use state::{AppState, Services};

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::ops::metrics))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::ops::health))
        .route(
            "/products",
            get(routes::products::list).post(routes::products::create),
        )
        .route("/products/{id}", get(routes::products::get))
        .route(
            "/purchases",
            get(routes::purchases::list).post(routes::purchases::create),
        )
        .route("/purchases/{id}", get(routes::purchases::get))
        .route("/dead-letters", get(routes::dead_letters::list))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
