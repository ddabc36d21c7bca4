//! HTTP routes for Switchyard
//!
//! This module defines all HTTP endpoints exposed by the gateway.

pub mod health;
pub mod metrics;
pub mod sessions;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::AppState;

/// Create the main application router
pub fn create_router(state: Arc<AppState>) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let session_routes = Router::new()
        .route("/sessions", post(sessions::start_session))
        .route(
            "/sessions/:session_id/continue",
            post(sessions::continue_session),
        )
        .route(
            "/sessions/:session_id/interrupt",
            post(sessions::interrupt_session),
        );

    let public_routes = Router::new()
        .route("/health", get(health::health_check))
        .route("/health/ready", get(health::readiness_check))
        .route("/health/live", get(health::liveness_check))
        .route("/metrics", get(metrics::prometheus_metrics));

    // No compression layer: it would buffer SSE frames.
    Router::new()
        .merge(public_routes)
        .merge(session_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
