use std::sync::Arc;
use std::time::Duration;

use axum::{
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use super::{handlers, websocket};
use super::ApiState;

pub fn create_router(state: Arc<ApiState>) -> Router {
    let middleware = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)));

    Router::new()
        .route("/api/quota/consume", post(handlers::consume))
        .route("/api/quota/check", post(handlers::check))
        .route("/api/quota/events", get(websocket::ws_reset_stream))
        .route("/api/quota", get(handlers::usage_report))
        .route("/api/quota/:feature", get(handlers::get_usage))
        .route("/health", get(handlers::health_check))
        .with_state(state)
        .layer(middleware)
}
