use axum::{
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use super::middleware::{auth_middleware, metrics_middleware, require_admin};
use super::{handlers, lifecycle, queue, ws};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // Admin-only lifecycle routes
    let lifecycle_routes = Router::new()
        .route(
            "/queues/{show_id}/{sched_id}/initialize",
            post(lifecycle::initialize),
        )
        .route("/queues/{show_id}/{sched_id}/close", post(lifecycle::close))
        .route("/queues/{show_id}/{sched_id}/pause", post(lifecycle::pause))
        .route(
            "/queues/{show_id}/{sched_id}/resume",
            post(lifecycle::resume),
        )
        .layer(from_fn(require_admin));

    // API routes
    let api_routes = Router::new()
        // Health and config
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::get_config))
        .route("/metrics", get(handlers::metrics))
        // Queue operations
        .route("/queues/{show_id}/{sched_id}/join", post(queue::join))
        .route("/queues/{show_id}/{sched_id}/status", get(queue::status))
        .route(
            "/queues/{show_id}/{sched_id}/validate",
            post(queue::validate),
        )
        .route(
            "/queues/{show_id}/{sched_id}/complete",
            post(queue::complete),
        )
        .route("/queues/{show_id}/{sched_id}/leave", post(queue::leave))
        // Real-time updates
        .route("/queues/{show_id}/{sched_id}/ws", get(ws::ws_handler))
        .merge(lifecycle_routes)
        .layer(from_fn_with_state(state.clone(), auth_middleware))
        .with_state(state);

    Router::new()
        .nest("/api/v1", api_routes)
        .layer(from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
