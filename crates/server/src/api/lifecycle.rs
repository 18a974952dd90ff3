//! Show-lifecycle handlers: initialize, close, pause, resume.
//!
//! These routes are admin-gated by [`super::middleware::require_admin`].

use axum::{
    extract::{Path, State},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use anteroom_core::{CloseReason, ScopeId};

use super::error::{bad_request, ApiError};
use crate::state::AppState;

/// Request body for closing a scope.
#[derive(Debug, Deserialize)]
pub struct CloseBody {
    pub reason: CloseReason,
}

/// Response for a close, reporting how many store keys were purged.
#[derive(Debug, Serialize)]
pub struct CloseResponse {
    pub success: bool,
    pub purged_keys: u64,
}

/// Response for the other lifecycle operations.
#[derive(Debug, Serialize)]
pub struct LifecycleResponse {
    pub success: bool,
}

fn parse_scope(show_id: &str, sched_id: &str) -> Result<ScopeId, Response> {
    ScopeId::new(show_id, sched_id).map_err(|e| bad_request(e.to_string()))
}

/// Open a scope for queueing, resetting counters and pause state.
pub async fn initialize(
    State(state): State<Arc<AppState>>,
    Path((show_id, sched_id)): Path<(String, String)>,
) -> Result<Json<LifecycleResponse>, Response> {
    let scope = parse_scope(&show_id, &sched_id)?;
    state
        .manager()
        .initialize(&scope)
        .map_err(|e| ApiError(e).into_response())?;
    Ok(Json(LifecycleResponse { success: true }))
}

/// Close a scope: broadcast the close to every connected client, then
/// purge all queue state for the scope.
pub async fn close(
    State(state): State<Arc<AppState>>,
    Path((show_id, sched_id)): Path<(String, String)>,
    Json(body): Json<CloseBody>,
) -> Result<Json<CloseResponse>, Response> {
    let scope = parse_scope(&show_id, &sched_id)?;
    let purged_keys = state
        .manager()
        .close(&scope, body.reason)
        .map_err(|e| ApiError(e).into_response())?;
    Ok(Json(CloseResponse {
        success: true,
        purged_keys,
    }))
}

/// Pause promotions. Waiters keep their places; joins follow the
/// configured paused-join policy.
pub async fn pause(
    State(state): State<Arc<AppState>>,
    Path((show_id, sched_id)): Path<(String, String)>,
) -> Result<Json<LifecycleResponse>, Response> {
    let scope = parse_scope(&show_id, &sched_id)?;
    state
        .manager()
        .pause(&scope)
        .map_err(|e| ApiError(e).into_response())?;
    Ok(Json(LifecycleResponse { success: true }))
}

/// Resume promotions, immediately filling any free slots.
pub async fn resume(
    State(state): State<Arc<AppState>>,
    Path((show_id, sched_id)): Path<(String, String)>,
) -> Result<Json<LifecycleResponse>, Response> {
    let scope = parse_scope(&show_id, &sched_id)?;
    state
        .manager()
        .resume(&scope)
        .map_err(|e| ApiError(e).into_response())?;
    Ok(Json(LifecycleResponse { success: true }))
}
