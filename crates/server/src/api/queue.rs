//! Queue API handlers: join, status, validate, complete, leave.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use anteroom_core::{ActiveSession, JoinOutcome, QueueError, QueueStatus, ScopeId};

use super::error::{bad_request, ApiError};
use super::middleware::Owner;
use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Query parameters for a status poll.
#[derive(Debug, Deserialize)]
pub struct StatusParams {
    /// Poll a specific ticket; omitted, the caller's own ticket is looked up.
    pub ticket_id: Option<String>,
}

/// Request body for validating an active session.
#[derive(Debug, Deserialize)]
pub struct ValidateBody {
    pub ticket_id: String,
    pub active_token: String,
}

/// Response for session validation.
#[derive(Debug, Serialize)]
pub struct ValidateResponse {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<ActiveSession>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'static str>,
}

/// Request body for completing an active session.
#[derive(Debug, Deserialize)]
pub struct CompleteBody {
    pub ticket_id: String,
    pub active_token: String,
}

/// Request body for leaving the queue.
///
/// The token is required only when the ticket is active; a waiting
/// ticket can be abandoned with just its id.
#[derive(Debug, Deserialize)]
pub struct LeaveBody {
    pub ticket_id: String,
    #[serde(default)]
    pub active_token: Option<String>,
}

/// Response for complete/leave operations.
#[derive(Debug, Serialize)]
pub struct AckResponse {
    pub success: bool,
}

/// Conflict body for a duplicate join, carrying the ticket the owner
/// already holds so the client can show it instead.
#[derive(Debug, Serialize)]
pub struct AlreadyJoinedResponse {
    pub error: String,
    pub code: &'static str,
    pub current: QueueStatus,
}

// ============================================================================
// Handlers
// ============================================================================

fn parse_scope(show_id: &str, sched_id: &str) -> Result<ScopeId, Response> {
    ScopeId::new(show_id, sched_id).map_err(|e| bad_request(e.to_string()))
}

/// Join the waiting queue for a performance.
///
/// One ticket per owner per scope; the owner comes from the resolved
/// identity (API key subject or `X-Guest-Id`).
pub async fn join(
    State(state): State<Arc<AppState>>,
    Path((show_id, sched_id)): Path<(String, String)>,
    Owner(owner_id): Owner,
) -> Result<(StatusCode, Json<JoinOutcome>), Response> {
    let scope = parse_scope(&show_id, &sched_id)?;

    if owner_id == "anonymous" {
        return Err(bad_request(
            "joining requires an identity: authenticate or send X-Guest-Id",
        ));
    }

    match state.manager().join(&scope, &owner_id) {
        Ok(outcome) => Ok((StatusCode::CREATED, Json(outcome))),
        // Recoverable: hand back the ticket the owner already holds.
        Err(err @ QueueError::AlreadyJoined(_)) => {
            let current = state
                .manager()
                .status_for_owner(&scope, &owner_id)
                .map_err(|e| ApiError(e).into_response())?;
            Err((
                StatusCode::CONFLICT,
                Json(AlreadyJoinedResponse {
                    error: err.to_string(),
                    code: "already_joined",
                    current,
                }),
            )
                .into_response())
        }
        Err(e) => Err(ApiError(e).into_response()),
    }
}

/// Poll queue position or session state.
pub async fn status(
    State(state): State<Arc<AppState>>,
    Path((show_id, sched_id)): Path<(String, String)>,
    Query(params): Query<StatusParams>,
    Owner(owner_id): Owner,
) -> Result<Json<QueueStatus>, Response> {
    let scope = parse_scope(&show_id, &sched_id)?;

    let status = match params.ticket_id {
        Some(ticket_id) => state.manager().status(&scope, &ticket_id),
        None => {
            if owner_id == "anonymous" {
                return Err(bad_request(
                    "status poll requires ticket_id or an identity",
                ));
            }
            state.manager().status_for_owner(&scope, &owner_id)
        }
    }
    .map_err(|e| ApiError(e).into_response())?;

    Ok(Json(status))
}

/// Validate an active session token.
///
/// Meant for the fulfillment service: a bad or stale token yields a
/// 200 with `valid: false` rather than an error, so the caller can
/// distinguish "denied" from "queue engine down".
pub async fn validate(
    State(state): State<Arc<AppState>>,
    Path((show_id, sched_id)): Path<(String, String)>,
    Json(body): Json<ValidateBody>,
) -> Result<Json<ValidateResponse>, Response> {
    let scope = parse_scope(&show_id, &sched_id)?;

    match state
        .manager()
        .validate_active(&scope, &body.ticket_id, &body.active_token)
    {
        Ok(session) => Ok(Json(ValidateResponse {
            valid: true,
            session: Some(session),
            reason: None,
        })),
        Err(QueueError::InvalidToken) => Ok(Json(ValidateResponse {
            valid: false,
            session: None,
            reason: Some("invalid_token"),
        })),
        Err(QueueError::NotActive) => Ok(Json(ValidateResponse {
            valid: false,
            session: None,
            reason: Some("not_active"),
        })),
        Err(QueueError::NotFound(_)) => Ok(Json(ValidateResponse {
            valid: false,
            session: None,
            reason: Some("not_found"),
        })),
        Err(e) => Err(ApiError(e).into_response()),
    }
}

/// Complete an active session, freeing the slot for the next waiter.
pub async fn complete(
    State(state): State<Arc<AppState>>,
    Path((show_id, sched_id)): Path<(String, String)>,
    Json(body): Json<CompleteBody>,
) -> Result<Json<AckResponse>, Response> {
    let scope = parse_scope(&show_id, &sched_id)?;

    state
        .manager()
        .complete(&scope, &body.ticket_id, &body.active_token)
        .map_err(|e| ApiError(e).into_response())?;

    Ok(Json(AckResponse { success: true }))
}

/// Leave the queue, waiting or active. Idempotent: leaving a ticket
/// that is already gone succeeds.
pub async fn leave(
    State(state): State<Arc<AppState>>,
    Path((show_id, sched_id)): Path<(String, String)>,
    Json(body): Json<LeaveBody>,
) -> Result<Json<AckResponse>, Response> {
    let scope = parse_scope(&show_id, &sched_id)?;

    state
        .manager()
        .terminate(&scope, &body.ticket_id, body.active_token.as_deref())
        .map_err(|e| ApiError(e).into_response())?;

    Ok(Json(AckResponse { success: true }))
}
