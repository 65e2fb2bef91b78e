//! /sessions handlers — session inspection and management.

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use fileops_services::SessionInfo;

use super::ApiState;

// ── /sessions (GET) ──────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct SessionsResponse {
    pub sessions: Vec<SessionInfo>,
}

pub async fn handle_sessions(State(state): State<ApiState>) -> Json<SessionsResponse> {
    Json(SessionsResponse {
        sessions: state.registry.snapshot(),
    })
}

// ── /sessions?path= (DELETE) ─────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct SessionQuery {
    pub path: String,
}

#[derive(Serialize)]
pub struct SessionCloseResponse {
    pub path: String,
    pub closed: bool,
}

pub async fn handle_session_close(
    State(state): State<ApiState>,
    Query(query): Query<SessionQuery>,
) -> Json<SessionCloseResponse> {
    let closed = state.registry.close(&query.path).is_some();
    if closed {
        tracing::info!(path = %query.path, "session closed via API");
    }
    Json(SessionCloseResponse {
        path: query.path,
        closed,
    })
}
