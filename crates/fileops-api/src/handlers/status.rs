//! /status and /daemon/shutdown handlers.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use fileops_core::wire::WIRE_VERSION;
use fileops_services::SessionStatus;

use super::ApiState;

// ── /status ──────────────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct StatusResponse {
    pub listen_addr: String,
    pub root_dir: Option<String>,
    pub max_block_size: u64,
    pub wire_version: u8,
    pub codecs: Vec<&'static str>,
    pub uptime_secs: u64,
    pub sessions_open: usize,
    pub sessions_closed: usize,
    pub sessions_tracked: usize,
    pub blocks_served: u64,
    pub bytes_served: u64,
}

pub async fn handle_status(State(state): State<ApiState>) -> Json<StatusResponse> {
    let sessions = state.registry.snapshot();

    Json(StatusResponse {
        listen_addr: state.listen_addr.clone(),
        root_dir: state
            .root_dir
            .as_ref()
            .map(|p| p.to_string_lossy().into_owned()),
        max_block_size: state.max_block_size,
        wire_version: WIRE_VERSION,
        codecs: fileops_core::wire::CodecId::ALL
            .iter()
            .map(|c| c.name())
            .collect(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        sessions_open: sessions.iter().filter(|s| s.status == SessionStatus::Open).count(),
        sessions_closed: sessions.iter().filter(|s| s.status == SessionStatus::Closed).count(),
        sessions_tracked: sessions.len(),
        blocks_served: sessions.iter().map(|s| s.blocks_served).sum(),
        bytes_served: sessions.iter().map(|s| s.bytes_served).sum(),
    })
}

// ── /daemon/shutdown ─────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct ShutdownResponse {
    pub message: String,
}

pub async fn handle_shutdown(State(state): State<ApiState>) -> Json<ShutdownResponse> {
    tracing::info!("shutdown requested via API");
    let _ = state.shutdown_tx.send(());

    Json(ShutdownResponse {
        message: "Shutdown initiated".to_string(),
    })
}
