//! Daemon status, sessions, and shutdown commands.

use anyhow::Result;
use serde::Deserialize;

use super::http::{base_url, delete_json, get_json, post_json};

// ── Response types ────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct StatusResponse {
    listen_addr: String,
    root_dir: Option<String>,
    max_block_size: u64,
    wire_version: u8,
    codecs: Vec<String>,
    uptime_secs: u64,
    sessions_open: usize,
    sessions_closed: usize,
    sessions_tracked: usize,
    blocks_served: u64,
    bytes_served: u64,
}

#[derive(Deserialize)]
struct SessionsResponse {
    sessions: Vec<SessionInfo>,
}

#[derive(Deserialize)]
struct SessionInfo {
    path: String,
    session_id: u64,
    status: String,
    age_secs: u64,
    closed_secs: Option<u64>,
    blocks_served: u64,
    bytes_served: u64,
}

#[derive(Deserialize)]
struct SessionCloseResponse {
    path: String,
    closed: bool,
}

#[derive(Deserialize)]
struct ShutdownResponse {
    message: String,
}

// ── Commands ──────────────────────────────────────────────────────────────────

pub async fn cmd_status(port: u16) -> Result<()> {
    let resp: StatusResponse = get_json(&format!("{}/status", base_url(port))).await?;

    println!("═══════════════════════════════════════");
    println!("  fileopsd Status");
    println!("═══════════════════════════════════════");
    println!("  Listening        : {}", resp.listen_addr);
    println!("  Root directory   : {}", resp.root_dir.as_deref().unwrap_or("(unconfined)"));
    println!("  Max block size   : {} bytes", resp.max_block_size);
    println!("  Wire version     : {}", resp.wire_version);
    println!("  Codecs           : {}", resp.codecs.join(", "));
    println!("  Uptime           : {}s", resp.uptime_secs);
    println!("  Open sessions    : {}", resp.sessions_open);
    println!("  Closed sessions  : {}", resp.sessions_closed);
    println!("  Tracked sessions : {}", resp.sessions_tracked);
    println!("  Blocks served    : {}", resp.blocks_served);
    println!("  Bytes served     : {}", resp.bytes_served);

    Ok(())
}

pub async fn cmd_sessions(port: u16) -> Result<()> {
    let resp: SessionsResponse = get_json(&format!("{}/sessions", base_url(port))).await?;

    if resp.sessions.is_empty() {
        println!("No sessions.");
        return Ok(());
    }

    println!("═══════════════════════════════════════");
    println!("  Sessions ({})", resp.sessions.len());
    println!("═══════════════════════════════════════");

    for s in &resp.sessions {
        println!("  ┌─ {}", s.path);
        println!("  │  id     : {}", s.session_id);
        match s.closed_secs {
            Some(ago) => println!("  │  state  : {} ({}s ago)", s.status, ago),
            None => println!("  │  state  : {}", s.status),
        }
        println!("  │  blocks : {}", s.blocks_served);
        println!("  │  bytes  : {}", s.bytes_served);
        println!("  └─ age    : {}s", s.age_secs);
    }

    Ok(())
}

pub async fn cmd_close_session(port: u16, path: &str) -> Result<()> {
    let resp: SessionCloseResponse =
        delete_json(&format!("{}/sessions", base_url(port)), &[("path", path)]).await?;
    if resp.closed {
        println!("Closed session for {}", resp.path);
    } else {
        println!("No open session for {}", resp.path);
    }
    Ok(())
}

pub async fn cmd_shutdown(port: u16) -> Result<()> {
    let resp: ShutdownResponse = post_json(&format!("{}/daemon/shutdown", base_url(port))).await?;
    println!("{}", resp.message);
    Ok(())
}
