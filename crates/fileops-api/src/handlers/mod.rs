//! HTTP API handlers — exposes daemon state as JSON.

pub mod sessions;
pub mod status;

use std::path::PathBuf;
use std::time::Instant;

use fileops_services::SessionRegistry;

#[derive(Clone)]
pub struct ApiState {
    pub registry: SessionRegistry,
    /// Address the file service is bound to.
    pub listen_addr: String,
    /// Directory requested paths are confined to, if any.
    pub root_dir: Option<PathBuf>,
    pub max_block_size: u64,
    pub started_at: Instant,
    /// Shutdown broadcast sender, signals graceful daemon shutdown.
    pub shutdown_tx: tokio::sync::broadcast::Sender<()>,
}

pub use sessions::{handle_session_close, handle_sessions};
pub use status::{handle_shutdown, handle_status};
