//! fileopsd — the fileops server.
//!
//! [`start`] wires the session registry, the TCP file service and the
//! optional status API together. The binary is a thin wrapper around it;
//! tests call it directly with their own filesystem.

pub mod connection;
pub mod listener;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use fileops_core::config::{FilesConfig, ServerConfig};
use fileops_services::{FileOpsService, FileSystem, LocalFileSystem, SessionRegistry};

use listener::Listener;

/// Closed sessions are remembered this long before pruning.
const TOMBSTONE_TTL: Duration = Duration::from_secs(600);
const PRUNE_INTERVAL: Duration = Duration::from_secs(60);

/// A server running on background tasks.
pub struct RunningServer {
    pub addr: SocketAddr,
    pub api_addr: Option<SocketAddr>,
    pub registry: SessionRegistry,
    shutdown: broadcast::Sender<()>,
    tasks: Vec<JoinHandle<()>>,
}

impl RunningServer {
    pub fn shutdown_sender(&self) -> broadcast::Sender<()> {
        self.shutdown.clone()
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown.send(());
    }

    /// Wait for every server task to finish.
    pub async fn wait(self) {
        for task in self.tasks {
            let _ = task.await;
        }
    }
}

/// The filesystem `files` describes: confined to `root_dir` when set.
pub fn filesystem_for(files: &FilesConfig) -> Result<Arc<dyn FileSystem>> {
    match files.root() {
        Some(root) => {
            let fs = LocalFileSystem::confined(root)
                .with_context(|| format!("root directory {} is not usable", root.display()))?;
            Ok(Arc::new(fs))
        }
        None => Ok(Arc::new(LocalFileSystem::unconfined())),
    }
}

/// Bind the file service (and the status API, if enabled) and start
/// serving.
pub async fn start(config: &ServerConfig, fs: Arc<dyn FileSystem>) -> Result<RunningServer> {
    let (shutdown, _) = broadcast::channel::<()>(1);
    let registry = SessionRegistry::new(fs);
    let service = FileOpsService::new(registry.clone())
        .with_max_block_size(config.files.effective_max_block_size());

    let listener = Listener::bind(&config.network.listen_addr, service.clone(), shutdown.clone()).await?;
    let addr = listener.local_addr()?;

    let mut tasks = Vec::new();
    tasks.push(tokio::spawn(async move {
        if let Err(e) = listener.run().await {
            tracing::error!(error = %e, "file service failed");
        }
    }));

    tasks.push(tokio::spawn(prune_loop(registry.clone(), shutdown.subscribe())));

    let api_addr = if config.network.api_enabled {
        let api_listener = tokio::net::TcpListener::bind(("127.0.0.1", config.network.api_port))
            .await
            .with_context(|| format!("failed to bind API port {}", config.network.api_port))?;
        let api_addr = api_listener.local_addr()?;

        let state = fileops_api::ApiState {
            registry: registry.clone(),
            listen_addr: addr.to_string(),
            root_dir: config.files.root().map(|p| p.to_path_buf()),
            max_block_size: service.max_block_size(),
            started_at: Instant::now(),
            shutdown_tx: shutdown.clone(),
        };
        tasks.push(tokio::spawn(async move {
            if let Err(e) = fileops_api::serve_on(api_listener, state).await {
                tracing::error!(error = %e, "status server failed");
            }
        }));
        Some(api_addr)
    } else {
        None
    };

    tracing::info!(
        %addr,
        api = ?api_addr,
        root = ?config.files.root(),
        max_block_size = service.max_block_size(),
        "fileopsd ready"
    );

    Ok(RunningServer {
        addr,
        api_addr,
        registry,
        shutdown,
        tasks,
    })
}

async fn prune_loop(registry: SessionRegistry, mut shutdown: broadcast::Receiver<()>) {
    let mut interval = tokio::time::interval(PRUNE_INTERVAL);
    loop {
        tokio::select! {
            _ = shutdown.recv() => return,
            _ = interval.tick() => {
                let pruned = registry.prune_closed(TOMBSTONE_TTL);
                if pruned > 0 {
                    tracing::debug!(pruned, "closed sessions pruned");
                }
            }
        }
    }
}
