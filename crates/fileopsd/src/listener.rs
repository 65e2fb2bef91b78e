//! TCP accept loop.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::sync::broadcast;

use fileops_services::FileOpsService;

use crate::connection::Connection;

pub struct Listener {
    listener: TcpListener,
    service: FileOpsService,
    shutdown: broadcast::Sender<()>,
}

impl Listener {
    pub async fn bind(
        addr: &str,
        service: FileOpsService,
        shutdown: broadcast::Sender<()>,
    ) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind {addr}"))?;
        Ok(Self {
            listener,
            service,
            shutdown,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept until shutdown. Each connection runs on its own task and
    /// receives the same shutdown signal.
    pub async fn run(self) -> Result<()> {
        let mut shutdown_rx = self.shutdown.subscribe();
        tracing::info!(addr = %self.local_addr()?, "file service listening");

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    tracing::info!("listener shutting down");
                    return Ok(());
                }

                accepted = self.listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(a) => a,
                        Err(e) => {
                            tracing::warn!(error = %e, "accept failed");
                            continue;
                        }
                    };
                    if let Err(e) = stream.set_nodelay(true) {
                        tracing::debug!(peer = %peer, error = %e, "set_nodelay failed");
                    }

                    let conn = Connection::new(self.service.clone(), peer, self.shutdown.subscribe());
                    tokio::spawn(async move {
                        // Errors are logged inside run().
                        let _ = conn.run(stream).await;
                    });
                }
            }
        }
    }
}
