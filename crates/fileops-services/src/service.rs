//! Request handling — what the server does for each protocol request,
//! independent of the transport that carried it.

use std::future::Future;

use fileops_core::partition::ReadRange;
use fileops_core::wire::MAX_BLOCK_SIZE;
use fileops_core::{Chunk, ErrorBody, FileOpsError, Request, Response};

use crate::registry::SessionRegistry;

/// Where a streamed read delivers its blocks.
pub trait ChunkSink: Send {
    /// Deliver one chunk. Resolves once the transport has accepted it, so
    /// a slow receiver holds back the next disk read.
    fn send(&mut self, chunk: Chunk) -> impl Future<Output = Result<(), FileOpsError>> + Send;

    /// Polled before each block is read. Returning true ends the stream
    /// with [`FileOpsError::Cancelled`].
    fn cancelled(&mut self) -> bool {
        false
    }
}

/// Totals for a stream that ran to completion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamSummary {
    pub blocks: u64,
    pub bytes: u64,
}

#[derive(Debug, Clone)]
pub struct FileOpsService {
    registry: SessionRegistry,
    max_block_size: u64,
}

impl FileOpsService {
    pub fn new(registry: SessionRegistry) -> Self {
        Self {
            registry,
            max_block_size: MAX_BLOCK_SIZE,
        }
    }

    pub fn with_max_block_size(mut self, max: u64) -> Self {
        self.max_block_size = max.clamp(1, MAX_BLOCK_SIZE);
        self
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn max_block_size(&self) -> u64 {
        self.max_block_size
    }

    /// Answer a single-response request. Failures become `Response::Error`.
    ///
    /// `StreamRead` and `Cancel` need a transport-side loop and are
    /// rejected here.
    pub async fn handle(&self, request: &Request) -> Response {
        match self.dispatch(request).await {
            Ok(resp) => resp,
            Err(e) => {
                tracing::debug!(op = request.name(), error = %e, "request failed");
                Response::Error(ErrorBody::from(&e))
            }
        }
    }

    async fn dispatch(&self, request: &Request) -> Result<Response, FileOpsError> {
        match request {
            Request::Open { path } => {
                let owned = path.clone();
                let session_id = self.on_blocking_pool("open", path, move |r| r.open(&owned)).await?;
                Ok(Response::Opened { session_id })
            }
            Request::Close { path } => {
                self.registry.close(path);
                Ok(Response::Closed)
            }
            Request::Size { path } => {
                let owned = path.clone();
                let size = self.on_blocking_pool("size", path, move |r| r.size(&owned)).await?;
                Ok(Response::Size { size })
            }
            Request::ReadBlock {
                path,
                offset,
                length,
            } => {
                self.check_block_size(*length)?;
                if offset.checked_add(*length).is_none() {
                    return Err(FileOpsError::protocol(format!(
                        "block {offset}+{length} overflows the file offset space"
                    )));
                }
                let data = self.registry.read(path, *offset, *length).await?;
                Ok(Response::Block { data })
            }
            Request::StreamRead { .. } | Request::Cancel => Err(FileOpsError::protocol(format!(
                "{} is not a single-response request",
                request.name()
            ))),
        }
    }

    /// Read `[offset, offset + size)` of `path` in `block_size` blocks and
    /// push each one to `sink`, in offset order.
    ///
    /// Every block is read and delivered before the next read starts. The
    /// first failure ends the stream; chunks already delivered stay
    /// delivered.
    pub async fn stream_read<S: ChunkSink>(
        &self,
        path: &str,
        offset: u64,
        size: u64,
        block_size: u64,
        sink: &mut S,
    ) -> Result<StreamSummary, FileOpsError> {
        self.check_block_size(block_size)?;
        let range = ReadRange::new(offset, size, block_size)?;
        self.registry.handle(path)?;

        tracing::debug!(path, offset, size, block_size, blocks = range.block_count(), "stream started");

        let mut summary = StreamSummary::default();
        for block in range.blocks() {
            if sink.cancelled() {
                tracing::info!(path, at = block.offset, sent = summary.blocks, "stream cancelled");
                return Err(FileOpsError::Cancelled);
            }
            // Looked up per block, so a close from elsewhere stops the stream.
            let data = self.registry.read(path, block.offset, block.length).await?;

            let len = data.len() as u64;
            sink.send(Chunk {
                offset: block.offset,
                data,
            })
            .await?;
            summary.blocks += 1;
            summary.bytes += len;
        }

        tracing::debug!(path, blocks = summary.blocks, bytes = summary.bytes, "stream complete");
        Ok(summary)
    }

    /// Run a registry call that touches the filesystem off the async
    /// workers. Opening and stat-ing can stall like any read.
    async fn on_blocking_pool<T, F>(&self, op: &'static str, path: &str, f: F) -> Result<T, FileOpsError>
    where
        T: Send + 'static,
        F: FnOnce(SessionRegistry) -> Result<T, FileOpsError> + Send + 'static,
    {
        let registry = self.registry.clone();
        tokio::task::spawn_blocking(move || f(registry))
            .await
            .map_err(|e| FileOpsError::Io {
                path: path.to_string(),
                offset: None,
                message: format!("{op} task failed: {e}"),
            })?
    }

    fn check_block_size(&self, block_size: u64) -> Result<(), FileOpsError> {
        if block_size == 0 {
            return Err(FileOpsError::protocol("block size must be positive"));
        }
        if block_size > self.max_block_size {
            return Err(FileOpsError::protocol(format!(
                "block size {block_size} exceeds server maximum {}",
                self.max_block_size
            )));
        }
        Ok(())
    }
}
