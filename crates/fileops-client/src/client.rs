//! Connection to a fileops server.
//!
//! Frames are read by a background task into a channel, so waiting for a
//! response can be raced against cancellation without losing bytes. A
//! request abandoned that way still gets its response from the server;
//! responses for ids nobody is waiting on are discarded.

use bytes::Bytes;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use fileops_core::codec::{codec_for, Codec};
use fileops_core::partition::ReadRange;
use fileops_core::wire::{CodecId, FrameKind, WireError};
use fileops_core::{Chunk, FileOpsError, Request, Response};
use fileops_services::frame::{self, Frame};

const INBOUND_QUEUE: usize = 32;

pub struct FileOpsClient {
    addr: String,
    codec: &'static dyn Codec,
    writer: OwnedWriteHalf,
    inbound: mpsc::Receiver<Result<Frame, WireError>>,
    reader_task: JoinHandle<()>,
    next_id: u64,
    cancel: CancellationToken,
}

impl FileOpsClient {
    pub async fn connect(addr: &str, codec: CodecId) -> Result<Self, FileOpsError> {
        let stream = TcpStream::connect(addr).await.map_err(|e| FileOpsError::Io {
            path: addr.to_string(),
            offset: None,
            message: format!("connect failed: {e}"),
        })?;
        let _ = stream.set_nodelay(true);
        let (reader, writer) = stream.into_split();
        let (inbound, reader_task) = frame::spawn_reader(reader, INBOUND_QUEUE);

        tracing::debug!(addr, %codec, "connected");
        Ok(Self {
            addr: addr.to_string(),
            codec: codec_for(codec),
            writer,
            inbound,
            reader_task,
            next_id: 1,
            cancel: CancellationToken::new(),
        })
    }

    /// Cancelling `token` aborts whatever call is waiting and every later
    /// one, except [`close`](Self::close).
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn codec(&self) -> CodecId {
        self.codec.id()
    }

    // ── Operations ───────────────────────────────────────────────────────────

    /// Open a session for `path`.
    ///
    /// The token is only checked before the request is sent. Once the
    /// server may have registered the session the reply is awaited, so the
    /// caller always learns the id and can close it.
    pub async fn open(&mut self, path: &str) -> Result<u64, FileOpsError> {
        if self.cancel.is_cancelled() {
            return Err(FileOpsError::Cancelled);
        }
        let req = Request::Open {
            path: path.to_string(),
        };
        match self.call(&req, false).await? {
            Response::Opened { session_id } => Ok(session_id),
            other => Err(unexpected("open", &other)),
        }
    }

    /// Release the session for `path`. Runs even after cancellation, so a
    /// cancelled transfer can still clean up.
    pub async fn close(&mut self, path: &str) -> Result<(), FileOpsError> {
        let req = Request::Close {
            path: path.to_string(),
        };
        match self.call(&req, false).await? {
            Response::Closed => Ok(()),
            other => Err(unexpected("close", &other)),
        }
    }

    pub async fn size(&mut self, path: &str) -> Result<u64, FileOpsError> {
        let req = Request::Size {
            path: path.to_string(),
        };
        match self.call(&req, true).await? {
            Response::Size { size } => Ok(size),
            other => Err(unexpected("size", &other)),
        }
    }

    pub async fn read_block(&mut self, path: &str, offset: u64, length: u64) -> Result<Bytes, FileOpsError> {
        let req = Request::ReadBlock {
            path: path.to_string(),
            offset,
            length,
        };
        match self.call(&req, true).await? {
            Response::Block { data } => Ok(data),
            other => Err(unexpected("read_block", &other)),
        }
    }

    /// Ask the server to push every block of `range`.
    pub async fn stream_read(&mut self, path: &str, range: &ReadRange) -> Result<ChunkStream<'_>, FileOpsError> {
        if self.cancel.is_cancelled() {
            return Err(FileOpsError::Cancelled);
        }
        let req = Request::StreamRead {
            path: path.to_string(),
            offset: range.offset,
            size: range.size,
            block_size: range.block_size,
        };
        let request_id = self.send(&req).await?;
        Ok(ChunkStream {
            client: self,
            request_id,
            done: false,
        })
    }

    // ── Plumbing ─────────────────────────────────────────────────────────────

    async fn call(&mut self, req: &Request, cancellable: bool) -> Result<Response, FileOpsError> {
        if cancellable && self.cancel.is_cancelled() {
            return Err(FileOpsError::Cancelled);
        }
        let id = self.send(req).await?;
        let resp = if cancellable {
            let cancel = self.cancel.clone();
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(FileOpsError::Cancelled),
                r = self.recv(id) => r?,
            }
        } else {
            self.recv(id).await?
        };
        match resp {
            Response::Error(body) => Err(body.into()),
            other => Ok(other),
        }
    }

    async fn send(&mut self, req: &Request) -> Result<u64, FileOpsError> {
        let id = self.next_id;
        self.next_id += 1;
        frame::write_request(&mut self.writer, self.codec, id, req)
            .await
            .map_err(|e| self.transport_error(e))?;
        Ok(id)
    }

    /// Next response for `request_id`. Cancel-safe.
    async fn recv(&mut self, request_id: u64) -> Result<Response, FileOpsError> {
        loop {
            let frame = match self.inbound.recv().await {
                Some(Ok(frame)) => frame,
                Some(Err(e)) => return Err(self.transport_error(e)),
                None => return Err(self.transport_error(WireError::ConnectionClosed)),
            };
            if frame.kind != FrameKind::Response {
                return Err(FileOpsError::protocol(format!("{:?} frame from server", frame.kind)));
            }
            if frame.request_id != request_id {
                tracing::trace!(stale = frame.request_id, waiting = request_id, "discarding stale response");
                continue;
            }
            return Ok(codec_for(frame.codec).decode_response(&frame.payload)?);
        }
    }

    fn transport_error(&self, e: WireError) -> FileOpsError {
        match e {
            WireError::ConnectionClosed | WireError::Io(_) => FileOpsError::Io {
                path: self.addr.clone(),
                offset: None,
                message: e.to_string(),
            },
            other => other.into(),
        }
    }
}

impl Drop for FileOpsClient {
    fn drop(&mut self) {
        self.reader_task.abort();
    }
}

fn unexpected(op: &str, resp: &Response) -> FileOpsError {
    FileOpsError::protocol(format!("unexpected reply to {op}: {resp:?}"))
}

/// The chunks of one streamed read, in the order the server sent them.
///
/// Holds the client until the stream has ended, failed or been cancelled.
pub struct ChunkStream<'a> {
    client: &'a mut FileOpsClient,
    request_id: u64,
    done: bool,
}

impl ChunkStream<'_> {
    /// Next chunk; `None` once the server has ended the stream.
    ///
    /// When the client's token fires this yields `Cancelled` but leaves the
    /// stream open; call [`cancel`](Self::cancel) to stop the server.
    pub async fn next(&mut self) -> Option<Result<Chunk, FileOpsError>> {
        if self.done {
            return None;
        }
        let cancel = self.client.cancel.clone();
        let resp = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Some(Err(FileOpsError::Cancelled)),
            r = self.client.recv(self.request_id) => r,
        };
        match resp {
            Ok(Response::Chunk(chunk)) => Some(Ok(chunk)),
            Ok(Response::StreamEnd { .. }) => {
                self.done = true;
                None
            }
            Ok(Response::Error(body)) => {
                self.done = true;
                Some(Err(body.into()))
            }
            Ok(other) => {
                self.done = true;
                Some(Err(unexpected("stream_read", &other)))
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Tell the server to stop and wait for the stream's final frame.
    ///
    /// Chunks already in flight are discarded. Returns once the connection
    /// is ready for the next request.
    pub async fn cancel(&mut self) -> Result<(), FileOpsError> {
        if self.done {
            return Ok(());
        }
        self.client.send(&Request::Cancel).await?;
        loop {
            let resp = self.client.recv(self.request_id).await;
            match resp {
                Ok(r) if !r.is_terminal() => continue,
                Ok(_) => break,
                Err(e) => {
                    self.done = true;
                    return Err(e);
                }
            }
        }
        self.done = true;
        tracing::debug!(request_id = self.request_id, "stream cancelled");
        Ok(())
    }
}
