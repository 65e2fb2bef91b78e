//! One client connection.
//!
//! A reader task decodes inbound frames into a channel; this loop answers
//! them in arrival order. While a stream is in flight the loop checks the
//! channel between blocks for a `Cancel`, and parks any other request
//! until the stream has finished. Once [`PENDING_LIMIT`] requests are
//! parked the rest stay in the channel, and the reader task stalls behind
//! them. Daemon shutdown also ends a stream between blocks.

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;

use tokio::io::{AsyncRead, AsyncWrite, WriteHalf};
use tokio::sync::broadcast::error::TryRecvError as ShutdownTryRecvError;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{broadcast, mpsc};

use fileops_core::codec::{codec_for, Codec};
use fileops_core::wire::{FrameKind, WireError};
use fileops_core::{Chunk, ErrorBody, FileOpsError, Request, Response};
use fileops_services::frame::{self, Frame};
use fileops_services::{ChunkSink, FileOpsService};

/// Frames buffered between the reader task and the request loop.
const INBOUND_QUEUE: usize = 16;

/// Requests parked while a stream is in flight.
const PENDING_LIMIT: usize = 16;

type Inbound = mpsc::Receiver<Result<Frame, WireError>>;

pub struct Connection {
    service: FileOpsService,
    peer: SocketAddr,
    shutdown: broadcast::Receiver<()>,
    /// Sessions this connection opened, released when it ends.
    owned: HashMap<String, u64>,
    /// Requests that arrived during a stream.
    pending: VecDeque<Frame>,
    /// Shutdown was seen mid-stream; stop before the next request.
    closing: bool,
}

impl Connection {
    pub fn new(service: FileOpsService, peer: SocketAddr, shutdown: broadcast::Receiver<()>) -> Self {
        Self {
            service,
            peer,
            shutdown,
            owned: HashMap::new(),
            pending: VecDeque::new(),
            closing: false,
        }
    }

    pub async fn run<S>(mut self, stream: S) -> Result<(), WireError>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        tracing::debug!(peer = %self.peer, "connection accepted");
        let (reader, mut writer) = tokio::io::split(stream);
        let (mut inbound, reader_task) = frame::spawn_reader(reader, INBOUND_QUEUE);

        let result = self.serve(&mut inbound, &mut writer).await;

        reader_task.abort();
        self.release_sessions();
        match &result {
            Ok(()) => tracing::debug!(peer = %self.peer, "connection closed"),
            Err(e) => tracing::warn!(peer = %self.peer, error = %e, "connection dropped"),
        }
        result
    }

    async fn serve<S>(&mut self, inbound: &mut Inbound, writer: &mut WriteHalf<S>) -> Result<(), WireError>
    where
        S: AsyncRead + AsyncWrite + Send,
    {
        loop {
            if self.closing {
                tracing::debug!(peer = %self.peer, "connection shutting down after stream");
                return Ok(());
            }
            let frame = match self.pending.pop_front() {
                Some(frame) => frame,
                None => tokio::select! {
                    _ = self.shutdown.recv() => {
                        tracing::debug!(peer = %self.peer, "connection shutting down");
                        return Ok(());
                    }
                    next = inbound.recv() => match next {
                        Some(Ok(frame)) => frame,
                        Some(Err(e)) => return Err(e),
                        None => return Ok(()),
                    },
                },
            };
            self.handle_frame(frame, inbound, writer).await?;
        }
    }

    async fn handle_frame<S>(
        &mut self,
        frame: Frame,
        inbound: &mut Inbound,
        writer: &mut WriteHalf<S>,
    ) -> Result<(), WireError>
    where
        S: AsyncRead + AsyncWrite + Send,
    {
        let codec = codec_for(frame.codec);
        let request_id = frame.request_id;

        let request = if frame.kind == FrameKind::Request {
            codec.decode_request(&frame.payload)
        } else {
            Err(WireError::Unexpected(format!("{:?} frame from client", frame.kind)))
        };
        let request = match request {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(peer = %self.peer, request_id, error = %e, "undecodable request");
                let body = ErrorBody::from(&FileOpsError::from(e));
                return frame::write_response(writer, codec, request_id, &Response::Error(body)).await;
            }
        };

        tracing::debug!(peer = %self.peer, request_id, op = request.name(), path = request.path(), "request");

        match request {
            Request::Cancel => {
                tracing::debug!(peer = %self.peer, "cancel with no stream in flight");
                Ok(())
            }
            Request::StreamRead {
                path,
                offset,
                size,
                block_size,
            } => {
                let mut sink = WireSink {
                    writer: &mut *writer,
                    inbound,
                    pending: &mut self.pending,
                    shutdown: &mut self.shutdown,
                    codec,
                    request_id,
                    path: &path,
                    peer_gone: false,
                    shutdown_seen: false,
                };
                let result = self
                    .service
                    .stream_read(&path, offset, size, block_size, &mut sink)
                    .await;
                if sink.peer_gone {
                    return Err(WireError::ConnectionClosed);
                }
                if sink.shutdown_seen {
                    tracing::info!(peer = %self.peer, request_id, path = %path, "stream stopped by shutdown");
                    self.closing = true;
                }

                let terminal = match result {
                    Ok(summary) => Response::StreamEnd {
                        blocks: summary.blocks,
                        bytes: summary.bytes,
                    },
                    Err(e) => Response::Error(ErrorBody::from(&e)),
                };
                frame::write_response(writer, codec, request_id, &terminal).await
            }
            request => {
                let response = self.service.handle(&request).await;
                self.track(&request, &response);
                frame::write_response(writer, codec, request_id, &response).await
            }
        }
    }

    fn track(&mut self, request: &Request, response: &Response) {
        match (request, response) {
            (Request::Open { path }, Response::Opened { session_id }) => {
                self.owned.insert(path.clone(), *session_id);
            }
            (Request::Close { path }, Response::Closed) => {
                self.owned.remove(path);
            }
            _ => {}
        }
    }

    fn release_sessions(&mut self) {
        for (path, id) in self.owned.drain() {
            self.service.registry().close_if_current(&path, id);
        }
    }
}

/// Streams chunks straight onto the connection.
struct WireSink<'a, W> {
    writer: &'a mut W,
    inbound: &'a mut Inbound,
    pending: &'a mut VecDeque<Frame>,
    shutdown: &'a mut broadcast::Receiver<()>,
    codec: &'static dyn Codec,
    request_id: u64,
    path: &'a str,
    peer_gone: bool,
    shutdown_seen: bool,
}

impl<W> ChunkSink for WireSink<'_, W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn send(&mut self, chunk: Chunk) -> Result<(), FileOpsError> {
        let offset = chunk.offset;
        frame::write_response(&mut *self.writer, self.codec, self.request_id, &Response::Chunk(chunk))
            .await
            .map_err(|e| {
                self.peer_gone = true;
                FileOpsError::Io {
                    path: self.path.to_string(),
                    offset: Some(offset),
                    message: format!("send failed: {e}"),
                }
            })
    }

    fn cancelled(&mut self) -> bool {
        match self.shutdown.try_recv() {
            Ok(()) | Err(ShutdownTryRecvError::Lagged(_)) => {
                self.shutdown_seen = true;
                return true;
            }
            Err(ShutdownTryRecvError::Empty) | Err(ShutdownTryRecvError::Closed) => {}
        }
        // A Cancel behind a full backlog is only seen once the stream ends.
        while self.pending.len() < PENDING_LIMIT {
            match self.inbound.try_recv() {
                Ok(Ok(frame)) => {
                    if is_cancel(&frame) {
                        return true;
                    }
                    self.pending.push_back(frame);
                }
                Ok(Err(_)) | Err(TryRecvError::Disconnected) => {
                    self.peer_gone = true;
                    return true;
                }
                Err(TryRecvError::Empty) => return false,
            }
        }
        false
    }
}

fn is_cancel(frame: &Frame) -> bool {
    frame.kind == FrameKind::Request
        && matches!(
            codec_for(frame.codec).decode_request(&frame.payload),
            Ok(Request::Cancel)
        )
}
