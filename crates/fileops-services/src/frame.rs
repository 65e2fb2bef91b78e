//! Frame I/O over any async byte stream.
//!
//! A frame is a [`FrameHeader`] followed by `length` payload bytes. The
//! header is validated before the payload is read, and the payload is
//! hash-checked before it is handed to a codec.

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use zerocopy::{AsBytes, FromBytes};

use fileops_core::codec::Codec;
use fileops_core::wire::{
    CodecId, FrameHeader, FrameKind, WireError, FLAG_FINAL, FRAME_HEADER_SIZE, MAX_FRAME_PAYLOAD,
};
use fileops_core::{Request, Response};

/// A received, verified frame.
#[derive(Debug, Clone)]
pub struct Frame {
    pub request_id: u64,
    pub kind: FrameKind,
    pub codec: CodecId,
    pub is_final: bool,
    pub payload: Bytes,
}

/// Read one frame. `Ok(None)` means the peer closed the stream cleanly
/// between frames.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Frame>, WireError>
where
    R: AsyncRead + Unpin,
{
    let mut head = [0u8; FRAME_HEADER_SIZE];
    let mut filled = 0;
    while filled < FRAME_HEADER_SIZE {
        let n = reader.read(&mut head[filled..]).await?;
        if n == 0 {
            return if filled == 0 {
                Ok(None)
            } else {
                Err(WireError::ConnectionClosed)
            };
        }
        filled += n;
    }

    let header = FrameHeader::read_from(&head[..])
        .ok_or_else(|| WireError::Malformed("short frame header".into()))?;
    let (kind, codec) = header.validate()?;

    let mut payload = BytesMut::zeroed(header.payload_len());
    reader.read_exact(&mut payload).await?;
    header.verify(&payload)?;

    Ok(Some(Frame {
        request_id: header.request_id(),
        kind,
        codec,
        is_final: header.is_final(),
        payload: payload.freeze(),
    }))
}

/// Write one frame and flush it.
pub async fn write_frame<W>(
    writer: &mut W,
    request_id: u64,
    kind: FrameKind,
    codec: CodecId,
    flags: u8,
    payload: &[u8],
) -> Result<(), WireError>
where
    W: AsyncWrite + Unpin,
{
    if payload.len() > MAX_FRAME_PAYLOAD {
        return Err(WireError::PayloadTooLarge(payload.len()));
    }
    let header = FrameHeader::new(request_id, kind, codec, flags, payload);

    let mut buf = BytesMut::with_capacity(FRAME_HEADER_SIZE + payload.len());
    buf.extend_from_slice(header.as_bytes());
    buf.extend_from_slice(payload);
    writer.write_all(&buf).await?;
    writer.flush().await?;
    Ok(())
}

pub async fn write_request<W>(
    writer: &mut W,
    codec: &dyn Codec,
    request_id: u64,
    request: &Request,
) -> Result<(), WireError>
where
    W: AsyncWrite + Unpin,
{
    let payload = codec.encode_request(request)?;
    write_frame(writer, request_id, FrameKind::Request, codec.id(), 0, &payload).await
}

/// Encode and write a response. Terminal responses carry the final flag.
pub async fn write_response<W>(
    writer: &mut W,
    codec: &dyn Codec,
    request_id: u64,
    response: &Response,
) -> Result<(), WireError>
where
    W: AsyncWrite + Unpin,
{
    let payload = codec.encode_response(response)?;
    let flags = if response.is_terminal() { FLAG_FINAL } else { 0 };
    write_frame(writer, request_id, FrameKind::Response, codec.id(), flags, &payload).await
}

/// Read frames on a dedicated task and hand them over a bounded channel.
///
/// Receiving from the channel is cancel-safe, which reading the socket
/// directly inside `select!` is not. The task ends after a clean close
/// (channel closes) or after forwarding the first error.
pub fn spawn_reader<R>(
    mut reader: R,
    capacity: usize,
) -> (mpsc::Receiver<Result<Frame, WireError>>, JoinHandle<()>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(capacity);
    let task = tokio::spawn(async move {
        loop {
            match read_frame(&mut reader).await {
                Ok(Some(frame)) => {
                    if tx.send(Ok(frame)).await.is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    let _ = tx.send(Err(e)).await;
                    break;
                }
            }
        }
    });
    (rx, task)
}
