//! Payload codecs.
//!
//! The protocol core only ever deals in [`Request`] and [`Response`]
//! values; a codec turns them into frame payloads and back. The frame
//! header records which codec produced a payload, so a server can serve
//! clients using different encodings side by side.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::ErrorKind;
use crate::message::{Chunk, ErrorBody, Request, Response};
use crate::wire::{CodecId, WireError};

pub trait Codec: Send + Sync {
    fn id(&self) -> CodecId;

    fn encode_request(&self, req: &Request) -> Result<Bytes, WireError>;

    fn decode_request(&self, payload: &[u8]) -> Result<Request, WireError>;

    fn encode_response(&self, resp: &Response) -> Result<Bytes, WireError>;

    fn decode_response(&self, payload: &[u8]) -> Result<Response, WireError>;
}

/// Look up the codec for a header's codec byte.
pub fn codec_for(id: CodecId) -> &'static dyn Codec {
    match id {
        CodecId::Json => &JsonCodec,
        CodecId::Binary => &BinaryCodec,
    }
}

// ── JSON ──────────────────────────────────────────────────────────────────────

/// serde_json encoding of the message enums.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn id(&self) -> CodecId {
        CodecId::Json
    }

    fn encode_request(&self, req: &Request) -> Result<Bytes, WireError> {
        serde_json::to_vec(req)
            .map(Bytes::from)
            .map_err(|e| WireError::Malformed(e.to_string()))
    }

    fn decode_request(&self, payload: &[u8]) -> Result<Request, WireError> {
        serde_json::from_slice(payload).map_err(|e| WireError::Malformed(e.to_string()))
    }

    fn encode_response(&self, resp: &Response) -> Result<Bytes, WireError> {
        serde_json::to_vec(resp)
            .map(Bytes::from)
            .map_err(|e| WireError::Malformed(e.to_string()))
    }

    fn decode_response(&self, payload: &[u8]) -> Result<Response, WireError> {
        serde_json::from_slice(payload).map_err(|e| WireError::Malformed(e.to_string()))
    }
}

// ── Binary ────────────────────────────────────────────────────────────────────

/// Compact encoding: one tag byte, then fixed-width little-endian integers
/// and u32-length-prefixed strings/bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct BinaryCodec;

mod tag {
    pub const OPEN: u8 = 0x01;
    pub const CLOSE: u8 = 0x02;
    pub const SIZE: u8 = 0x03;
    pub const READ_BLOCK: u8 = 0x04;
    pub const STREAM_READ: u8 = 0x05;
    pub const CANCEL: u8 = 0x06;

    pub const OPENED: u8 = 0x81;
    pub const CLOSED: u8 = 0x82;
    pub const SIZE_REPLY: u8 = 0x83;
    pub const BLOCK: u8 = 0x84;
    pub const CHUNK: u8 = 0x85;
    pub const STREAM_END: u8 = 0x86;
    pub const ERROR: u8 = 0x87;
}

fn put_bytes(buf: &mut BytesMut, data: &[u8]) {
    buf.put_u32_le(data.len() as u32);
    buf.put_slice(data);
}

impl Codec for BinaryCodec {
    fn id(&self) -> CodecId {
        CodecId::Binary
    }

    fn encode_request(&self, req: &Request) -> Result<Bytes, WireError> {
        let mut buf = BytesMut::with_capacity(64);
        match req {
            Request::Open { path } => {
                buf.put_u8(tag::OPEN);
                put_bytes(&mut buf, path.as_bytes());
            }
            Request::Close { path } => {
                buf.put_u8(tag::CLOSE);
                put_bytes(&mut buf, path.as_bytes());
            }
            Request::Size { path } => {
                buf.put_u8(tag::SIZE);
                put_bytes(&mut buf, path.as_bytes());
            }
            Request::ReadBlock {
                path,
                offset,
                length,
            } => {
                buf.put_u8(tag::READ_BLOCK);
                put_bytes(&mut buf, path.as_bytes());
                buf.put_u64_le(*offset);
                buf.put_u64_le(*length);
            }
            Request::StreamRead {
                path,
                offset,
                size,
                block_size,
            } => {
                buf.put_u8(tag::STREAM_READ);
                put_bytes(&mut buf, path.as_bytes());
                buf.put_u64_le(*offset);
                buf.put_u64_le(*size);
                buf.put_u64_le(*block_size);
            }
            Request::Cancel => buf.put_u8(tag::CANCEL),
        }
        Ok(buf.freeze())
    }

    fn decode_request(&self, payload: &[u8]) -> Result<Request, WireError> {
        let mut r = Reader::new(payload);
        let req = match r.u8()? {
            tag::OPEN => Request::Open { path: r.string()? },
            tag::CLOSE => Request::Close { path: r.string()? },
            tag::SIZE => Request::Size { path: r.string()? },
            tag::READ_BLOCK => Request::ReadBlock {
                path: r.string()?,
                offset: r.u64()?,
                length: r.u64()?,
            },
            tag::STREAM_READ => Request::StreamRead {
                path: r.string()?,
                offset: r.u64()?,
                size: r.u64()?,
                block_size: r.u64()?,
            },
            tag::CANCEL => Request::Cancel,
            other => return Err(WireError::UnknownMessageTag(other)),
        };
        r.finish()?;
        Ok(req)
    }

    fn encode_response(&self, resp: &Response) -> Result<Bytes, WireError> {
        let mut buf = BytesMut::with_capacity(match resp {
            Response::Block { data } => data.len() + 8,
            Response::Chunk(c) => c.data.len() + 16,
            _ => 32,
        });
        match resp {
            Response::Opened { session_id } => {
                buf.put_u8(tag::OPENED);
                buf.put_u64_le(*session_id);
            }
            Response::Closed => buf.put_u8(tag::CLOSED),
            Response::Size { size } => {
                buf.put_u8(tag::SIZE_REPLY);
                buf.put_u64_le(*size);
            }
            Response::Block { data } => {
                buf.put_u8(tag::BLOCK);
                put_bytes(&mut buf, data);
            }
            Response::Chunk(chunk) => {
                buf.put_u8(tag::CHUNK);
                buf.put_u64_le(chunk.offset);
                put_bytes(&mut buf, &chunk.data);
            }
            Response::StreamEnd { blocks, bytes } => {
                buf.put_u8(tag::STREAM_END);
                buf.put_u64_le(*blocks);
                buf.put_u64_le(*bytes);
            }
            Response::Error(body) => {
                buf.put_u8(tag::ERROR);
                buf.put_u8(body.kind.into());
                match &body.path {
                    Some(p) => {
                        buf.put_u8(1);
                        put_bytes(&mut buf, p.as_bytes());
                    }
                    None => buf.put_u8(0),
                }
                match body.offset {
                    Some(o) => {
                        buf.put_u8(1);
                        buf.put_u64_le(o);
                    }
                    None => buf.put_u8(0),
                }
                put_bytes(&mut buf, body.message.as_bytes());
            }
        }
        Ok(buf.freeze())
    }

    fn decode_response(&self, payload: &[u8]) -> Result<Response, WireError> {
        let mut r = Reader::new(payload);
        let resp = match r.u8()? {
            tag::OPENED => Response::Opened {
                session_id: r.u64()?,
            },
            tag::CLOSED => Response::Closed,
            tag::SIZE_REPLY => Response::Size { size: r.u64()? },
            tag::BLOCK => Response::Block {
                data: Bytes::copy_from_slice(r.bytes()?),
            },
            tag::CHUNK => Response::Chunk(Chunk {
                offset: r.u64()?,
                data: Bytes::copy_from_slice(r.bytes()?),
            }),
            tag::STREAM_END => Response::StreamEnd {
                blocks: r.u64()?,
                bytes: r.u64()?,
            },
            tag::ERROR => {
                let kind = ErrorKind::try_from(r.u8()?)?;
                let path = match r.u8()? {
                    0 => None,
                    _ => Some(r.string()?),
                };
                let offset = match r.u8()? {
                    0 => None,
                    _ => Some(r.u64()?),
                };
                Response::Error(ErrorBody {
                    kind,
                    path,
                    offset,
                    message: r.string()?,
                })
            }
            other => return Err(WireError::UnknownMessageTag(other)),
        };
        r.finish()?;
        Ok(resp)
    }
}

/// Bounds-checked cursor over a binary payload.
struct Reader<'a> {
    buf: &'a [u8],
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], WireError> {
        if self.buf.len() < n {
            return Err(WireError::Truncated {
                expected: n,
                actual: self.buf.len(),
            });
        }
        let (head, rest) = self.buf.split_at(n);
        self.buf = rest;
        Ok(head)
    }

    fn u8(&mut self) -> Result<u8, WireError> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> Result<u32, WireError> {
        let mut b = [0u8; 4];
        b.copy_from_slice(self.take(4)?);
        Ok(u32::from_le_bytes(b))
    }

    fn u64(&mut self) -> Result<u64, WireError> {
        let mut b = [0u8; 8];
        b.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(b))
    }

    fn bytes(&mut self) -> Result<&'a [u8], WireError> {
        let len = self.u32()? as usize;
        self.take(len)
    }

    fn string(&mut self) -> Result<String, WireError> {
        let raw = self.bytes()?;
        String::from_utf8(raw.to_vec()).map_err(|e| WireError::Malformed(e.to_string()))
    }

    fn finish(&self) -> Result<(), WireError> {
        if self.buf.is_empty() {
            Ok(())
        } else {
            Err(WireError::Malformed(format!(
                "{} trailing bytes",
                self.buf.len()
            )))
        }
    }
}
