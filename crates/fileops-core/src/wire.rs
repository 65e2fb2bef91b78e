//! fileops wire format — the fixed frame header that precedes every
//! request and response on a connection.
//!
//! The header is the only part of the protocol with a fixed layout. The
//! payload after it is produced by whichever [`Codec`](crate::codec::Codec)
//! the header names, so one protocol core serves several encodings.
//!
//! Multi-byte fields are little-endian regardless of host order. There is
//! no unsafe code in this module.

use static_assertions::assert_eq_size;
use zerocopy::byteorder::little_endian::{U32, U64};
use zerocopy::{AsBytes, FromBytes, FromZeroes};

// ── Frame Header ─────────────────────────────────────────────────────────────

/// Precedes every payload on the wire.
///
/// The receiver can verify and route a frame before decoding a single
/// byte of payload.
///
/// Wire size: 48 bytes.
#[derive(Debug, Clone, AsBytes, FromBytes, FromZeroes)]
#[repr(C, packed)]
pub struct FrameHeader {
    /// BLAKE3 hash of the payload bytes. A mismatch rejects the frame.
    pub content_hash: [u8; 32],

    /// Correlates responses with the request that caused them. All frames
    /// of one streamed response carry the request's id.
    pub request_id: U64,

    /// Payload length in bytes, not including this header.
    pub length: U32,

    /// [`FrameKind`] byte.
    pub kind: u8,

    /// [`CodecId`] byte: how the payload is encoded.
    pub codec: u8,

    /// Bit flags:
    ///   bit    0: final frame of this response
    ///   bits 1-7: reserved, must be zero
    pub flags: u8,

    /// Wire format version. Currently 0x01.
    pub version: u8,
}

// Compile-time size guard. If this fails, the wire format has silently changed.
assert_eq_size!(FrameHeader, [u8; 48]);

pub const FRAME_HEADER_SIZE: usize = std::mem::size_of::<FrameHeader>();

impl FrameHeader {
    pub fn new(request_id: u64, kind: FrameKind, codec: CodecId, flags: u8, payload: &[u8]) -> Self {
        Self {
            content_hash: checksum(payload),
            request_id: U64::new(request_id),
            length: U32::new(payload.len() as u32),
            kind: kind.into(),
            codec: codec.into(),
            flags,
            version: WIRE_VERSION,
        }
    }

    pub fn request_id(&self) -> u64 {
        self.request_id.get()
    }

    pub fn payload_len(&self) -> usize {
        self.length.get() as usize
    }

    pub fn is_final(&self) -> bool {
        self.flags & FLAG_FINAL != 0
    }

    /// Check every header field that can be checked without the payload.
    pub fn validate(&self) -> Result<(FrameKind, CodecId), WireError> {
        if self.version != WIRE_VERSION {
            return Err(WireError::UnknownVersion(self.version));
        }
        if self.flags & !FLAG_FINAL != 0 {
            return Err(WireError::ReservedFlagsSet(self.flags));
        }
        if self.payload_len() > MAX_FRAME_PAYLOAD {
            return Err(WireError::PayloadTooLarge(self.payload_len()));
        }
        let kind = FrameKind::try_from(self.kind)?;
        let codec = CodecId::try_from(self.codec)?;
        Ok((kind, codec))
    }

    /// Verify the payload against `content_hash`.
    pub fn verify(&self, payload: &[u8]) -> Result<(), WireError> {
        if payload.len() != self.payload_len() {
            return Err(WireError::Truncated {
                expected: self.payload_len(),
                actual: payload.len(),
            });
        }
        if checksum(payload) != self.content_hash {
            return Err(WireError::HashMismatch {
                request_id: self.request_id(),
            });
        }
        Ok(())
    }
}

/// BLAKE3 of a frame payload.
pub fn checksum(payload: &[u8]) -> [u8; 32] {
    *blake3::hash(payload).as_bytes()
}

// ── Frame kind ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameKind {
    Request = 0x01,
    Response = 0x02,
}

impl TryFrom<u8> for FrameKind {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(FrameKind::Request),
            0x02 => Ok(FrameKind::Response),
            other => Err(WireError::UnknownFrameKind(other)),
        }
    }
}

impl From<FrameKind> for u8 {
    fn from(k: FrameKind) -> u8 {
        k as u8
    }
}

// ── Codec id ─────────────────────────────────────────────────────────────────

/// Payload encoding. The server answers in the encoding of the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum CodecId {
    /// Self-describing JSON. Byte payloads are hex strings.
    Json = 0x01,
    /// Compact little-endian binary.
    Binary = 0x02,
}

impl CodecId {
    pub const ALL: [CodecId; 2] = [CodecId::Json, CodecId::Binary];

    pub fn name(&self) -> &'static str {
        match self {
            CodecId::Json => "json",
            CodecId::Binary => "binary",
        }
    }
}

impl TryFrom<u8> for CodecId {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(CodecId::Json),
            0x02 => Ok(CodecId::Binary),
            other => Err(WireError::UnknownCodec(other)),
        }
    }
}

impl From<CodecId> for u8 {
    fn from(c: CodecId) -> u8 {
        c as u8
    }
}

impl std::str::FromStr for CodecId {
    type Err = WireError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(CodecId::Json),
            "binary" | "bin" => Ok(CodecId::Binary),
            _ => Err(WireError::UnknownCodecName(s.to_string())),
        }
    }
}

impl std::fmt::Display for CodecId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ── Constants ─────────────────────────────────────────────────────────────────

/// Current frame format version.
pub const WIRE_VERSION: u8 = 0x01;

/// Set on the last frame of a response. Unary responses always set it;
/// a stream sets it only on its end-of-stream or error frame.
pub const FLAG_FINAL: u8 = 0x01;

/// Largest payload a single frame may carry.
pub const MAX_FRAME_PAYLOAD: usize = 16 * 1024 * 1024;

/// Largest block a client may request. Hex-encoded JSON chunks at this
/// size still fit in one frame.
pub const MAX_BLOCK_SIZE: u64 = 4 * 1024 * 1024;

/// Block size used when none is configured.
pub const DEFAULT_BLOCK_SIZE: u64 = 512 * 1024;

/// Default TCP port for the file service.
pub const DEFAULT_PORT: u16 = 7070;

/// Default port for the HTTP status API.
pub const DEFAULT_API_PORT: u16 = 7071;

// ── Errors ────────────────────────────────────────────────────────────────────

/// Errors that can arise when framing or decoding wire data.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("unknown frame version: 0x{0:02x}")]
    UnknownVersion(u8),

    #[error("unknown frame kind: 0x{0:02x}")]
    UnknownFrameKind(u8),

    #[error("unknown codec byte: 0x{0:02x}")]
    UnknownCodec(u8),

    #[error("unknown codec name: {0}")]
    UnknownCodecName(String),

    #[error("unknown error kind: 0x{0:02x}")]
    UnknownErrorKind(u8),

    #[error("unknown message tag: 0x{0:02x}")]
    UnknownMessageTag(u8),

    #[error("reserved flags are non-zero: 0x{0:02x}")]
    ReservedFlagsSet(u8),

    #[error("payload length {0} exceeds maximum {}", MAX_FRAME_PAYLOAD)]
    PayloadTooLarge(usize),

    #[error("payload hash mismatch on request {request_id}")]
    HashMismatch { request_id: u64 },

    #[error("truncated payload: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("malformed payload: {0}")]
    Malformed(String),

    #[error("unexpected frame: {0}")]
    Unexpected(String),

    #[error("connection closed")]
    ConnectionClosed,

    #[error("i/o error: {0}")]
    Io(String),
}

impl From<std::io::Error> for WireError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::UnexpectedEof
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::BrokenPipe => WireError::ConnectionClosed,
            _ => WireError::Io(e.to_string()),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
