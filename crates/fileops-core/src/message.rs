//! Protocol messages — the five file operations, stream control, and
//! their replies. Codecs turn these into frame payloads.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, FileOpsError};

/// Client → server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    /// Open `path` into a session. Replies `Opened`.
    Open { path: String },
    /// Release the session for `path`. Always replies `Closed`.
    Close { path: String },
    /// Current byte length of the file behind the session.
    Size { path: String },
    /// One block, one round-trip. Replies `Block`.
    ReadBlock {
        path: String,
        offset: u64,
        length: u64,
    },
    /// Whole range, pushed as `Chunk` frames followed by `StreamEnd`.
    StreamRead {
        path: String,
        offset: u64,
        size: u64,
        block_size: u64,
    },
    /// Stop the stream in flight on this connection.
    Cancel,
}

impl Request {
    pub fn name(&self) -> &'static str {
        match self {
            Request::Open { .. } => "open",
            Request::Close { .. } => "close",
            Request::Size { .. } => "size",
            Request::ReadBlock { .. } => "read_block",
            Request::StreamRead { .. } => "stream_read",
            Request::Cancel => "cancel",
        }
    }

    pub fn path(&self) -> Option<&str> {
        match self {
            Request::Open { path }
            | Request::Close { path }
            | Request::Size { path }
            | Request::ReadBlock { path, .. }
            | Request::StreamRead { path, .. } => Some(path),
            Request::Cancel => None,
        }
    }
}

/// Server → client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Response {
    Opened {
        session_id: u64,
    },
    Closed,
    Size {
        size: u64,
    },
    Block {
        #[serde(with = "hex_bytes")]
        data: Bytes,
    },
    Chunk(Chunk),
    /// Terminates a successful stream.
    StreamEnd {
        blocks: u64,
        bytes: u64,
    },
    Error(ErrorBody),
}

impl Response {
    /// Whether this response ends the exchange for its request.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Response::Chunk(_))
    }
}

/// Payload of one streamed block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub offset: u64,
    #[serde(with = "hex_bytes")]
    pub data: Bytes,
}

/// Wire form of a [`FileOpsError`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: ErrorKind,
    pub path: Option<String>,
    pub offset: Option<u64>,
    pub message: String,
}

impl From<&FileOpsError> for ErrorBody {
    fn from(e: &FileOpsError) -> Self {
        let message = match e {
            FileOpsError::Io { message, .. } => message.clone(),
            FileOpsError::InvalidState { state, .. } => state.clone(),
            FileOpsError::Protocol(message) => message.clone(),
            other => other.to_string(),
        };
        ErrorBody {
            kind: e.kind(),
            path: e.path().map(str::to_string),
            offset: e.offset(),
            message,
        }
    }
}

impl From<ErrorBody> for FileOpsError {
    fn from(b: ErrorBody) -> Self {
        let path = b.path.unwrap_or_default();
        match b.kind {
            ErrorKind::NotFound => FileOpsError::NotFound { path },
            ErrorKind::PermissionDenied => FileOpsError::PermissionDenied { path },
            ErrorKind::Io => FileOpsError::Io {
                path,
                offset: b.offset,
                message: b.message,
            },
            ErrorKind::InvalidState => FileOpsError::InvalidState {
                path,
                state: b.message,
            },
            ErrorKind::Protocol => FileOpsError::Protocol(b.message),
            ErrorKind::Cancelled => FileOpsError::Cancelled,
        }
    }
}

/// Serde adapter: bytes as a lowercase hex string.
mod hex_bytes {
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &Bytes, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(data))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Bytes, D::Error> {
        let text = String::deserialize(d)?;
        hex::decode(text)
            .map(Bytes::from)
            .map_err(serde::de::Error::custom)
    }
}
