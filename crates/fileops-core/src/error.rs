//! Protocol-level errors shared by server and client.
//!
//! Every failure a caller can observe maps to exactly one [`ErrorKind`].
//! The kind byte travels on the wire inside an error response, so the
//! client reconstructs the same variant the server produced.

use serde::{Deserialize, Serialize};

use crate::wire::WireError;

/// Wire-stable error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ErrorKind {
    NotFound = 0x01,
    PermissionDenied = 0x02,
    Io = 0x03,
    InvalidState = 0x04,
    Protocol = 0x05,
    Cancelled = 0x06,
}

impl TryFrom<u8> for ErrorKind {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(ErrorKind::NotFound),
            0x02 => Ok(ErrorKind::PermissionDenied),
            0x03 => Ok(ErrorKind::Io),
            0x04 => Ok(ErrorKind::InvalidState),
            0x05 => Ok(ErrorKind::Protocol),
            0x06 => Ok(ErrorKind::Cancelled),
            other => Err(WireError::UnknownErrorKind(other)),
        }
    }
}

impl From<ErrorKind> for u8 {
    fn from(k: ErrorKind) -> u8 {
        k as u8
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FileOpsError {
    #[error("{path}: not found")]
    NotFound { path: String },

    #[error("{path}: permission denied")]
    PermissionDenied { path: String },

    #[error("{path}: i/o error{}: {message}", at_offset(.offset))]
    Io {
        path: String,
        offset: Option<u64>,
        message: String,
    },

    #[error("{path}: session is {state}")]
    InvalidState { path: String, state: String },

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("transfer cancelled")]
    Cancelled,
}

fn at_offset(offset: &Option<u64>) -> String {
    match offset {
        Some(o) => format!(" at offset {o}"),
        None => String::new(),
    }
}

impl FileOpsError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FileOpsError::NotFound { .. } => ErrorKind::NotFound,
            FileOpsError::PermissionDenied { .. } => ErrorKind::PermissionDenied,
            FileOpsError::Io { .. } => ErrorKind::Io,
            FileOpsError::InvalidState { .. } => ErrorKind::InvalidState,
            FileOpsError::Protocol(_) => ErrorKind::Protocol,
            FileOpsError::Cancelled => ErrorKind::Cancelled,
        }
    }

    pub fn not_found(path: impl Into<String>) -> Self {
        FileOpsError::NotFound { path: path.into() }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        FileOpsError::Protocol(message.into())
    }

    /// Classify a filesystem failure. Missing files and permission problems
    /// keep their own kinds; everything else is an I/O error at `offset`.
    pub fn from_io(path: impl Into<String>, offset: Option<u64>, err: &std::io::Error) -> Self {
        let path = path.into();
        match err.kind() {
            std::io::ErrorKind::NotFound => FileOpsError::NotFound { path },
            std::io::ErrorKind::PermissionDenied => FileOpsError::PermissionDenied { path },
            _ => FileOpsError::Io {
                path,
                offset,
                message: err.to_string(),
            },
        }
    }

    /// Path the failure is attached to, when there is one.
    pub fn path(&self) -> Option<&str> {
        match self {
            FileOpsError::NotFound { path }
            | FileOpsError::PermissionDenied { path }
            | FileOpsError::Io { path, .. }
            | FileOpsError::InvalidState { path, .. } => Some(path),
            FileOpsError::Protocol(_) | FileOpsError::Cancelled => None,
        }
    }

    pub fn offset(&self) -> Option<u64> {
        match self {
            FileOpsError::Io { offset, .. } => *offset,
            _ => None,
        }
    }
}

impl From<WireError> for FileOpsError {
    fn from(e: WireError) -> Self {
        FileOpsError::Protocol(e.to_string())
    }
}
