//! Session registry — which files are open, keyed by the path the client
//! asked for.
//!
//! A path moves through `Opened` → `Closed`. Closing keeps a tombstone so
//! later operations on that path report a session in the wrong state
//! rather than a file nobody asked for. Re-opening a path replaces its
//! entry and releases the previous handle.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use dashmap::DashMap;
use serde::Serialize;

use fileops_core::FileOpsError;

use crate::block_reader;
use crate::fs::{FileSystem, OpenFile};

/// One path's entry in the registry.
#[derive(Debug)]
struct SessionEntry {
    id: u64,
    opened_at: Instant,
    state: SessionState,
    blocks_served: u64,
    bytes_served: u64,
}

#[derive(Debug)]
enum SessionState {
    Opened(Arc<dyn OpenFile>),
    Closed { closed_at: Instant },
}

/// Externally visible state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Open,
    Closed,
}

/// Snapshot of one session for status reporting.
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub path: String,
    pub session_id: u64,
    pub status: SessionStatus,
    pub age_secs: u64,
    /// Seconds since close, for tombstones.
    pub closed_secs: Option<u64>,
    pub blocks_served: u64,
    pub bytes_served: u64,
}

struct Inner {
    fs: Arc<dyn FileSystem>,
    sessions: DashMap<String, SessionEntry>,
    next_id: AtomicU64,
}

/// Shared, cheaply cloneable handle to the session table.
#[derive(Clone)]
pub struct SessionRegistry {
    inner: Arc<Inner>,
}

impl SessionRegistry {
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self {
            inner: Arc::new(Inner {
                fs,
                sessions: DashMap::new(),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Open `path` and register it. Returns the new session id.
    ///
    /// The file is opened before the table is touched, so a failed
    /// re-open leaves the existing session as it was.
    pub fn open(&self, path: &str) -> Result<u64, FileOpsError> {
        let file = self.inner.fs.open_for_read(path)?;
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);

        let previous = self.inner.sessions.insert(
            path.to_string(),
            SessionEntry {
                id,
                opened_at: Instant::now(),
                state: SessionState::Opened(file),
                blocks_served: 0,
                bytes_served: 0,
            },
        );

        match previous {
            Some(SessionEntry {
                id: old,
                state: SessionState::Opened(_),
                ..
            }) => tracing::info!(path, session_id = id, replaced = old, "session reopened, previous handle released"),
            _ => tracing::info!(path, session_id = id, "session opened"),
        }
        Ok(id)
    }

    /// Close the session for `path`, if it is open.
    ///
    /// Closing a path that was never opened, or is already closed, is not
    /// an error. Returns the id of the session that was closed.
    pub fn close(&self, path: &str) -> Option<u64> {
        let Some(mut entry) = self.inner.sessions.get_mut(path) else {
            tracing::debug!(path, "close on unknown path");
            return None;
        };
        if !matches!(entry.state, SessionState::Opened(_)) {
            tracing::debug!(path, session_id = entry.id, "close on closed session");
            return None;
        }
        entry.state = SessionState::Closed {
            closed_at: Instant::now(),
        };
        tracing::info!(
            path,
            session_id = entry.id,
            blocks = entry.blocks_served,
            bytes = entry.bytes_served,
            "session closed"
        );
        Some(entry.id)
    }

    /// Close `path` only if `id` is still the session registered for it.
    ///
    /// Connection teardown uses this so it never closes a session another
    /// connection opened since.
    pub fn close_if_current(&self, path: &str, id: u64) -> bool {
        let Some(mut entry) = self.inner.sessions.get_mut(path) else {
            return false;
        };
        if entry.id != id || !matches!(entry.state, SessionState::Opened(_)) {
            return false;
        }
        entry.state = SessionState::Closed {
            closed_at: Instant::now(),
        };
        tracing::info!(path, session_id = id, "session released with its connection");
        true
    }

    /// The open handle for `path`.
    pub fn handle(&self, path: &str) -> Result<Arc<dyn OpenFile>, FileOpsError> {
        let entry = self
            .inner
            .sessions
            .get(path)
            .ok_or_else(|| FileOpsError::not_found(path))?;
        match &entry.state {
            SessionState::Opened(file) => Ok(Arc::clone(file)),
            SessionState::Closed { .. } => Err(FileOpsError::InvalidState {
                path: path.to_string(),
                state: "closed".into(),
            }),
        }
    }

    /// Current byte length of the file behind `path`'s session.
    pub fn size(&self, path: &str) -> Result<u64, FileOpsError> {
        self.handle(path)?
            .size()
            .map_err(|e| FileOpsError::from_io(path, None, &e))
    }

    /// Read one block from `path`'s session.
    pub async fn read(&self, path: &str, offset: u64, length: u64) -> Result<Bytes, FileOpsError> {
        let file = self.handle(path)?;
        let data = block_reader::read_block_async(file, path, offset, length).await?;
        self.record_served(path, data.len() as u64);
        Ok(data)
    }

    fn record_served(&self, path: &str, bytes: u64) {
        if let Some(mut entry) = self.inner.sessions.get_mut(path) {
            if matches!(entry.state, SessionState::Opened(_)) {
                entry.blocks_served += 1;
                entry.bytes_served += bytes;
            }
        }
    }

    /// Number of sessions currently open. Tombstones are not counted.
    pub fn open_count(&self) -> usize {
        self.inner
            .sessions
            .iter()
            .filter(|e| matches!(e.state, SessionState::Opened(_)))
            .count()
    }

    /// Every entry, tombstones included, sorted by path.
    pub fn snapshot(&self) -> Vec<SessionInfo> {
        let mut out: Vec<SessionInfo> = self
            .inner
            .sessions
            .iter()
            .map(|e| {
                let (status, closed_secs) = match &e.state {
                    SessionState::Opened(_) => (SessionStatus::Open, None),
                    SessionState::Closed { closed_at } => {
                        (SessionStatus::Closed, Some(closed_at.elapsed().as_secs()))
                    }
                };
                SessionInfo {
                    path: e.key().clone(),
                    session_id: e.id,
                    status,
                    age_secs: e.opened_at.elapsed().as_secs(),
                    closed_secs,
                    blocks_served: e.blocks_served,
                    bytes_served: e.bytes_served,
                }
            })
            .collect();
        out.sort_by(|a, b| a.path.cmp(&b.path));
        out
    }

    /// Drop tombstones older than `max_age`. Returns how many were removed.
    pub fn prune_closed(&self, max_age: Duration) -> usize {
        let before = self.inner.sessions.len();
        self.inner.sessions.retain(|_, e| match e.state {
            SessionState::Closed { closed_at } => closed_at.elapsed() < max_age,
            SessionState::Opened(_) => true,
        });
        before.saturating_sub(self.inner.sessions.len())
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("sessions", &self.inner.sessions.len())
            .finish()
    }
}
