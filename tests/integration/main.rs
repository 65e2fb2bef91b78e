//! fileops integration test harness.
//!
//! Every test starts its own server in-process on 127.0.0.1 with an
//! ephemeral port, backed by files in a fresh temp directory. Servers
//! die with the test's runtime.
//!
//!   cargo test --test integration

mod api;
mod failures;
mod sessions;
mod transfer;

use std::io;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use fileops_client::FileOpsClient;
use fileops_core::config::ServerConfig;
use fileops_core::wire::CodecId;
use fileops_core::FileOpsError;
use fileops_services::{FileSystem, LocalFileSystem, OpenFile};
use fileopsd::RunningServer;

// ── Harness ───────────────────────────────────────────────────────────────────

pub struct TestServer {
    pub server: RunningServer,
    pub dir: TempDir,
}

impl TestServer {
    /// Plain local filesystem, status API off.
    pub async fn start() -> Self {
        Self::start_with(|_| Arc::new(LocalFileSystem::unconfined()), false).await
    }

    pub async fn start_with_api() -> Self {
        Self::start_with(|_| Arc::new(LocalFileSystem::unconfined()), true).await
    }

    /// Build the server's filesystem from the temp directory it will use.
    pub async fn start_with(fs: impl FnOnce(&TempDir) -> Arc<dyn FileSystem>, api: bool) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");

        let mut config = ServerConfig::default();
        config.network.listen_addr = "127.0.0.1:0".into();
        config.network.api_port = 0;
        config.network.api_enabled = api;

        let server = fileopsd::start(&config, fs(&dir))
            .await
            .expect("server should start");
        Self { server, dir }
    }

    pub fn addr(&self) -> String {
        self.server.addr.to_string()
    }

    pub fn api_url(&self, route: &str) -> String {
        let addr = self.server.api_addr.expect("API not enabled");
        format!("http://{addr}/api{route}")
    }

    /// Write `len` bytes of [`pattern`] to `name`; returns its absolute path.
    pub fn write_file(&self, name: &str, len: usize) -> String {
        let path = self.dir.path().join(name);
        std::fs::write(&path, pattern(len)).expect("write test file");
        path.to_string_lossy().into_owned()
    }

    pub async fn client(&self, codec: CodecId) -> FileOpsClient {
        FileOpsClient::connect(&self.addr(), codec)
            .await
            .expect("client should connect")
    }
}

/// Deterministic, non-repeating-per-block file content.
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| ((i * 31) ^ (i >> 8)) as u8).collect()
}

/// Poll `check` until it holds or `timeout` passes.
pub async fn eventually(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

// ── Fault injection ──────────────────────────────────────────────────────────

/// Local files whose reads fail past an offset, or crawl. Opening can
/// crawl too.
pub struct FaultyFs {
    inner: LocalFileSystem,
    fail_at: Option<u64>,
    delay: Duration,
    open_delay: Duration,
}

impl FaultyFs {
    pub fn failing_at(offset: u64) -> Self {
        Self {
            inner: LocalFileSystem::unconfined(),
            fail_at: Some(offset),
            delay: Duration::ZERO,
            open_delay: Duration::ZERO,
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            inner: LocalFileSystem::unconfined(),
            fail_at: None,
            delay,
            open_delay: Duration::ZERO,
        }
    }

    pub fn slow_open(delay: Duration) -> Self {
        Self {
            inner: LocalFileSystem::unconfined(),
            fail_at: None,
            delay: Duration::ZERO,
            open_delay: delay,
        }
    }
}

impl FileSystem for FaultyFs {
    fn open_for_read(&self, path: &str) -> Result<Arc<dyn OpenFile>, FileOpsError> {
        if !self.open_delay.is_zero() {
            std::thread::sleep(self.open_delay);
        }
        Ok(Arc::new(FaultyFile {
            inner: self.inner.open_for_read(path)?,
            fail_at: self.fail_at,
            delay: self.delay,
        }))
    }
}

#[derive(Debug)]
struct FaultyFile {
    inner: Arc<dyn OpenFile>,
    fail_at: Option<u64>,
    delay: Duration,
}

impl OpenFile for FaultyFile {
    fn size(&self) -> io::Result<u64> {
        self.inner.size()
    }

    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        if self.fail_at.is_some_and(|at| offset >= at) {
            return Err(io::Error::other("injected read fault"));
        }
        self.inner.read_at(buf, offset)
    }
}
