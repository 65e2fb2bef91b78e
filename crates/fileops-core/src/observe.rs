//! Transfer observation.
//!
//! The transfer loops report what happens to an observer instead of
//! logging directly, so callers decide what a block event is worth.

use std::time::Duration;

use crate::error::FileOpsError;
use crate::latency::TransferReport;
use crate::partition::{Block, ReadRange};

/// How blocks travel for one transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferMode {
    /// One request, server pushes every block.
    Streaming,
    /// One request per block, client drives.
    Unary,
}

impl std::fmt::Display for TransferMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransferMode::Streaming => f.write_str("streaming"),
            TransferMode::Unary => f.write_str("unary"),
        }
    }
}

pub trait TransferObserver: Send + Sync {
    fn on_start(&self, _path: &str, _range: &ReadRange, _mode: TransferMode) {}

    fn on_block(&self, _path: &str, _block: &Block, _received: usize, _elapsed: Duration) {}

    fn on_finish(&self, _path: &str, _report: &TransferReport) {}

    fn on_error(&self, _path: &str, _error: &FileOpsError, _report: &TransferReport) {}
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl TransferObserver for NoopObserver {}

/// Maps transfer events onto `tracing` events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl TransferObserver for TracingObserver {
    fn on_start(&self, path: &str, range: &ReadRange, mode: TransferMode) {
        tracing::info!(
            path,
            offset = range.offset,
            size = range.size,
            block_size = range.block_size,
            blocks = range.block_count(),
            %mode,
            "transfer started"
        );
    }

    fn on_block(&self, path: &str, block: &Block, received: usize, elapsed: Duration) {
        tracing::debug!(
            path,
            offset = block.offset,
            length = block.length,
            received,
            elapsed_us = elapsed.as_micros() as u64,
            "block received"
        );
    }

    fn on_finish(&self, path: &str, report: &TransferReport) {
        tracing::info!(
            path,
            calls = report.stats.count,
            bytes = report.bytes,
            average = ?report.stats.average(),
            min = ?report.stats.min,
            max = ?report.stats.max,
            wall_clock = ?report.wall_clock,
            "transfer complete"
        );
    }

    fn on_error(&self, path: &str, error: &FileOpsError, report: &TransferReport) {
        tracing::warn!(
            path,
            error = %error,
            kind = ?error.kind(),
            calls = report.stats.count,
            bytes = report.bytes,
            "transfer aborted"
        );
    }
}
