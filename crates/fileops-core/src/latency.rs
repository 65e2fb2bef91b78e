//! Per-block latency accounting for client transfers.

use std::future::Future;
use std::time::{Duration, Instant};

use serde::Serialize;

/// Running statistics over block round-trips.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LatencyStats {
    pub count: u64,
    pub total: Duration,
    pub min: Option<Duration>,
    pub max: Option<Duration>,
}

impl LatencyStats {
    pub fn record(&mut self, sample: Duration) {
        self.count += 1;
        self.total += sample;
        self.min = Some(self.min.map_or(sample, |m| m.min(sample)));
        self.max = Some(self.max.map_or(sample, |m| m.max(sample)));
    }

    /// `None` when nothing was recorded; an empty range moves zero blocks.
    pub fn average(&self) -> Option<Duration> {
        if self.count == 0 {
            return None;
        }
        Some(Duration::from_nanos(
            (self.total.as_nanos() / self.count as u128) as u64,
        ))
    }
}

/// Wraps every block round-trip of one transfer.
///
/// The wall clock starts when the recorder is created, so it also covers
/// session setup and partitioning, not just the sum of the calls.
#[derive(Debug)]
pub struct LatencyRecorder {
    started: Instant,
    stats: LatencyStats,
    bytes: u64,
}

impl LatencyRecorder {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            stats: LatencyStats::default(),
            bytes: 0,
        }
    }

    /// Await `fut`, returning its output and how long it took. Nothing is
    /// recorded; the caller records once it knows the call succeeded.
    pub async fn time<F: Future>(&self, fut: F) -> (F::Output, Duration) {
        let start = Instant::now();
        let out = fut.await;
        (out, start.elapsed())
    }

    /// Record one completed block round-trip that moved `bytes`.
    pub fn record(&mut self, elapsed: Duration, bytes: u64) {
        self.stats.record(elapsed);
        self.bytes += bytes;
    }

    pub fn stats(&self) -> &LatencyStats {
        &self.stats
    }

    /// Report as of now. Used for partial results when a transfer fails.
    pub fn snapshot(&self) -> TransferReport {
        TransferReport {
            stats: self.stats,
            wall_clock: self.started.elapsed(),
            bytes: self.bytes,
        }
    }

    pub fn finish(self) -> TransferReport {
        self.snapshot()
    }
}

impl Default for LatencyRecorder {
    fn default() -> Self {
        Self::new()
    }
}

/// What a transfer measured, complete or not.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferReport {
    pub stats: LatencyStats,
    pub wall_clock: Duration,
    pub bytes: u64,
}

impl TransferReport {
    /// Bytes per second over the whole wall clock.
    pub fn throughput(&self) -> Option<f64> {
        let secs = self.wall_clock.as_secs_f64();
        if secs > 0.0 {
            Some(self.bytes as f64 / secs)
        } else {
            None
        }
    }

    pub fn summary(&self) -> ReportSummary {
        ReportSummary {
            calls: self.stats.count,
            bytes: self.bytes,
            average_us: self.stats.average().map(|d| d.as_micros() as u64),
            min_us: self.stats.min.map(|d| d.as_micros() as u64),
            max_us: self.stats.max.map(|d| d.as_micros() as u64),
            calls_total_us: self.stats.total.as_micros() as u64,
            wall_clock_us: self.wall_clock.as_micros() as u64,
            throughput_bytes_per_sec: self.throughput(),
        }
    }
}

/// Flat, serializable view of a [`TransferReport`].
#[derive(Debug, Clone, Serialize)]
pub struct ReportSummary {
    pub calls: u64,
    pub bytes: u64,
    pub average_us: Option<u64>,
    pub min_us: Option<u64>,
    pub max_us: Option<u64>,
    pub calls_total_us: u64,
    pub wall_clock_us: u64,
    pub throughput_bytes_per_sec: Option<f64>,
}
