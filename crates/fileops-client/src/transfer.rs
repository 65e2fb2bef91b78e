//! Whole-range transfers: open, size, partition, move the blocks, close.

use fileops_core::config::ClientConfig;
use fileops_core::partition::ReadRange;
use fileops_core::{FileOpsError, LatencyRecorder, TransferMode, TransferObserver, TransferReport};

use crate::client::FileOpsClient;

/// What to read and how.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub path: String,
    pub offset: u64,
    /// `None` reads from `offset` to the end of the file.
    pub size: Option<u64>,
    pub block_size: u64,
    pub mode: TransferMode,
    /// Keep the received bytes in the outcome.
    pub keep_data: bool,
}

impl TransferRequest {
    pub fn new(path: impl Into<String>, block_size: u64, mode: TransferMode) -> Self {
        Self {
            path: path.into(),
            offset: 0,
            size: None,
            block_size,
            mode,
            keep_data: false,
        }
    }
}

impl From<&ClientConfig> for TransferRequest {
    fn from(config: &ClientConfig) -> Self {
        Self {
            path: config.path.clone(),
            offset: config.offset,
            size: config.requested_size(),
            block_size: config.block_size,
            mode: if config.stream {
                TransferMode::Streaming
            } else {
                TransferMode::Unary
            },
            keep_data: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TransferOutcome {
    pub session_id: u64,
    pub range: ReadRange,
    pub report: TransferReport,
    /// Received bytes in offset order, when `keep_data` was set.
    pub data: Option<Vec<u8>>,
}

/// A transfer that stopped early, with what it measured up to that point.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{error}")]
pub struct TransferFailure {
    pub error: FileOpsError,
    pub report: TransferReport,
}

/// Run one transfer over `client`.
///
/// The session is closed on every path out once it has been opened,
/// including failure and cancellation. Cancellation comes from the
/// client's token.
pub async fn run_transfer(
    client: &mut FileOpsClient,
    request: &TransferRequest,
    observer: &dyn TransferObserver,
) -> Result<TransferOutcome, TransferFailure> {
    let mut recorder = LatencyRecorder::new();
    let path = request.path.as_str();

    let session_id = match client.open(path).await {
        Ok(id) => id,
        Err(error) => return Err(fail(observer, path, error, &recorder)),
    };

    let mut data = request.keep_data.then(Vec::new);
    let result = transfer_range(client, request, observer, &mut recorder, data.as_mut()).await;

    if let Err(e) = client.close(path).await {
        tracing::warn!(path, error = %e, "close after transfer failed");
    }

    match result {
        Ok(range) => {
            let report = recorder.finish();
            observer.on_finish(path, &report);
            Ok(TransferOutcome {
                session_id,
                range,
                report,
                data,
            })
        }
        Err(error) => Err(fail(observer, path, error, &recorder)),
    }
}

fn fail(
    observer: &dyn TransferObserver,
    path: &str,
    error: FileOpsError,
    recorder: &LatencyRecorder,
) -> TransferFailure {
    let report = recorder.snapshot();
    observer.on_error(path, &error, &report);
    TransferFailure { error, report }
}

async fn transfer_range(
    client: &mut FileOpsClient,
    request: &TransferRequest,
    observer: &dyn TransferObserver,
    recorder: &mut LatencyRecorder,
    mut data: Option<&mut Vec<u8>>,
) -> Result<ReadRange, FileOpsError> {
    let path = request.path.as_str();
    let size = match request.size {
        Some(size) => size,
        None => client.size(path).await?.saturating_sub(request.offset),
    };
    let range = ReadRange::new(request.offset, size, request.block_size)?;
    observer.on_start(path, &range, request.mode);

    match request.mode {
        TransferMode::Unary => {
            for block in range.blocks() {
                let (result, elapsed) = recorder
                    .time(client.read_block(path, block.offset, block.length))
                    .await;
                let bytes = result?;
                check_length(path, block.offset, block.length, bytes.len())?;

                recorder.record(elapsed, bytes.len() as u64);
                observer.on_block(path, &block, bytes.len(), elapsed);
                if let Some(buf) = data.as_deref_mut() {
                    buf.extend_from_slice(&bytes);
                }
            }
        }
        TransferMode::Streaming => {
            let mut expected = range.blocks();
            let mut stream = client.stream_read(path, &range).await?;
            loop {
                let (next, elapsed) = recorder.time(stream.next()).await;
                let chunk = match next {
                    Some(Ok(chunk)) => chunk,
                    Some(Err(FileOpsError::Cancelled)) if !stream.is_done() => {
                        stream.cancel().await?;
                        return Err(FileOpsError::Cancelled);
                    }
                    Some(Err(e)) => return Err(e),
                    None => break,
                };

                let Some(block) = expected.next() else {
                    stream.cancel().await?;
                    return Err(FileOpsError::protocol(format!(
                        "chunk at {} beyond the requested range",
                        chunk.offset
                    )));
                };
                if chunk.offset != block.offset {
                    stream.cancel().await?;
                    return Err(FileOpsError::protocol(format!(
                        "chunk at {} where block {} was expected",
                        chunk.offset, block.offset
                    )));
                }
                if let Err(e) = check_length(path, block.offset, block.length, chunk.data.len()) {
                    stream.cancel().await?;
                    return Err(e);
                }

                recorder.record(elapsed, chunk.data.len() as u64);
                observer.on_block(path, &block, chunk.data.len(), elapsed);
                if let Some(buf) = data.as_deref_mut() {
                    buf.extend_from_slice(&chunk.data);
                }
            }

            let missing = expected.len();
            if missing > 0 {
                return Err(FileOpsError::protocol(format!(
                    "stream ended with {missing} block(s) outstanding"
                )));
            }
        }
    }
    Ok(range)
}

fn check_length(path: &str, offset: u64, expected: u64, got: usize) -> Result<(), FileOpsError> {
    if got as u64 > expected {
        return Err(FileOpsError::protocol(format!(
            "{path}: block at {offset} returned {got} bytes, asked for {expected}"
        )));
    }
    if (got as u64) < expected {
        tracing::debug!(path, offset, expected, got, "short block, file ended early");
    }
    Ok(())
}
