use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use fileops_client::{run_transfer, FileOpsClient, TransferRequest};
use fileops_core::partition::ReadRange;
use fileops_core::wire::{CodecId, MAX_BLOCK_SIZE};
use fileops_core::{ErrorKind, FileOpsError, NoopObserver, TransferMode};
use fileops_services::{LocalFileSystem, SessionStatus};

use crate::*;

#[tokio::test]
async fn mid_stream_failure_ends_with_exactly_one_error() {
    let ts = TestServer::start_with(|_| Arc::new(FaultyFs::failing_at(600)), false).await;
    let path = ts.write_file("data.bin", 1000);
    let mut client = ts.client(CodecId::Binary).await;
    client.open(&path).await.unwrap();

    let range = ReadRange::new(0, 1000, 300).unwrap();
    let mut stream = client.stream_read(&path, &range).await.unwrap();

    let mut offsets = Vec::new();
    let mut errors = Vec::new();
    while let Some(item) = stream.next().await {
        match item {
            Ok(chunk) => {
                assert!(errors.is_empty(), "chunk after the error");
                offsets.push(chunk.offset);
            }
            Err(e) => errors.push(e),
        }
    }

    assert_eq!(offsets, vec![0, 300]);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].kind(), ErrorKind::Io);
    assert_eq!(errors[0].offset(), Some(600));
    assert_eq!(errors[0].path(), Some(path.as_str()));

    // The connection is still usable afterwards.
    drop(stream);
    assert_eq!(client.size(&path).await.unwrap(), 1000);
}

#[tokio::test]
async fn failed_transfer_keeps_partial_report_and_closes() {
    let ts = TestServer::start_with(|_| Arc::new(FaultyFs::failing_at(600)), false).await;
    let path = ts.write_file("data.bin", 1000);
    let mut client = ts.client(CodecId::Json).await;

    for mode in [TransferMode::Unary, TransferMode::Streaming] {
        let req = TransferRequest::new(&path, 300, mode);
        let failure = run_transfer(&mut client, &req, &NoopObserver).await.unwrap_err();

        assert_eq!(failure.error.kind(), ErrorKind::Io, "{mode}");
        assert_eq!(failure.report.stats.count, 2, "{mode}");
        assert_eq!(failure.report.bytes, 600, "{mode}");
        assert_eq!(ts.server.registry.snapshot()[0].status, SessionStatus::Closed, "{mode}");
    }
}

#[tokio::test]
async fn missing_file_transfer_reports_nothing_moved() {
    let ts = TestServer::start().await;
    let mut client = ts.client(CodecId::Binary).await;

    let req = TransferRequest::new("/no/such/file.bin", 300, TransferMode::Streaming);
    let failure = run_transfer(&mut client, &req, &NoopObserver).await.unwrap_err();

    assert_eq!(failure.error.kind(), ErrorKind::NotFound);
    assert_eq!(failure.report.stats.count, 0);
    assert_eq!(failure.report.stats.average(), None);
}

#[tokio::test]
async fn bad_block_sizes_are_protocol_errors() {
    let ts = TestServer::start().await;
    let path = ts.write_file("data.bin", 100);
    let mut client = ts.client(CodecId::Binary).await;
    client.open(&path).await.unwrap();

    let zero = client.read_block(&path, 0, 0).await.unwrap_err();
    assert_eq!(zero.kind(), ErrorKind::Protocol);

    let huge = client.read_block(&path, 0, MAX_BLOCK_SIZE + 1).await.unwrap_err();
    assert_eq!(huge.kind(), ErrorKind::Protocol);

    // Still serving after rejecting both.
    assert_eq!(client.read_block(&path, 0, 10).await.unwrap().len(), 10);
}

#[tokio::test]
async fn confined_server_refuses_paths_outside_root() {
    let ts = TestServer::start_with(
        |dir| {
            std::fs::create_dir(dir.path().join("root")).unwrap();
            Arc::new(LocalFileSystem::confined(&dir.path().join("root")).unwrap())
        },
        false,
    )
    .await;
    ts.write_file("outside.bin", 10);
    ts.write_file("root/inside.bin", 10);
    let mut client = ts.client(CodecId::Binary).await;

    let err = client.open("../outside.bin").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PermissionDenied);

    client.open("/inside.bin").await.unwrap();
    assert_eq!(client.size("/inside.bin").await.unwrap(), 10);
}

async fn slow_transfer(mode: TransferMode) -> (TestServer, Result<(), FileOpsError>, u64) {
    let ts = TestServer::start_with(|_| Arc::new(FaultyFs::slow(Duration::from_millis(10))), false).await;
    let path = ts.write_file("data.bin", 100 * 100);

    let cancel = CancellationToken::new();
    let mut client: FileOpsClient = ts.client(CodecId::Binary).await.with_cancellation(cancel.clone());

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(150)).await;
        cancel.cancel();
    });

    let req = TransferRequest::new(&path, 100, mode);
    match run_transfer(&mut client, &req, &NoopObserver).await {
        Ok(outcome) => (ts, Ok(()), outcome.report.stats.count),
        Err(failure) => (ts, Err(failure.error), failure.report.stats.count),
    }
}

#[tokio::test]
async fn cancelling_a_stream_stops_it_and_closes_the_session() {
    let (ts, result, blocks) = slow_transfer(TransferMode::Streaming).await;

    assert_eq!(result, Err(FileOpsError::Cancelled));
    assert!(blocks < 100, "cancel arrived after {blocks} blocks");

    let registry = ts.server.registry.clone();
    assert!(eventually(Duration::from_secs(5), || registry.open_count() == 0).await);
}

#[tokio::test]
async fn cancelling_unary_reads_stops_them() {
    let (ts, result, blocks) = slow_transfer(TransferMode::Unary).await;

    assert_eq!(result, Err(FileOpsError::Cancelled));
    assert!(blocks < 100, "cancel arrived after {blocks} blocks");

    let registry = ts.server.registry.clone();
    assert!(eventually(Duration::from_secs(5), || registry.open_count() == 0).await);
}

#[tokio::test]
async fn cancelling_during_open_still_closes_the_session() {
    let ts = TestServer::start_with(|_| Arc::new(FaultyFs::slow_open(Duration::from_millis(200))), false).await;
    let path = ts.write_file("data.bin", 1000);

    let cancel = CancellationToken::new();
    let mut client = ts.client(CodecId::Binary).await.with_cancellation(cancel.clone());
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
    });

    let req = TransferRequest::new(&path, 100, TransferMode::Streaming);
    let failure = run_transfer(&mut client, &req, &NoopObserver).await.unwrap_err();
    assert_eq!(failure.error, FileOpsError::Cancelled);
    assert_eq!(failure.report.stats.count, 0);

    // The client is still connected, so nothing but its own close can have
    // released the session.
    let registry = ts.server.registry.clone();
    assert!(eventually(Duration::from_secs(5), || registry.open_count() == 0).await);
    assert_eq!(registry.snapshot()[0].status, SessionStatus::Closed);
    assert_eq!(client.close(&path).await, Ok(()));
}

#[tokio::test]
async fn slow_open_does_not_stall_other_connections() {
    let ts = TestServer::start_with(|_| Arc::new(FaultyFs::slow_open(Duration::from_millis(300))), false).await;
    let path = ts.write_file("data.bin", 10);

    let mut slow = ts.client(CodecId::Binary).await;
    let opening = tokio::spawn(async move { slow.open(&path).await });
    tokio::time::sleep(Duration::from_millis(20)).await;

    let mut other = ts.client(CodecId::Json).await;
    let started = std::time::Instant::now();
    other.close("/unrelated.bin").await.unwrap();
    let elapsed = started.elapsed();
    assert!(elapsed < Duration::from_millis(200), "close waited {elapsed:?} behind an open");

    assert!(opening.await.unwrap().is_ok());
}
