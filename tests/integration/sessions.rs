use std::time::Duration;

use fileops_client::{run_transfer, TransferRequest};
use fileops_core::partition::ReadRange;
use fileops_core::wire::CodecId;
use fileops_core::{ErrorKind, NoopObserver, TransferMode};
use fileops_services::SessionStatus;

use crate::*;

#[tokio::test]
async fn open_missing_file_is_not_found() {
    let ts = TestServer::start().await;
    let missing = ts.dir.path().join("missing.txt").to_string_lossy().into_owned();
    let mut client = ts.client(CodecId::Binary).await;

    let err = client.open(&missing).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(err.path(), Some(missing.as_str()));

    // Nothing was registered, so the path is still unknown.
    let err = client.size(&missing).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(ts.server.registry.snapshot().is_empty());
}

#[tokio::test]
async fn close_on_never_opened_path_is_acknowledged() {
    let ts = TestServer::start().await;
    let mut client = ts.client(CodecId::Binary).await;

    client.close("/never/opened").await.unwrap();
    client.close("/never/opened").await.unwrap();
}

#[tokio::test]
async fn closed_session_rejects_reads() {
    let ts = TestServer::start().await;
    let path = ts.write_file("data.bin", 100);
    let mut client = ts.client(CodecId::Binary).await;

    client.open(&path).await.unwrap();
    client.close(&path).await.unwrap();

    assert_eq!(client.size(&path).await.unwrap_err().kind(), ErrorKind::InvalidState);
    assert_eq!(
        client.read_block(&path, 0, 10).await.unwrap_err().kind(),
        ErrorKind::InvalidState
    );

    let range = ReadRange::new(0, 100, 10).unwrap();
    let mut stream = client.stream_read(&path, &range).await.unwrap();
    let first = stream.next().await.expect("stream should report the failure");
    assert_eq!(first.unwrap_err().kind(), ErrorKind::InvalidState);
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn reopen_issues_a_new_session() {
    let ts = TestServer::start().await;
    let path = ts.write_file("data.bin", 100);
    let mut client = ts.client(CodecId::Binary).await;

    let first = client.open(&path).await.unwrap();
    let second = client.open(&path).await.unwrap();
    assert_ne!(first, second);
    assert_eq!(ts.server.registry.open_count(), 1);

    client.close(&path).await.unwrap();
    let third = client.open(&path).await.unwrap();
    assert_ne!(third, second);
    assert_eq!(client.size(&path).await.unwrap(), 100);
}

#[tokio::test]
async fn sessions_are_keyed_by_path() {
    let ts = TestServer::start().await;
    let path = ts.write_file("shared.bin", 64);

    let mut opener = ts.client(CodecId::Binary).await;
    let mut reader = ts.client(CodecId::Json).await;

    opener.open(&path).await.unwrap();
    let block = reader.read_block(&path, 0, 64).await.unwrap();
    assert_eq!(&block[..], &pattern(64)[..]);
}

#[tokio::test]
async fn disconnect_releases_sessions_it_opened() {
    let ts = TestServer::start().await;
    let path = ts.write_file("data.bin", 100);

    let mut client = ts.client(CodecId::Binary).await;
    client.open(&path).await.unwrap();
    assert_eq!(ts.server.registry.open_count(), 1);

    drop(client);

    let registry = ts.server.registry.clone();
    assert!(eventually(Duration::from_secs(5), || registry.open_count() == 0).await);
}

#[tokio::test]
async fn disconnect_leaves_a_newer_session_alone() {
    let ts = TestServer::start().await;
    let path = ts.write_file("data.bin", 100);

    let mut first = ts.client(CodecId::Binary).await;
    first.open(&path).await.unwrap();

    let mut second = ts.client(CodecId::Binary).await;
    second.open(&path).await.unwrap();

    drop(first);
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(ts.server.registry.open_count(), 1);
    assert_eq!(second.size(&path).await.unwrap(), 100);
}

#[tokio::test]
async fn transfer_closes_its_session() {
    let ts = TestServer::start().await;
    let path = ts.write_file("data.bin", 1000);
    let mut client = ts.client(CodecId::Binary).await;

    let req = TransferRequest::new(&path, 250, TransferMode::Unary);
    let outcome = run_transfer(&mut client, &req, &NoopObserver).await.unwrap();

    let sessions = ts.server.registry.snapshot();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].session_id, outcome.session_id);
    assert_eq!(sessions[0].status, SessionStatus::Closed);
    assert_eq!(sessions[0].blocks_served, 4);
    assert_eq!(sessions[0].bytes_served, 1000);
}
