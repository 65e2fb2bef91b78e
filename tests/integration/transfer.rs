use fileops_client::{run_transfer, TransferRequest};
use fileops_core::wire::CodecId;
use fileops_core::{NoopObserver, TransferMode};

use crate::*;

fn request(path: &str, block_size: u64, mode: TransferMode) -> TransferRequest {
    let mut req = TransferRequest::new(path, block_size, mode);
    req.keep_data = true;
    req
}

#[tokio::test]
async fn streaming_and_unary_deliver_identical_bytes() {
    let ts = TestServer::start().await;
    let path = ts.write_file("data.bin", 1000);
    let mut client = ts.client(CodecId::Binary).await;

    let unary = run_transfer(&mut client, &request(&path, 300, TransferMode::Unary), &NoopObserver)
        .await
        .unwrap();
    let streamed = run_transfer(&mut client, &request(&path, 300, TransferMode::Streaming), &NoopObserver)
        .await
        .unwrap();

    let expected = pattern(1000);
    assert_eq!(unary.data.as_deref(), Some(&expected[..]));
    assert_eq!(streamed.data.as_deref(), Some(&expected[..]));

    for outcome in [&unary, &streamed] {
        assert_eq!(outcome.range.block_count(), 4);
        assert_eq!(outcome.report.stats.count, 4);
        assert_eq!(outcome.report.bytes, 1000);
        assert!(outcome.report.stats.average().is_some());
        assert!(outcome.report.stats.min <= outcome.report.stats.max);
    }
}

#[tokio::test]
async fn offset_and_size_select_a_window() {
    let ts = TestServer::start().await;
    let path = ts.write_file("data.bin", 1000);
    let mut client = ts.client(CodecId::Binary).await;

    for mode in [TransferMode::Unary, TransferMode::Streaming] {
        let mut req = request(&path, 100, mode);
        req.offset = 100;
        req.size = Some(250);

        let outcome = run_transfer(&mut client, &req, &NoopObserver).await.unwrap();
        assert_eq!(outcome.report.stats.count, 3, "{mode}");
        assert_eq!(outcome.data.unwrap(), pattern(1000)[100..350].to_vec(), "{mode}");
    }
}

#[tokio::test]
async fn absent_size_reads_to_end_of_file() {
    let ts = TestServer::start().await;
    let path = ts.write_file("data.bin", 1000);
    let mut client = ts.client(CodecId::Binary).await;

    let mut req = request(&path, 64, TransferMode::Streaming);
    req.offset = 900;

    let outcome = run_transfer(&mut client, &req, &NoopObserver).await.unwrap();
    assert_eq!(outcome.range.size, 100);
    assert_eq!(outcome.report.stats.count, 2);
    assert_eq!(outcome.data.unwrap(), pattern(1000)[900..].to_vec());
}

#[tokio::test]
async fn offset_past_end_moves_nothing() {
    let ts = TestServer::start().await;
    let path = ts.write_file("data.bin", 1000);
    let mut client = ts.client(CodecId::Binary).await;

    for mode in [TransferMode::Unary, TransferMode::Streaming] {
        let mut req = request(&path, 300, mode);
        req.offset = 5000;

        let outcome = run_transfer(&mut client, &req, &NoopObserver).await.unwrap();
        assert_eq!(outcome.range.size, 0);
        assert_eq!(outcome.report.stats.count, 0);
        assert_eq!(outcome.report.stats.average(), None);
        assert!(outcome.data.unwrap().is_empty());
    }
}

#[tokio::test]
async fn size_past_end_gives_short_blocks() {
    let ts = TestServer::start().await;
    let path = ts.write_file("data.bin", 1000);
    let mut client = ts.client(CodecId::Binary).await;

    for mode in [TransferMode::Unary, TransferMode::Streaming] {
        let mut req = request(&path, 500, mode);
        req.size = Some(2000);

        let outcome = run_transfer(&mut client, &req, &NoopObserver).await.unwrap();
        assert_eq!(outcome.report.stats.count, 4, "{mode}");
        assert_eq!(outcome.report.bytes, 1000, "{mode}");
        assert_eq!(outcome.data.unwrap(), pattern(1000), "{mode}");
    }
}

#[tokio::test]
async fn block_larger_than_file_is_one_block() {
    let ts = TestServer::start().await;
    let path = ts.write_file("small.bin", 1000);
    let mut client = ts.client(CodecId::Binary).await;

    let outcome = run_transfer(&mut client, &request(&path, 4096, TransferMode::Streaming), &NoopObserver)
        .await
        .unwrap();
    assert_eq!(outcome.report.stats.count, 1);
    assert_eq!(outcome.report.bytes, 1000);
}

#[tokio::test]
async fn json_codec_moves_the_same_bytes() {
    let ts = TestServer::start().await;
    let path = ts.write_file("data.bin", 777);
    let mut client = ts.client(CodecId::Json).await;

    for mode in [TransferMode::Unary, TransferMode::Streaming] {
        let outcome = run_transfer(&mut client, &request(&path, 100, mode), &NoopObserver)
            .await
            .unwrap();
        assert_eq!(outcome.data.unwrap(), pattern(777), "{mode}");
    }
}

#[tokio::test]
async fn clients_with_different_codecs_share_a_server() {
    let ts = TestServer::start().await;
    let path = ts.write_file("data.bin", 500);

    let mut json = ts.client(CodecId::Json).await;
    let mut binary = ts.client(CodecId::Binary).await;

    json.open(&path).await.unwrap();
    assert_eq!(binary.size(&path).await.unwrap(), 500);
    assert_eq!(json.read_block(&path, 0, 10).await.unwrap(), binary.read_block(&path, 0, 10).await.unwrap());
    json.close(&path).await.unwrap();
}

#[tokio::test]
async fn size_open_close_round() {
    let ts = TestServer::start().await;
    let path = ts.write_file("data.bin", 12345);
    let mut client = ts.client(CodecId::Binary).await;

    let id = client.open(&path).await.unwrap();
    assert!(id > 0);
    assert_eq!(client.size(&path).await.unwrap(), 12345);
    client.close(&path).await.unwrap();
}
