use std::time::Duration;

use serde_json::Value;

use fileops_core::wire::CodecId;
use fileops_core::ErrorKind;

use crate::*;

async fn get(url: &str) -> Value {
    reqwest::get(url)
        .await
        .expect("API should answer")
        .json()
        .await
        .expect("API should return JSON")
}

#[tokio::test]
async fn status_reports_open_sessions() {
    let ts = TestServer::start_with_api().await;
    let path = ts.write_file("data.bin", 1000);
    let mut client = ts.client(CodecId::Binary).await;
    client.open(&path).await.unwrap();
    client.read_block(&path, 0, 400).await.unwrap();

    let status = get(&ts.api_url("/status")).await;
    assert_eq!(status["listen_addr"], ts.addr());
    assert_eq!(status["sessions_open"], 1);
    assert_eq!(status["sessions_closed"], 0);
    assert_eq!(status["blocks_served"], 1);
    assert_eq!(status["bytes_served"], 400);
    assert_eq!(status["wire_version"], 1);
    assert!(status["root_dir"].is_null());

    let sessions = get(&ts.api_url("/sessions")).await;
    let list = sessions["sessions"].as_array().unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0]["path"], path.as_str());
    assert_eq!(list[0]["status"], "open");
    assert_eq!(list[0]["blocks_served"], 1);
}

#[tokio::test]
async fn closing_a_session_over_http() {
    let ts = TestServer::start_with_api().await;
    let path = ts.write_file("data.bin", 10);
    let mut client = ts.client(CodecId::Binary).await;
    client.open(&path).await.unwrap();

    let mut url = reqwest::Url::parse(&ts.api_url("/sessions")).unwrap();
    url.query_pairs_mut().append_pair("path", &path);
    let resp: Value = reqwest::Client::new()
        .delete(url)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(resp["closed"], true);

    let err = client.size(&path).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);

    let status = get(&ts.api_url("/status")).await;
    assert_eq!(status["sessions_open"], 0);
    assert_eq!(status["sessions_closed"], 1);
    assert_eq!(status["sessions_tracked"], 1);
}

#[tokio::test]
async fn shutdown_over_http_stops_the_server() {
    let ts = TestServer::start_with_api().await;
    let addr = ts.addr();

    let resp: Value = reqwest::Client::new()
        .post(ts.api_url("/daemon/shutdown"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(resp["message"], "Shutdown initiated");

    let TestServer { server, dir: _dir } = ts;
    tokio::time::timeout(Duration::from_secs(5), server.wait())
        .await
        .expect("server tasks should finish after shutdown");

    assert!(tokio::net::TcpStream::connect(&addr).await.is_err());
}
