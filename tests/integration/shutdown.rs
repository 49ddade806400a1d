//! Graceful and forced shutdown of the serve loop.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::helpers::*;
use kumi::server::{serve_with_signals, Server, ShutdownSignal};
use kumi::{Engine, EngineConfig};
use reqwest::StatusCode;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

fn slow_engine(delay: Duration) -> Engine {
    let mut engine = Engine::new(EngineConfig::default());
    engine.get("/slow", slow(delay)).unwrap();
    engine.get("/fast", respond_with(json!("fast"))).unwrap();
    engine
}

/// Give the in-flight request time to reach its handler.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(150)).await;
}

#[tokio::test]
async fn test_interrupt_drains_in_flight_request() {
    let server = TestServer::start_with(
        slow_engine(Duration::from_millis(400)),
        CancellationToken::new(),
        Duration::from_secs(5),
    )
    .await;

    let client = server.client.clone();
    let url = server.url("/slow");
    let in_flight = tokio::spawn(async move { client.get(url).send().await });
    settle().await;

    server.signal(ShutdownSignal::Interrupt);

    let resp = in_flight.await.unwrap().expect("in-flight request completes");
    assert_status(&resp, StatusCode::OK);
    assert_eq!(envelope(resp).await["result"], "done");

    let fresh = reqwest::Client::new();
    let base = server.base_url.clone();
    assert!(server.wait().await.is_ok());
    assert!(fresh.get(format!("{}/fast", base)).send().await.is_err());
}

#[tokio::test]
async fn test_quit_does_not_wait() {
    let server = TestServer::start_with(
        slow_engine(Duration::from_secs(10)),
        CancellationToken::new(),
        Duration::from_secs(30),
    )
    .await;

    let client = server.client.clone();
    let url = server.url("/slow");
    let in_flight = tokio::spawn(async move { client.get(url).send().await });
    settle().await;

    let started = Instant::now();
    server.signal(ShutdownSignal::Quit);
    assert!(server.wait().await.is_ok());
    assert!(started.elapsed() < Duration::from_secs(2));

    assert!(in_flight.await.unwrap().is_err());
}

#[tokio::test]
async fn test_second_interrupt_forces_stop() {
    let server = TestServer::start_with(
        slow_engine(Duration::from_secs(10)),
        CancellationToken::new(),
        Duration::from_secs(30),
    )
    .await;

    let client = server.client.clone();
    let url = server.url("/slow");
    let in_flight = tokio::spawn(async move { client.get(url).send().await });
    settle().await;

    let started = Instant::now();
    server.signal(ShutdownSignal::Interrupt);
    settle().await;
    server.signal(ShutdownSignal::Interrupt);

    assert!(server.wait().await.is_ok());
    assert!(started.elapsed() < Duration::from_secs(3));
    assert!(in_flight.await.unwrap().is_err());
}

#[tokio::test]
async fn test_drain_bounded_by_grace() {
    let server = TestServer::start_with(
        slow_engine(Duration::from_secs(10)),
        CancellationToken::new(),
        Duration::from_millis(200),
    )
    .await;

    let client = server.client.clone();
    let url = server.url("/slow");
    let in_flight = tokio::spawn(async move { client.get(url).send().await });
    settle().await;

    let started = Instant::now();
    server.signal(ShutdownSignal::Interrupt);
    assert!(server.wait().await.is_ok());
    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(in_flight.await.unwrap().is_err());
}

#[tokio::test]
async fn test_root_cancellation_drains() {
    let root = CancellationToken::new();
    let server = TestServer::start_with(
        slow_engine(Duration::from_millis(300)),
        root.clone(),
        Duration::from_secs(5),
    )
    .await;

    let client = server.client.clone();
    let url = server.url("/slow");
    let in_flight = tokio::spawn(async move { client.get(url).send().await });
    settle().await;

    root.cancel();

    let resp = in_flight.await.unwrap().expect("in-flight request completes");
    assert_status(&resp, StatusCode::OK);
    assert!(server.wait().await.is_ok());
}

#[tokio::test]
async fn test_multiple_servers_share_engine() {
    let engine = Arc::new(slow_engine(Duration::from_millis(10)));
    let first = Server::bind("127.0.0.1:0".parse().unwrap(), Arc::clone(&engine))
        .await
        .unwrap();
    let second = Server::bind("127.0.0.1:0".parse().unwrap(), Arc::clone(&engine))
        .await
        .unwrap();
    let urls = [
        format!("http://{}/fast", first.local_addr()),
        format!("http://{}/fast", second.local_addr()),
    ];

    let (tx, rx) = mpsc::unbounded_channel();
    let handle = tokio::spawn(serve_with_signals(
        vec![first, second],
        CancellationToken::new(),
        Duration::from_secs(1),
        rx,
    ));

    let client = reqwest::Client::new();
    for url in &urls {
        let resp = client.get(url).send().await.unwrap();
        assert_status(&resp, StatusCode::OK);
    }

    tx.send(ShutdownSignal::Interrupt).unwrap();
    assert!(handle.await.unwrap().is_ok());
    for url in &urls {
        assert!(client.get(url).send().await.is_err());
    }
}
