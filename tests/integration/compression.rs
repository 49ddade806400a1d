//! Compression tests (gzip)

use std::io::Read;

use crate::helpers::*;
use flate2::read::GzDecoder;
use kumi::middleware::Gzip;
use kumi::{handler_fn, Engine, EngineConfig};
use reqwest::{Method, StatusCode};

const PAYLOAD: &str = "kumi kumi kumi kumi kumi kumi kumi kumi kumi kumi";

fn gzip_engine() -> Engine {
    let mut engine = Engine::new(EngineConfig::default());
    engine.use_handler(Gzip::new(6));
    engine
        .get(
            "/text",
            handler_fn(|ctx| {
                Box::pin(async move {
                    let _ = ctx.write_str(PAYLOAD);
                })
            }),
        )
        .unwrap();
    engine
        .get(
            "/encoded",
            handler_fn(|ctx| {
                Box::pin(async move {
                    ctx.header_mut().insert(
                        http::header::CONTENT_ENCODING,
                        http::HeaderValue::from_static("br"),
                    );
                    let _ = ctx.write(&[0x0b, 0x02, 0x80]);
                })
            }),
        )
        .unwrap();
    engine
}

/// Test that gzip is applied when Accept-Encoding: gzip is sent
#[tokio::test]
async fn test_gzip_compression_applied() {
    let server = TestServer::start(gzip_engine()).await;
    let resp = server
        .request(Method::GET, "/text", &[("Accept-Encoding", "gzip")])
        .await;

    assert_status(&resp, StatusCode::OK);
    assert_header(&resp, "content-encoding", "gzip");
    assert_header(&resp, "vary", "Accept-Encoding");

    let compressed = resp.bytes().await.unwrap();
    let mut decoded = String::new();
    GzDecoder::new(&compressed[..])
        .read_to_string(&mut decoded)
        .unwrap();
    assert_eq!(decoded, PAYLOAD);

    server.stop().await.unwrap();
}

/// Test no compression when Accept-Encoding is not sent
#[tokio::test]
async fn test_no_compression_without_accept_encoding() {
    let server = TestServer::start(gzip_engine()).await;
    let resp = server.get("/text").await;

    assert_status(&resp, StatusCode::OK);
    assert_no_header(&resp, "content-encoding");
    assert_eq!(resp.text().await.unwrap(), PAYLOAD);

    server.stop().await.unwrap();
}

/// Test that a body already encoded by the handler is passed through
#[tokio::test]
async fn test_no_double_encoding() {
    let server = TestServer::start(gzip_engine()).await;
    let resp = server
        .request(Method::GET, "/encoded", &[("Accept-Encoding", "gzip, br")])
        .await;

    assert_status(&resp, StatusCode::OK);
    assert_header(&resp, "content-encoding", "br");
    assert_eq!(&resp.bytes().await.unwrap()[..], &[0x0b, 0x02, 0x80]);

    server.stop().await.unwrap();
}

/// HEAD responses are never compressed
#[tokio::test]
async fn test_head_not_compressed() {
    let server = TestServer::start(gzip_engine()).await;
    let resp = server
        .request(Method::HEAD, "/text", &[("Accept-Encoding", "gzip")])
        .await;

    assert_status(&resp, StatusCode::OK);
    assert_no_header(&resp, "content-encoding");

    server.stop().await.unwrap();
}
