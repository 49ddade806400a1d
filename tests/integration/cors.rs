//! CORS negotiation over the wire.

use crate::helpers::*;
use kumi::{CorsOptions, Engine, EngineConfig};
use reqwest::{Method, StatusCode};
use serde_json::json;

fn cors_engine() -> Engine {
    let global = CorsOptions::new()
        .with_origins(["https://app.example"])
        .with_expose_headers(["X-Total"])
        .with_max_age(600);
    let mut engine = Engine::new(EngineConfig::default().with_cors(global));
    engine.get("/items", respond_with(json!([]))).unwrap();
    engine.put("/items", respond_with(json!("updated"))).unwrap();
    engine
        .handle_with_cors(
            Method::GET,
            "/public",
            CorsOptions::any_origin(),
            respond_with(json!("open")),
        )
        .unwrap();
    engine
}

#[tokio::test]
async fn test_simple_request_allowed_origin() {
    let server = TestServer::start(cors_engine()).await;

    let resp = server
        .request(Method::GET, "/items", &[("Origin", "https://app.example")])
        .await;
    assert_status(&resp, StatusCode::OK);
    assert_header(&resp, "access-control-allow-origin", "https://app.example");
    assert_header(&resp, "access-control-expose-headers", "X-Total");
    assert_no_header(&resp, "access-control-allow-methods");

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_unknown_origin_is_served_without_headers() {
    let server = TestServer::start(cors_engine()).await;

    let resp = server
        .request(Method::GET, "/items", &[("Origin", "https://evil.example")])
        .await;
    assert_status(&resp, StatusCode::OK);
    assert_no_header(&resp, "access-control-allow-origin");

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_preflight() {
    let server = TestServer::start(cors_engine()).await;

    let resp = server
        .request(
            Method::OPTIONS,
            "/items",
            &[
                ("Origin", "https://app.example"),
                ("Access-Control-Request-Method", "PUT"),
                ("Access-Control-Request-Headers", "X-Custom"),
            ],
        )
        .await;
    assert_status(&resp, StatusCode::NO_CONTENT);
    assert_header(&resp, "access-control-allow-origin", "https://app.example");
    assert_header(&resp, "access-control-allow-methods", "GET, HEAD, OPTIONS, PUT");
    assert_header(&resp, "access-control-allow-headers", "X-Custom");
    assert_header(&resp, "access-control-max-age", "600");

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_route_override_merges_over_global() {
    let server = TestServer::start(cors_engine()).await;

    let resp = server
        .request(Method::GET, "/public", &[("Origin", "https://anyone.example")])
        .await;
    assert_header(&resp, "access-control-allow-origin", "*");
    // Route sets no expose list, so the global one is kept.
    assert_header(&resp, "access-control-expose-headers", "X-Total");

    server.stop().await.unwrap();
}
