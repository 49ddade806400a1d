//! Basic HTTP tests: envelopes, params, HEAD, OPTIONS, 404/405, body limits.

use crate::helpers::*;
use kumi::router::RegexRouter;
use kumi::{handler_fn, ApiResponse, Engine, EngineConfig};
use reqwest::{Method, StatusCode};
use serde_json::json;

fn users_engine(config: EngineConfig) -> Engine {
    let mut engine = Engine::new(config);
    engine
        .get(
            "/users/:id",
            handler_fn(|ctx| {
                Box::pin(async move {
                    let id = ctx.param("id").unwrap_or_default().to_string();
                    let verbose = ctx.query().has("verbose");
                    ctx.respond(&ApiResponse::success(json!({ "id": id, "verbose": verbose })));
                })
            }),
        )
        .unwrap();
    engine
        .post(
            "/echo",
            handler_fn(|ctx| {
                Box::pin(async move {
                    let len = ctx.request().body().len();
                    ctx.respond(&ApiResponse::success(json!({ "len": len })));
                })
            }),
        )
        .unwrap();
    engine
}

#[tokio::test]
async fn test_get_with_params_and_query() {
    let server = TestServer::start(users_engine(EngineConfig::default())).await;

    let resp = server.get("/users/42?verbose").await;
    assert_status(&resp, StatusCode::OK);
    assert_header(&resp, "content-type", "application/json; charset=utf-8");

    let body = envelope(resp).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["result"]["id"], "42");
    assert_eq!(body["result"]["verbose"], true);

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_request_id_generated_and_echoed() {
    let server = TestServer::start(users_engine(EngineConfig::default())).await;

    let resp = server.get("/users/1").await;
    let generated = resp.headers().get("x-request-id").expect("request id");
    assert_eq!(generated.len(), 32);

    let resp = server
        .request(Method::GET, "/users/1", &[("X-Request-ID", "trace-me")])
        .await;
    assert_header(&resp, "x-request-id", "trace-me");

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_head_has_headers_without_body() {
    let server = TestServer::start(users_engine(EngineConfig::default())).await;

    let resp = server.request(Method::HEAD, "/users/7", &[]).await;
    assert_status(&resp, StatusCode::OK);
    assert_header(&resp, "content-type", "application/json; charset=utf-8");
    assert!(resp.bytes().await.unwrap().is_empty());

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_auto_options_lists_methods() {
    let server = TestServer::start(users_engine(EngineConfig::default())).await;

    let resp = server.request(Method::OPTIONS, "/users/7", &[]).await;
    assert_status(&resp, StatusCode::NO_CONTENT);
    assert_header(&resp, "allow", "GET, HEAD, OPTIONS");

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_not_found_envelope() {
    let server = TestServer::start(users_engine(EngineConfig::default())).await;

    let resp = server.get("/nope").await;
    assert_status(&resp, StatusCode::NOT_FOUND);
    let body = envelope(resp).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["status"], 404);
    assert_eq!(body["code"], "not_found");

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_method_not_allowed_with_regex_router() {
    let mut engine = Engine::with_router(EngineConfig::default(), RegexRouter::new());
    engine.get("/items/:id", respond_with(json!("item"))).unwrap();
    let server = TestServer::start(engine).await;

    let resp = server.request(Method::DELETE, "/items/3", &[]).await;
    assert_status(&resp, StatusCode::METHOD_NOT_ALLOWED);
    assert_header(&resp, "allow", "GET, HEAD, OPTIONS");
    let body = envelope(resp).await;
    assert_eq!(body["code"], "method_not_allowed");

    let resp = server.get("/items/3").await;
    assert_status(&resp, StatusCode::OK);

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_body_over_limit_is_rejected() {
    let config = EngineConfig::default().with_max_body_bytes(16);
    let server = TestServer::start(users_engine(config)).await;

    let resp = server.post_raw("/echo", "0123456789").await;
    assert_status(&resp, StatusCode::OK);
    assert_eq!(envelope(resp).await["result"]["len"], 10);

    let resp = server.post_raw("/echo", vec![b'x'; 64]).await;
    assert_status(&resp, StatusCode::PAYLOAD_TOO_LARGE);
    let body = envelope(resp).await;
    assert_eq!(body["errors"][0]["type"], "request_body_exceeded");

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_cache_control_defaults() {
    let mut engine = Engine::new(EngineConfig::default());
    engine.get("/plain", respond_with(json!(1))).unwrap();
    engine
        .get(
            "/cached",
            handler_fn(|ctx| {
                Box::pin(async move {
                    ctx.writer_mut().cache_control_mut().set_max_age(60);
                    ctx.respond(&ApiResponse::success(json!(2)));
                })
            }),
        )
        .unwrap();
    let server = TestServer::start(engine).await;

    let resp = server.get("/plain").await;
    assert_header(&resp, "cache-control", "no-cache");

    let resp = server.get("/cached").await;
    let value = resp.headers()["cache-control"].to_str().unwrap().to_string();
    assert!(value.contains("max-age=60"), "got {}", value);
    assert!(value.contains("private"), "got {}", value);

    server.stop().await.unwrap();
}
