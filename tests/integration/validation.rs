//! Request body validation through a route chain.

use crate::helpers::*;
use kumi::validator::{self, AfterFailure, Validator};
use kumi::{handler_fn, ApiError, ApiResponse, Chain, Engine, EngineConfig};
use reqwest::StatusCode;
use serde_json::{json, Value};

fn signup_engine() -> Engine {
    let schema = json!({
        "type": "object",
        "required": ["name", "email"],
        "properties": {
            "name": { "type": "string", "minLength": 1 },
            "email": { "type": "string" },
            "age": { "type": "integer", "minimum": 0 }
        }
    });
    let validate = Validator::new(&schema)
        .unwrap()
        .with_rule("age", "number_gte", validator::rule("too_young", "age cannot be negative"))
        .with_after_failure(|_body: &Value, errors: Vec<ApiError>| {
            AfterFailure::Errors(
                errors
                    .into_iter()
                    .chain([ApiError::new("hint", "see /docs/signup")])
                    .collect(),
            )
        });

    let mut engine = Engine::new(EngineConfig::default());
    engine
        .post(
            "/signup",
            Chain::new().with(validate).with(handler_fn(|ctx| {
                Box::pin(async move {
                    let body = ctx.get::<Value>(validator::BODY_KEY).cloned().unwrap_or_default();
                    ctx.respond(&ApiResponse::success(body).with_status(StatusCode::CREATED));
                })
            })),
        )
        .unwrap();
    engine
}

#[tokio::test]
async fn test_valid_body_reaches_handler() {
    let server = TestServer::start(signup_engine()).await;

    let resp = server
        .post_json("/signup", &json!({ "name": "Ada", "email": "ada@example.com" }))
        .await;
    assert_status(&resp, StatusCode::CREATED);
    let body = envelope(resp).await;
    assert_eq!(body["result"]["name"], "Ada");

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_missing_field_is_unprocessable() {
    let server = TestServer::start(signup_engine()).await;

    let resp = server.post_json("/signup", &json!({ "email": "x@example.com" })).await;
    assert_status(&resp, StatusCode::UNPROCESSABLE_ENTITY);
    let body = envelope(resp).await;
    assert_eq!(body["code"], "unprocessable_entity");
    assert_eq!(body["errors"][0]["field"], "name");
    assert_eq!(body["errors"][0]["type"], "required");
    assert_eq!(body["errors"][1]["type"], "hint");

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_custom_rule_replaces_violation() {
    let server = TestServer::start(signup_engine()).await;

    let resp = server
        .post_json("/signup", &json!({ "name": "Ada", "email": "a@b.c", "age": -1 }))
        .await;
    assert_status(&resp, StatusCode::UNPROCESSABLE_ENTITY);
    let body = envelope(resp).await;
    assert_eq!(body["errors"][0]["field"], "age");
    assert_eq!(body["errors"][0]["type"], "too_young");
    assert_eq!(body["errors"][0]["message"], "age cannot be negative");

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_empty_and_malformed_bodies() {
    let server = TestServer::start(signup_engine()).await;

    let resp = server.post_raw("/signup", "   ").await;
    assert_status(&resp, StatusCode::BAD_REQUEST);
    assert_eq!(envelope(resp).await["errors"][0]["type"], "request_body_required");

    let resp = server.post_raw("/signup", "{\"name\":").await;
    assert_status(&resp, StatusCode::BAD_REQUEST);
    assert_eq!(envelope(resp).await["errors"][0]["type"], "invalid_json");

    server.stop().await.unwrap();
}
