use std::sync::Arc;

use http::StatusCode;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

use kumi::config::Config;
use kumi::middleware::{AccessLog, CloseNotify, Gzip, Recoverer, Timeout};
use kumi::server::{self, Server};
use kumi::validator::{self, Validator};
use kumi::{handler_fn, ApiResponse, Chain, Engine, Paging};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

fn main() -> Result<(), BoxError> {
    let config = Config::from_env()?;
    kumi::logging::init(&config.logging)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(num_cpus::get())
        .enable_all()
        .build()?;

    runtime.block_on(async_main(config))
}

async fn async_main(config: Config) -> Result<(), BoxError> {
    info!(version = kumi::VERSION, "Starting kumi");
    config.log_summary();

    let engine = Arc::new(build_engine(&config)?);

    let mut servers = Vec::new();
    for addr in config.server.listen_addrs() {
        servers.push(Server::bind(addr, Arc::clone(&engine)).await?);
    }

    server::serve(servers, CancellationToken::new(), config.server.drain_timeout).await?;
    Ok(())
}

fn build_engine(config: &Config) -> Result<Engine, BoxError> {
    let mut engine = Engine::new(config.engine_config());

    if config.middleware.access_log {
        engine.use_handler(AccessLog::new());
    }
    engine.use_handler(Recoverer::new());
    engine.use_handler(CloseNotify::new());
    if let Some(timeout) = config.middleware.request_timeout {
        engine.use_handler(Timeout::new(timeout));
    }
    if config.middleware.is_gzip_enabled() {
        engine.use_handler(Gzip::new(config.middleware.gzip_level));
    }

    engine.get(
        "/health",
        handler_fn(|ctx| {
            Box::pin(async move {
                ctx.writer_mut().cache_control_mut().no_store();
                ctx.respond(&ApiResponse::success(json!({
                    "status": "ok",
                    "version": kumi::VERSION,
                })));
            })
        })
        .named("health"),
    )?;

    let mut users = engine.group("/users", Chain::new());

    users.get(
        "/",
        handler_fn(|ctx| {
            Box::pin(async move {
                let query = ctx.query();
                let limit = query
                    .get("limit")
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(20)
                    .min(100);
                let offset = query
                    .get("offset")
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(0);

                let total = 42u64;
                let items: Vec<Value> = (offset..total.min(offset + limit))
                    .map(|id| json!({ "id": id, "name": format!("user-{}", id) }))
                    .collect();

                let response = ApiResponse::success(Value::Array(items))
                    .with_paging(Paging::new(total, limit, offset).with_order("id"));
                ctx.respond(&response);
            })
        })
        .named("list_users"),
    )?;

    users.get(
        "/:id",
        handler_fn(|ctx| {
            Box::pin(async move {
                let id = ctx.param("id").and_then(|v| v.parse::<u64>().ok());
                let response = match id {
                    Some(id) => {
                        ctx.writer_mut()
                            .cache_control_mut()
                            .set_private()
                            .set_max_age(60);
                        ApiResponse::success(json!({ "id": id, "name": format!("user-{}", id) }))
                    }
                    None => ApiResponse::error(StatusCode::BAD_REQUEST, "id must be a number"),
                };
                ctx.respond(&response);
            })
        })
        .named("get_user"),
    )?;

    let schema = json!({
        "type": "object",
        "required": ["name", "email"],
        "properties": {
            "name": { "type": "string", "minLength": 1 },
            "email": { "type": "string", "pattern": "^[^@\\s]+@[^@\\s]+$" },
            "age": { "type": "integer", "minimum": 0 }
        },
        "additionalProperties": false
    });
    let validate = Validator::new(&schema)?
        .with_rule("email", "does_not_match_pattern", validator::rule("invalid_email", "email is not valid"));

    users.post(
        "/",
        Chain::new().with(validate).with(
            handler_fn(|ctx| {
                Box::pin(async move {
                    let mut user = ctx
                        .remove::<Value>(validator::BODY_KEY)
                        .unwrap_or_else(|| json!({}));
                    if let Some(fields) = user.as_object_mut() {
                        fields.insert("id".into(), json!(Uuid::new_v4().to_string()));
                    }
                    ctx.respond(&ApiResponse::success(user).with_status(StatusCode::CREATED));
                })
            })
            .named("create_user"),
        ),
    )?;

    Ok(engine)
}
