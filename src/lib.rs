//! kumi - a small HTTP toolkit on top of hyper and Tokio.
//!
//! The crate glues a pluggable router, a middleware chain and a pooled
//! request context into an [`Engine`], and serves it with a graceful
//! multi-listener lifecycle.
//!
//! # Features
//!
//! - **Request context**: pooled [`Context`] with a wrapped response writer
//!   (write-once headers, byte counting, body suppression for HEAD/1xx/204/304)
//! - **Middleware chain**: ordered handlers with `next`/`abort`
//! - **Routers**: radix-trie ([`router::MatchitRouter`]) and ordered regex
//!   ([`router::RegexRouter`]) adapters behind one [`router::Router`] trait
//! - **CORS**: origin negotiation and preflight handling
//! - **Cache-Control**: directive builder with sensible defaults
//! - **Envelopes**: JSON and XML response envelopes
//! - **Validation**: JSON-schema request body validation with error mapping
//! - **Graceful shutdown**: drain on SIGINT/SIGTERM, immediate stop on SIGQUIT
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use kumi::{handler_fn, ApiResponse, Engine, EngineConfig};
//!
//! let mut engine = Engine::new(EngineConfig::default());
//! engine.get("/health", handler_fn(|ctx| Box::pin(async move {
//!     ctx.respond(&ApiResponse::success(serde_json::json!({"status": "ok"})));
//! })))?;
//!
//! let engine = Arc::new(engine);
//! let server = kumi::server::Server::bind("0.0.0.0:8080".parse()?, engine).await?;
//! kumi::server::serve(vec![server], Default::default(), std::time::Duration::from_secs(30)).await?;
//! ```

/// Package version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod cache_control;
pub mod config;
pub mod core;
pub mod cors;
pub mod engine;
pub mod handler;
pub mod logging;
pub mod middleware;
pub mod response;
pub mod router;
pub mod server;
pub mod validator;

// Re-exports for convenience
pub use cache_control::CacheControl;
pub use config::Config;
pub use core::{Context, Request, ResponseWriter};
pub use cors::CorsOptions;
pub use engine::{Engine, EngineConfig, Group, RouteError};
pub use handler::{handler_fn, Chain, Handler, HandlerRef};
pub use response::{ApiError, ApiResponse, Paging};
pub use server::{serve, ServeError, Server, ShutdownSignal};
pub use validator::Validator;
