//! Built-in handlers the engine registers on its own.

use async_trait::async_trait;
use http::header::{self, HeaderValue};
use http::StatusCode;

use crate::core::Context;
use crate::cors::allow_methods;
use crate::handler::Handler;
use crate::response::ApiResponse;
use crate::router::join_methods;

/// Answers `OPTIONS` with `Allow` and 204. Registered automatically for
/// every route.
#[derive(Clone, Copy, Debug, Default)]
pub struct OptionsHandler;

#[async_trait]
impl Handler for OptionsHandler {
    async fn call(&self, ctx: &mut Context) {
        let allow = join_methods(&allow_methods(ctx.allowed_methods()));
        if let Ok(value) = HeaderValue::from_str(&allow) {
            ctx.header_mut().insert(header::ALLOW, value);
        }
        ctx.write_header(StatusCode::NO_CONTENT);
    }

    fn name(&self) -> &'static str {
        "options"
    }
}

/// Default 404: error envelope through the engine formatter.
#[derive(Clone, Copy, Debug, Default)]
pub struct NotFound;

#[async_trait]
impl Handler for NotFound {
    async fn call(&self, ctx: &mut Context) {
        let message = format!("no route for {}", ctx.path());
        ctx.respond(&ApiResponse::error(StatusCode::NOT_FOUND, message));
    }

    fn name(&self) -> &'static str {
        "not_found"
    }
}

/// Default 405. The engine sets `Allow` before this runs.
#[derive(Clone, Copy, Debug, Default)]
pub struct MethodNotAllowed;

#[async_trait]
impl Handler for MethodNotAllowed {
    async fn call(&self, ctx: &mut Context) {
        let message = format!("method {} not allowed", ctx.method());
        ctx.respond(&ApiResponse::error(StatusCode::METHOD_NOT_ALLOWED, message));
    }

    fn name(&self) -> &'static str {
        "method_not_allowed"
    }
}
