//! Access logging middleware.
//!
//! Logs one line per request with target `access` after the chain returns,
//! so the status and byte count are final.

use async_trait::async_trait;

use crate::core::Context;
use crate::handler::Handler;

/// Access logging middleware.
#[derive(Clone, Copy, Debug, Default)]
pub struct AccessLog;

impl AccessLog {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Handler for AccessLog {
    async fn call(&self, ctx: &mut Context) {
        ctx.next().await;

        let request = ctx.request();
        // Nothing written yet means the engine will send an empty 200.
        let status = match ctx.status() {
            0 => 200,
            status => status,
        };
        let ip = request.remote_addr().map(|addr| addr.ip().to_string());

        tracing::info!(
            target: "access",
            method = %request.method(),
            path = request.path(),
            query = request.query(),
            status = status,
            bytes = ctx.writer().bytes_written(),
            duration_ms = ctx.elapsed_ms(),
            ip = ip.as_deref(),
            ua = request.user_agent(),
            referer = request.referer(),
            request_id = ctx.request_id(),
            panicked = ctx.panic().is_some(),
            ""
        );
    }

    fn name(&self) -> &'static str {
        "access_log"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{handler_fn, Chain};
    use http::{Method, StatusCode};

    #[tokio::test]
    async fn test_passes_through() {
        let mut ctx = Context::for_test(Method::POST, "/items?x=1");
        ctx.set_chain(&Chain::new().with(AccessLog::new()).with(handler_fn(|ctx| {
            Box::pin(async move {
                ctx.write_header(StatusCode::ACCEPTED);
            })
        })));
        ctx.next().await;

        assert_eq!(ctx.status(), 202);
        assert_eq!(ctx.remaining(), 0);
    }
}
