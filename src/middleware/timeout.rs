//! Request deadline.

use std::time::Duration;

use async_trait::async_trait;
use http::StatusCode;
use tracing::warn;

use crate::core::Context;
use crate::handler::Handler;
use crate::response::ApiResponse;

/// Bounds the rest of the chain by a deadline.
///
/// Downstream handlers see a child cancellation token. When the deadline
/// passes, the downstream future is dropped, the token is cancelled and a
/// 504 envelope is written if nothing was sent yet.
#[derive(Clone, Copy, Debug)]
pub struct Timeout {
    duration: Duration,
}

impl Timeout {
    pub fn new(duration: Duration) -> Self {
        Self { duration }
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }
}

#[async_trait]
impl Handler for Timeout {
    async fn call(&self, ctx: &mut Context) {
        let token = ctx.cancel_token().child_token();
        let parent = ctx.replace_cancel_token(token.clone());

        let timed_out = tokio::time::timeout(self.duration, ctx.next())
            .await
            .is_err();

        ctx.replace_cancel_token(parent);
        if !timed_out {
            return;
        }

        token.cancel();
        ctx.abort();
        warn!(
            request_id = %ctx.request_id(),
            path = %ctx.path(),
            timeout_ms = self.duration.as_millis() as u64,
            "request timed out"
        );
        if !ctx.writer().header_written() {
            ctx.respond(&ApiResponse::error(
                StatusCode::GATEWAY_TIMEOUT,
                "request timed out",
            ));
        }
    }

    fn name(&self) -> &'static str {
        "timeout"
    }
}
