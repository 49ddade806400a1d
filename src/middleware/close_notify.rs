//! Client disconnect propagation.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::core::Context;
use crate::handler::Handler;

/// Cancels the request token when the client disconnects.
///
/// Spawns one watcher per request racing the request token, the disconnect
/// token and the chain's completion. The watcher always exits: returning
/// from (or dropping) this handler completes the race.
#[derive(Clone, Copy, Debug, Default)]
pub struct CloseNotify;

impl CloseNotify {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Handler for CloseNotify {
    async fn call(&self, ctx: &mut Context) {
        let request = ctx.cancel_token().clone();
        let disconnect = ctx.disconnect_token().clone();
        let done = CancellationToken::new();
        let _done_guard = done.clone().drop_guard();
        let request_id = ctx.request_id().to_string();

        tokio::spawn(async move {
            tokio::select! {
                _ = disconnect.cancelled() => {
                    debug!(request_id = %request_id, "client disconnected, cancelling request");
                    request.cancel();
                }
                _ = request.cancelled() => {}
                _ = done.cancelled() => {}
            }
        });

        ctx.next().await;
    }

    fn name(&self) -> &'static str {
        "close_notify"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{handler_fn, Chain};
    use http::Method;
    use std::time::Duration;

    #[tokio::test]
    async fn test_disconnect_cancels_request() {
        let mut ctx = Context::for_test(Method::GET, "/stream");
        let disconnect = ctx.disconnect_token().clone();
        ctx.set_chain(&Chain::new().with(CloseNotify::new()).with(handler_fn(
            move |ctx| {
                let disconnect = disconnect.clone();
                Box::pin(async move {
                    disconnect.cancel();
                    let token = ctx.cancel_token().clone();
                    tokio::time::timeout(Duration::from_secs(5), token.cancelled())
                        .await
                        .expect("request token cancelled");
                    ctx.set("cancelled", true);
                })
            },
        )));
        ctx.next().await;

        assert!(ctx.is_cancelled());
        assert_eq!(ctx.get::<bool>("cancelled"), Some(&true));
    }

    #[tokio::test]
    async fn test_normal_completion_leaves_token() {
        let mut ctx = Context::for_test(Method::GET, "/ok");
        ctx.set_chain(&Chain::new().with(CloseNotify::new()).with(handler_fn(|ctx| {
            Box::pin(async move {
                let _ = ctx.write_str("ok");
            })
        })));
        ctx.next().await;
        tokio::task::yield_now().await;

        assert!(!ctx.is_cancelled());
        assert_eq!(ctx.status(), 200);
    }
}
