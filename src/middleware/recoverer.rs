//! Panic recovery.

use std::any::Any;
use std::panic::AssertUnwindSafe;

use async_trait::async_trait;
use futures_util::FutureExt;
use http::StatusCode;
use tracing::error;

use crate::core::Context;
use crate::handler::Handler;
use crate::response::ApiResponse;

/// Catches panics from the rest of the chain.
///
/// The payload goes to the context's panic slot and the error log, never to
/// the client. The client gets a 500 envelope unless headers were already
/// sent.
#[derive(Clone, Copy, Debug, Default)]
pub struct Recoverer;

impl Recoverer {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Handler for Recoverer {
    async fn call(&self, ctx: &mut Context) {
        let outcome = AssertUnwindSafe(ctx.next()).catch_unwind().await;
        let Err(payload) = outcome else {
            return;
        };

        let message = panic_message(payload.as_ref());
        error!(
            request_id = %ctx.request_id(),
            method = %ctx.method(),
            path = %ctx.path(),
            panic = %message,
            "handler panicked"
        );
        ctx.set_panic(message);
        ctx.abort();

        if !ctx.writer().header_written() {
            ctx.respond(&ApiResponse::error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal server error",
            ));
        }
    }

    fn name(&self) -> &'static str {
        "recoverer"
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
