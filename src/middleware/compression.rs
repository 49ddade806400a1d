//! Gzip response compression.
//!
//! Negotiated from `Accept-Encoding`. The writer decides at header commit
//! whether compression actually happens: never for HEAD, 204, or a response
//! that already set `Content-Encoding`. `Vary: Accept-Encoding` is added
//! whenever compression was offered.

use async_trait::async_trait;
use http::Method;
use tracing::warn;

use crate::core::Context;
use crate::handler::Handler;

/// Default compression level (1-9).
pub const DEFAULT_LEVEL: u32 = 6;

/// Gzip-encodes response bodies for clients that accept it.
#[derive(Clone, Copy, Debug)]
pub struct Gzip {
    level: u32,
}

impl Default for Gzip {
    fn default() -> Self {
        Self::new(DEFAULT_LEVEL)
    }
}

impl Gzip {
    pub fn new(level: u32) -> Self {
        Self {
            level: level.clamp(1, 9),
        }
    }

    pub fn level(&self) -> u32 {
        self.level
    }
}

#[async_trait]
impl Handler for Gzip {
    async fn call(&self, ctx: &mut Context) {
        if ctx.method() != Method::HEAD && ctx.request().accepts_gzip() {
            ctx.writer_mut().enable_gzip(self.level);
        }

        ctx.next().await;

        // Runs after everything downstream, before the context is released.
        if let Err(e) = ctx.writer_mut().finish() {
            warn!(request_id = %ctx.request_id(), error = %e, "failed to finish gzip stream");
        }
    }

    fn name(&self) -> &'static str {
        "gzip"
    }
}
