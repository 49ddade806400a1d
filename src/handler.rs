//! Handlers and handler chains.
//!
//! Every piece of request processing, from CORS negotiation to the final
//! endpoint, is a [`Handler`]. A request runs an ordered [`Chain`] of them:
//! engine-global handlers first, then group handlers, then the handlers given
//! at route registration.
//!
//! A handler continues the chain with [`Context::next`]; not calling it stops
//! the request there.
//!
//! ```text
//! Recoverer ─▶ AccessLog ─▶ Cors ─▶ endpoint
//!     ▲            ▲          │
//!     └────────────┴──────────┘  unwinds in reverse after the endpoint returns
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use kumi::handler::{handler_fn, Chain};
//!
//! let hello = handler_fn(|ctx| Box::pin(async move {
//!     let _ = ctx.write_str("hello");
//! }));
//!
//! let chain = Chain::new().with(Recoverer::new()).with(hello);
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::BoxFuture;

use crate::core::Context;

/// One step of request processing.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    /// Process the request. Call `ctx.next().await` to run the rest of the
    /// chain; code after that call runs on the way back out.
    async fn call(&self, ctx: &mut Context);

    /// Name used in logs.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Shared, type-erased handler.
pub type HandlerRef = Arc<dyn Handler>;

/// Handler backed by a closure, see [`handler_fn`].
pub struct FnHandler<F> {
    f: F,
    name: &'static str,
}

/// Wrap a closure returning a boxed future as a [`Handler`].
pub fn handler_fn<F>(f: F) -> FnHandler<F>
where
    F: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, ()> + Send + Sync + 'static,
{
    FnHandler { f, name: "fn" }
}

impl<F> FnHandler<F> {
    /// Give the handler a readable name for logs.
    pub fn named(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }
}

#[async_trait]
impl<F> Handler for FnHandler<F>
where
    F: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, ()> + Send + Sync + 'static,
{
    async fn call(&self, ctx: &mut Context) {
        (self.f)(ctx).await
    }

    fn name(&self) -> &'static str {
        self.name
    }
}

/// An ordered list of handlers.
///
/// Chains only grow by appending; [`Chain::extend`] returns a new chain and
/// leaves `self` untouched so groups never alter their parent.
#[derive(Clone, Default)]
pub struct Chain {
    handlers: Vec<HandlerRef>,
}

impl Chain {
    /// Create a new empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a handler.
    pub fn with<H: Handler>(mut self, handler: H) -> Self {
        self.handlers.push(Arc::new(handler));
        self
    }

    /// Append an already shared handler.
    pub fn with_arc(mut self, handler: HandlerRef) -> Self {
        self.handlers.push(handler);
        self
    }

    /// Put a handler in front of every other one.
    pub fn prepend(mut self, handler: HandlerRef) -> Self {
        self.handlers.insert(0, handler);
        self
    }

    /// New chain made of `self` followed by `other`.
    pub fn extend(&self, other: &Chain) -> Chain {
        let mut handlers = Vec::with_capacity(self.len() + other.len());
        handlers.extend(self.handlers.iter().cloned());
        handlers.extend(other.handlers.iter().cloned());
        Chain { handlers }
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Handler names in execution order.
    pub fn names(&self) -> Vec<&'static str> {
        self.handlers.iter().map(|h| h.name()).collect()
    }

    pub fn handlers(&self) -> &[HandlerRef] {
        &self.handlers
    }
}

impl std::fmt::Debug for Chain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

impl<H: Handler> From<H> for Chain {
    fn from(handler: H) -> Self {
        Chain::new().with(handler)
    }
}

impl From<HandlerRef> for Chain {
    fn from(handler: HandlerRef) -> Self {
        Chain::new().with_arc(handler)
    }
}

impl From<Vec<HandlerRef>> for Chain {
    fn from(handlers: Vec<HandlerRef>) -> Self {
        Chain { handlers }
    }
}
