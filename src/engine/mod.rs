//! The engine: router, global handlers and per-request dispatch.
//!
//! Route registration has side effects:
//!
//! - `GET` also registers `HEAD` with the same chain (the writer suppresses
//!   the body) unless `HEAD` was registered explicitly.
//! - Every route also registers `OPTIONS`, answered by [`OptionsHandler`]
//!   behind the CORS negotiator when CORS is configured.
//!
//! Explicit registrations replace automatic ones; registering the same
//! method and pattern explicitly twice is an error.
//!
//! # Example
//!
//! ```rust,ignore
//! use kumi::engine::{Engine, EngineConfig};
//! use kumi::handler::handler_fn;
//!
//! let mut engine = Engine::new(EngineConfig::default());
//! engine.get("/health", handler_fn(|ctx| Box::pin(async move {
//!     let _ = ctx.write_str("ok");
//! })))?;
//! ```

mod fallback;
mod group;

use std::collections::HashSet;
use std::sync::Arc;

use bytes::Bytes;
use http::header::{self, HeaderValue};
use http::Method;
use http_body_util::Full;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::core::{ContextPool, Request, ResponseWriter, DEFAULT_POOL_CAPACITY};
use crate::cors::{Cors, CorsOptions};
use crate::handler::{Chain, Handler};
use crate::response::{ApiResponse, Formatter, JSON_FORMATTER};
use crate::router::{join_methods, Lookup, MatchitRouter, Pattern, Router};

pub use crate::router::RouteError;
pub use fallback::{MethodNotAllowed, NotFound, OptionsHandler};
pub use group::Group;

/// Default cap on request bodies read by the server (10 MiB).
pub const DEFAULT_MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Generates per-method registration shortcuts for a type exposing
/// `handle(Method, &str, impl Into<Chain>)`.
macro_rules! verb_methods {
    ($($name:ident => $method:ident),* $(,)?) => {
        $(
            pub fn $name(
                &mut self,
                pattern: &str,
                chain: impl Into<$crate::handler::Chain>,
            ) -> Result<(), $crate::router::RouteError> {
                self.handle(::http::Method::$method, pattern, chain)
            }
        )*
    };
}
pub(crate) use verb_methods;

/// Engine settings.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Envelope formatter used by [`Context::respond`](crate::core::Context::respond).
    pub formatter: Formatter,
    pub pool_capacity: usize,
    /// Largest request body the server reads; larger bodies get 413.
    pub max_body_bytes: usize,
    /// CORS applied to every route registered after it is set.
    pub cors: Option<CorsOptions>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            formatter: JSON_FORMATTER,
            pool_capacity: DEFAULT_POOL_CAPACITY,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            cors: None,
        }
    }
}

impl EngineConfig {
    pub fn with_formatter(mut self, formatter: Formatter) -> Self {
        self.formatter = formatter;
        self
    }

    pub fn with_pool_capacity(mut self, capacity: usize) -> Self {
        self.pool_capacity = capacity;
        self
    }

    pub fn with_max_body_bytes(mut self, limit: usize) -> Self {
        self.max_body_bytes = limit;
        self
    }

    pub fn with_cors(mut self, cors: CorsOptions) -> Self {
        self.cors = Some(cors);
        self
    }
}

/// Owns the router and global handlers and turns requests into responses.
pub struct Engine {
    config: EngineConfig,
    router: Box<dyn Router>,
    globals: Chain,
    pool: ContextPool,
    /// Routes added as side effects of registration.
    auto_routes: HashSet<(Method, String)>,
    not_found: Chain,
    method_not_allowed: Chain,
    /// Parent of every request's cancellation token.
    root: CancellationToken,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl Engine {
    /// Engine backed by a [`MatchitRouter`].
    pub fn new(config: EngineConfig) -> Self {
        Self::with_router(config, MatchitRouter::new())
    }

    pub fn with_router<R: Router>(config: EngineConfig, router: R) -> Self {
        let pool = ContextPool::new(config.pool_capacity);
        Self {
            config,
            router: Box::new(router),
            globals: Chain::new(),
            pool,
            auto_routes: HashSet::new(),
            not_found: Chain::from(NotFound),
            method_not_allowed: Chain::from(MethodNotAllowed),
            root: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn router(&self) -> &dyn Router {
        self.router.as_ref()
    }

    /// Token cancelled when the server stops; request tokens derive from it.
    pub fn root_token(&self) -> &CancellationToken {
        &self.root
    }

    /// Contexts idle in the pool.
    pub fn pooled_contexts(&self) -> usize {
        self.pool.idle()
    }

    /// Append a handler run for every request, matched or not.
    pub fn use_handler<H: Handler>(&mut self, handler: H) -> &mut Self {
        self.globals = std::mem::take(&mut self.globals).with(handler);
        self
    }

    /// Append several global handlers.
    pub fn use_chain(&mut self, chain: impl Into<Chain>) -> &mut Self {
        self.globals = self.globals.extend(&chain.into());
        self
    }

    /// Global handlers in execution order.
    pub fn globals(&self) -> &Chain {
        &self.globals
    }

    /// Replace the 404 fallback chain.
    pub fn not_found(&mut self, chain: impl Into<Chain>) -> &mut Self {
        self.router.set_not_found(chain.into());
        self
    }

    /// Replace the 405 fallback chain. `Allow` is set before it runs.
    pub fn method_not_allowed(&mut self, chain: impl Into<Chain>) -> &mut Self {
        self.router.set_method_not_allowed(chain.into());
        self
    }

    pub fn handle(
        &mut self,
        method: Method,
        pattern: &str,
        chain: impl Into<Chain>,
    ) -> Result<(), RouteError> {
        self.register(method, pattern, chain.into(), None)
    }

    /// Register a route whose CORS options are `cors` layered over the
    /// global ones.
    pub fn handle_with_cors(
        &mut self,
        method: Method,
        pattern: &str,
        cors: CorsOptions,
        chain: impl Into<Chain>,
    ) -> Result<(), RouteError> {
        self.register(method, pattern, chain.into(), Some(cors))
    }

    verb_methods! {
        get => GET,
        head => HEAD,
        post => POST,
        put => PUT,
        patch => PATCH,
        delete => DELETE,
        options => OPTIONS,
    }

    /// Open a group under `prefix` whose routes start with `chain`.
    pub fn group(&mut self, prefix: &str, chain: impl Into<Chain>) -> Group<'_> {
        Group::new(self, prefix, chain.into())
    }

    /// Whether `method` is registered on `pattern`, automatically or not.
    pub fn has_route(&self, method: &Method, pattern: &str) -> bool {
        self.router.has_route(method, pattern)
    }

    pub(crate) fn register(
        &mut self,
        method: Method,
        pattern: &str,
        chain: Chain,
        cors: Option<CorsOptions>,
    ) -> Result<(), RouteError> {
        let pattern = Pattern::parse(pattern)?.to_string();
        if chain.is_empty() {
            return Err(RouteError::EmptyChain { method, pattern });
        }
        let key = (method.clone(), pattern.clone());
        if self.router.has_route(&method, &pattern) && !self.auto_routes.contains(&key) {
            return Err(RouteError::Duplicate { method, pattern });
        }

        let cors = match (&self.config.cors, cors) {
            (Some(global), Some(route)) => Some(global.merge(&route)),
            (global, route) => route.or_else(|| global.clone()),
        };
        let cors = cors.map(|opts| Arc::new(Cors::new(opts)) as Arc<dyn Handler>);
        let chain = match &cors {
            Some(cors) => chain.prepend(Arc::clone(cors)),
            None => chain,
        };

        self.router.handle(method.clone(), &pattern, chain.clone())?;
        self.auto_routes.remove(&key);
        debug!(method = %method, pattern = %pattern, handlers = ?chain, "route registered");

        if method == Method::GET {
            self.register_auto(Method::HEAD, &pattern, chain)?;
        }
        if method != Method::OPTIONS {
            let options = match cors {
                Some(cors) => Chain::new().with_arc(cors).with(OptionsHandler),
                None => Chain::from(OptionsHandler),
            };
            self.register_auto(Method::OPTIONS, &pattern, options)?;
        }
        Ok(())
    }

    /// Add or refresh a side-effect route. Explicit routes are left alone.
    fn register_auto(&mut self, method: Method, pattern: &str, chain: Chain) -> Result<(), RouteError> {
        let key = (method.clone(), pattern.to_string());
        if self.router.has_route(&method, pattern) && !self.auto_routes.contains(&key) {
            return Ok(());
        }
        self.router.handle(method, pattern, chain)?;
        self.auto_routes.insert(key);
        Ok(())
    }

    /// Run one request through the chain and return the response.
    ///
    /// `disconnect` is cancelled by the connection when the client goes away.
    pub async fn serve_request(
        &self,
        request: Request,
        disconnect: CancellationToken,
    ) -> http::Response<Full<Bytes>> {
        let lookup = self.router.lookup(request.method(), request.path());

        let mut ctx = self.pool.acquire();
        ctx.prepare(request, self.root.child_token(), disconnect, self.config.formatter);
        ctx.push_chain(&self.globals);

        match lookup {
            Lookup::Found {
                chain,
                params,
                allowed,
            } => {
                ctx.set_params(params);
                ctx.set_allowed_methods(allowed);
                ctx.push_chain(chain);
            }
            Lookup::MethodNotAllowed { allowed } => {
                if let Ok(value) = HeaderValue::from_str(&join_methods(&allowed)) {
                    ctx.header_mut().insert(header::ALLOW, value);
                }
                ctx.set_allowed_methods(allowed);
                ctx.push_chain(
                    self.router
                        .method_not_allowed()
                        .unwrap_or(&self.method_not_allowed),
                );
            }
            Lookup::NotFound => {
                ctx.push_chain(self.router.not_found().unwrap_or(&self.not_found));
            }
        }

        ctx.next().await;

        let response = match ctx.writer_mut().take_response() {
            Ok(response) => response,
            Err(e) => {
                error!(request_id = %ctx.request_id(), error = %e, "failed to finish response body");
                internal_error()
            }
        };
        self.pool.release(ctx);
        response
    }

    /// Render an envelope without running any chain.
    ///
    /// Used for failures detected before dispatch, such as an oversized body.
    pub fn render(&self, method: &Method, response: &ApiResponse) -> http::Response<Full<Bytes>> {
        let mut writer = if *method == Method::HEAD {
            ResponseWriter::for_head()
        } else {
            ResponseWriter::new()
        };
        if let Err(e) = (self.config.formatter)(response, &mut writer) {
            error!(error = %e, "failed to format response");
            return internal_error();
        }
        writer.take_response().unwrap_or_else(|e| {
            error!(error = %e, "failed to finish response body");
            internal_error()
        })
    }

    /// Dispatch an in-memory request. Mostly useful in tests.
    pub async fn dispatch(&self, request: http::Request<Bytes>) -> http::Response<Full<Bytes>> {
        self.serve_request(Request::from(request), CancellationToken::new())
            .await
    }
}

fn internal_error() -> http::Response<Full<Bytes>> {
    let mut response = http::Response::new(Full::new(Bytes::new()));
    *response.status_mut() = http::StatusCode::INTERNAL_SERVER_ERROR;
    response
}
