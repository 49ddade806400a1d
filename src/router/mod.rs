//! Router adapters.
//!
//! The engine talks to URL routers through the [`Router`] trait: register a
//! chain for a method and pattern, look a request up, report whether a route
//! exists, and hold the 404/405 fallback chains. Two adapters ship with the
//! crate:
//!
//! - [`MatchitRouter`] - radix trie backed by the `matchit` crate
//! - [`RegexRouter`] - ordered list of compiled regular expressions
//!
//! Both accept the same pattern syntax:
//!
//! | Pattern | Matches |
//! |---------|---------|
//! | `/users` | exactly `/users` |
//! | `/users/:id` | one segment, captured as `id` |
//! | `/files/*path` | the non-empty rest of the path, captured as `path` |

mod pattern;
mod regexp;
mod table;
mod trie;

use http::Method;

use crate::core::Params;
use crate::handler::Chain;

pub use regexp::RegexRouter;
pub use pattern::{Pattern, Segment};
pub use trie::MatchitRouter;

pub(crate) use table::{decode_params, outcome, RouteTable};

/// Errors raised while registering routes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RouteError {
    #[error("invalid route pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("route {method} {pattern} is already registered")]
    Duplicate { method: Method, pattern: String },

    #[error("route {method} {pattern} has no handlers")]
    EmptyChain { method: Method, pattern: String },

    #[error("route pattern {pattern:?} conflicts with {existing:?}")]
    Conflict { pattern: String, existing: String },
}

/// Outcome of matching a request against the registered routes.
#[derive(Debug)]
pub enum Lookup<'a> {
    /// A chain is registered for the method and path.
    Found {
        chain: &'a Chain,
        params: Params,
        /// Every method registered on a pattern matching the path.
        allowed: Vec<Method>,
    },
    /// The path exists but not for this method.
    MethodNotAllowed { allowed: Vec<Method> },
    NotFound,
}

/// Capability set the engine needs from a URL router.
pub trait Router: Send + Sync + 'static {
    /// Adapter name for logs.
    fn name(&self) -> &'static str;

    /// Register `chain` for `method` on `pattern`, replacing any chain
    /// already registered for that exact pair.
    fn handle(&mut self, method: Method, pattern: &str, chain: Chain) -> Result<(), RouteError>;

    /// Match a request path. Parameters come back fully decoded.
    fn lookup(&self, method: &Method, path: &str) -> Lookup<'_>;

    /// Whether `method` is registered for this exact pattern.
    fn has_route(&self, method: &Method, pattern: &str) -> bool;

    fn set_not_found(&mut self, chain: Chain);

    fn not_found(&self) -> Option<&Chain>;

    fn set_method_not_allowed(&mut self, chain: Chain);

    fn method_not_allowed(&self) -> Option<&Chain>;
}

/// Sort methods by name so `Allow` headers are stable.
pub fn sort_methods(methods: &mut Vec<Method>) {
    methods.sort_by(|a, b| a.as_str().cmp(b.as_str()));
    methods.dedup();
}

/// `GET, HEAD, OPTIONS` style list.
pub fn join_methods(methods: &[Method]) -> String {
    methods
        .iter()
        .map(Method::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}
