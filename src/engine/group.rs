//! Route groups.

use http::Method;

use super::Engine;
use crate::cors::CorsOptions;
use crate::handler::Chain;
use crate::router::RouteError;

/// Registration scope sharing a path prefix and leading handlers.
///
/// A nested group extends the parent's prefix and chain; the parent is never
/// modified.
pub struct Group<'e> {
    engine: &'e mut Engine,
    prefix: String,
    chain: Chain,
}

impl<'e> Group<'e> {
    pub(super) fn new(engine: &'e mut Engine, prefix: &str, chain: Chain) -> Self {
        Self {
            engine,
            prefix: prefix.trim_end_matches('/').to_string(),
            chain,
        }
    }

    pub fn prefix(&self) -> &str {
        if self.prefix.is_empty() {
            "/"
        } else {
            &self.prefix
        }
    }

    /// Handlers every route of this group starts with.
    pub fn chain(&self) -> &Chain {
        &self.chain
    }

    pub fn group(&mut self, prefix: &str, chain: impl Into<Chain>) -> Group<'_> {
        let prefix = join_path(&self.prefix, prefix);
        let chain = self.chain.extend(&chain.into());
        Group::new(&mut *self.engine, &prefix, chain)
    }

    pub fn handle(
        &mut self,
        method: Method,
        pattern: &str,
        chain: impl Into<Chain>,
    ) -> Result<(), RouteError> {
        let (pattern, chain) = self.scoped(method.clone(), pattern, chain.into())?;
        self.engine.register(method, &pattern, chain, None)
    }

    pub fn handle_with_cors(
        &mut self,
        method: Method,
        pattern: &str,
        cors: CorsOptions,
        chain: impl Into<Chain>,
    ) -> Result<(), RouteError> {
        let (pattern, chain) = self.scoped(method.clone(), pattern, chain.into())?;
        self.engine.register(method, &pattern, chain, Some(cors))
    }

    fn scoped(
        &self,
        method: Method,
        pattern: &str,
        chain: Chain,
    ) -> Result<(String, Chain), RouteError> {
        let pattern = join_path(&self.prefix, pattern);
        if chain.is_empty() {
            return Err(RouteError::EmptyChain { method, pattern });
        }
        Ok((pattern, self.chain.extend(&chain)))
    }

    super::verb_methods! {
        get => GET,
        head => HEAD,
        post => POST,
        put => PUT,
        patch => PATCH,
        delete => DELETE,
        options => OPTIONS,
    }
}

/// `"/api" + "/users"` -> `"/api/users"`; a bare `/` maps to the prefix.
pub(super) fn join_path(prefix: &str, path: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    match path {
        "" | "/" if !prefix.is_empty() => prefix.to_string(),
        _ if path.starts_with('/') => format!("{}{}", prefix, path),
        _ => format!("{}/{}", prefix, path),
    }
}
