//! Radix-trie router backed by `matchit`.

use std::collections::HashMap;

use http::Method;
use tracing::debug;

use super::{decode_params, outcome, Lookup, Pattern, RouteError, RouteTable, Router};
use crate::handler::Chain;

/// Router using one `matchit` radix trie per method.
///
/// Static segments take priority over parameters, so `/users/me` and
/// `/users/:id` can coexist. Each method resolves in its own trie, so a
/// request reaches the most specific pattern registered for its method.
/// Two parameters with different names at the same position conflict
/// within a method.
#[derive(Default)]
pub struct MatchitRouter {
    tries: HashMap<Method, matchit::Router<usize>>,
    table: RouteTable,
}

impl MatchitRouter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Router for MatchitRouter {
    fn name(&self) -> &'static str {
        "matchit"
    }

    fn handle(&mut self, method: Method, pattern: &str, chain: Chain) -> Result<(), RouteError> {
        let parsed = Pattern::parse(pattern)?;
        let idx = self
            .table
            .index_of(&parsed)
            .unwrap_or_else(|| self.table.next_index());
        if self.table.chain(idx, &method).is_none() {
            self.tries
                .entry(method.clone())
                .or_insert_with(matchit::Router::new)
                .insert(parsed.to_matchit(), idx)
                .map_err(|e| match e {
                    matchit::InsertError::Conflict { with } => RouteError::Conflict {
                        pattern: pattern.to_string(),
                        existing: with,
                    },
                    other => RouteError::InvalidPattern {
                        pattern: pattern.to_string(),
                        reason: other.to_string(),
                    },
                })?;
            debug!(router = "matchit", method = %method, pattern, idx, "new route");
        }
        self.table.upsert(parsed, method, chain);
        Ok(())
    }

    fn lookup(&self, method: &Method, path: &str) -> Lookup<'_> {
        let allowed: Vec<Method> = self
            .tries
            .iter()
            .filter(|(_, trie)| trie.at(path).is_ok())
            .map(|(m, _)| m.clone())
            .collect();

        let found = self
            .tries
            .get(method)
            .and_then(|trie| trie.at(path).ok())
            .and_then(|matched| {
                let chain = self.table.chain(*matched.value, method)?;
                Some((chain, decode_params(matched.params.iter())))
            });
        outcome(found, allowed)
    }

    fn has_route(&self, method: &Method, pattern: &str) -> bool {
        self.table.has_route(method, pattern)
    }

    fn set_not_found(&mut self, chain: Chain) {
        self.table.set_not_found(chain);
    }

    fn not_found(&self) -> Option<&Chain> {
        self.table.not_found()
    }

    fn set_method_not_allowed(&mut self, chain: Chain) {
        self.table.set_method_not_allowed(chain);
    }

    fn method_not_allowed(&self) -> Option<&Chain> {
        self.table.method_not_allowed()
    }
}
