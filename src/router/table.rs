//! Method table shared by the router adapters.

use std::collections::HashMap;

use http::Method;
use percent_encoding::percent_decode_str;

use super::{sort_methods, Lookup, Pattern};
use crate::core::Params;
use crate::handler::Chain;

/// Chains registered for one pattern, keyed by method.
struct RouteEntry {
    methods: Vec<(Method, Chain)>,
}

impl RouteEntry {
    fn chain(&self, method: &Method) -> Option<&Chain> {
        self.methods
            .iter()
            .find(|(m, _)| m == method)
            .map(|(_, c)| c)
    }
}

/// Pattern-indexed route storage plus the fallback chains.
///
/// Adapters own the path matching and hand back an index into this table.
#[derive(Default)]
pub(crate) struct RouteTable {
    routes: Vec<RouteEntry>,
    by_pattern: HashMap<String, usize>,
    not_found: Option<Chain>,
    method_not_allowed: Option<Chain>,
}

impl RouteTable {
    pub(crate) fn index_of(&self, pattern: &Pattern) -> Option<usize> {
        self.by_pattern.get(&pattern.to_string()).copied()
    }

    /// Index the next new pattern will get.
    pub(crate) fn next_index(&self) -> usize {
        self.routes.len()
    }

    /// Register or replace a chain, returning the pattern's index.
    pub(crate) fn upsert(&mut self, pattern: Pattern, method: Method, chain: Chain) -> usize {
        let idx = match self.index_of(&pattern) {
            Some(idx) => idx,
            None => {
                let idx = self.routes.len();
                self.by_pattern.insert(pattern.to_string(), idx);
                self.routes.push(RouteEntry {
                    methods: Vec::new(),
                });
                idx
            }
        };
        let entry = &mut self.routes[idx];
        match entry.methods.iter_mut().find(|(m, _)| *m == method) {
            Some(slot) => slot.1 = chain,
            None => entry.methods.push((method, chain)),
        }
        idx
    }

    pub(crate) fn has_route(&self, method: &Method, pattern: &str) -> bool {
        let Ok(pattern) = Pattern::parse(pattern) else {
            return false;
        };
        self.index_of(&pattern)
            .and_then(|idx| self.routes[idx].chain(method))
            .is_some()
    }

    /// Chain registered for `method` on the pattern at `idx`.
    pub(crate) fn chain(&self, idx: usize, method: &Method) -> Option<&Chain> {
        self.routes.get(idx).and_then(|entry| entry.chain(method))
    }

    /// Methods registered on the pattern at `idx`.
    pub(crate) fn methods(&self, idx: usize) -> impl Iterator<Item = &Method> {
        self.routes
            .get(idx)
            .into_iter()
            .flat_map(|entry| entry.methods.iter().map(|(m, _)| m))
    }

    pub(crate) fn set_not_found(&mut self, chain: Chain) {
        self.not_found = Some(chain);
    }

    pub(crate) fn not_found(&self) -> Option<&Chain> {
        self.not_found.as_ref()
    }

    pub(crate) fn set_method_not_allowed(&mut self, chain: Chain) {
        self.method_not_allowed = Some(chain);
    }

    pub(crate) fn method_not_allowed(&self) -> Option<&Chain> {
        self.method_not_allowed.as_ref()
    }
}

/// Percent-decode raw captures into [`Params`].
pub(crate) fn decode_params<'a, I>(raw: I) -> Params
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    raw.into_iter()
        .map(|(k, v)| (k, percent_decode_str(v).decode_utf8_lossy().into_owned()))
        .collect()
}

/// Turn a match result into a [`Lookup`].
///
/// `allowed` holds the methods of every pattern matching the path, so a
/// 405 lists all of them even when patterns overlap.
pub(crate) fn outcome(found: Option<(&Chain, Params)>, mut allowed: Vec<Method>) -> Lookup<'_> {
    sort_methods(&mut allowed);
    match found {
        Some((chain, params)) => Lookup::Found {
            chain,
            params,
            allowed,
        },
        None if allowed.is_empty() => Lookup::NotFound,
        None => Lookup::MethodNotAllowed { allowed },
    }
}
