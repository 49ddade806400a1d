//! Router over compiled regular expressions.

use http::Method;
use regex::Regex;
use tracing::debug;

use super::{decode_params, outcome, Lookup, Pattern, RouteError, RouteTable, Router};
use crate::handler::Chain;

struct CompiledRoute {
    regex: Regex,
    names: Vec<String>,
    /// Lower sorts first: static routes, then parameters, then catch-alls.
    rank: (bool, usize),
    idx: usize,
}

/// Router testing each pattern's regular expression in turn.
///
/// Candidates are ordered by specificity, fewest parameters first and
/// catch-alls last; routes of equal rank keep registration order. The first
/// candidate with a chain for the request method wins, and every matching
/// candidate contributes to the allowed methods.
#[derive(Default)]
pub struct RegexRouter {
    routes: Vec<CompiledRoute>,
    table: RouteTable,
}

impl RegexRouter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Router for RegexRouter {
    fn name(&self) -> &'static str {
        "regex"
    }

    fn handle(&mut self, method: Method, pattern: &str, chain: Chain) -> Result<(), RouteError> {
        let parsed = Pattern::parse(pattern)?;
        if self.table.index_of(&parsed).is_none() {
            let regex = Regex::new(&parsed.to_regex()).map_err(|e| RouteError::InvalidPattern {
                pattern: pattern.to_string(),
                reason: e.to_string(),
            })?;
            let names: Vec<String> = parsed.param_names().map(str::to_owned).collect();
            let rank = (parsed.has_catch_all(), names.len());
            let idx = self.table.next_index();

            let pos = self.routes.partition_point(|r| r.rank <= rank);
            self.routes.insert(
                pos,
                CompiledRoute {
                    regex,
                    names,
                    rank,
                    idx,
                },
            );
            debug!(router = "regex", pattern, idx, "new route pattern");
        }
        self.table.upsert(parsed, method, chain);
        Ok(())
    }

    fn lookup(&self, method: &Method, path: &str) -> Lookup<'_> {
        let mut found = None;
        let mut allowed = Vec::new();
        for route in &self.routes {
            let Some(caps) = route.regex.captures(path) else {
                continue;
            };
            allowed.extend(self.table.methods(route.idx).cloned());
            if found.is_some() {
                continue;
            }
            if let Some(chain) = self.table.chain(route.idx, method) {
                let raw = route.names.iter().filter_map(|name| {
                    caps.name(name).map(|m| (name.as_str(), m.as_str()))
                });
                found = Some((chain, decode_params(raw)));
            }
        }
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
