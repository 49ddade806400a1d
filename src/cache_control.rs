//! `Cache-Control` directive builder.
//!
//! [`CacheControl`] accumulates directives, serializes them in alphabetical
//! order and computes the defaults every response is finalized with (see
//! [`CacheControl::sensible_defaults`]).
//!
//! ```rust,ignore
//! let mut cc = CacheControl::new();
//! cc.set_public().set_max_age(300);
//! assert_eq!(cc.to_string(), "max-age=300, public");
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

use http::header::{CACHE_CONTROL, ETAG, EXPIRES, LAST_MODIFIED};
use http::{HeaderMap, HeaderValue, StatusCode};
use regex::Regex;

pub const PUBLIC: &str = "public";
pub const PRIVATE: &str = "private";
pub const MAX_AGE: &str = "max-age";
pub const S_MAXAGE: &str = "s-maxage";
pub const NO_CACHE: &str = "no-cache";
pub const NO_STORE: &str = "no-store";
pub const NO_TRANSFORM: &str = "no-transform";
pub const MUST_REVALIDATE: &str = "must-revalidate";

/// Shared max-age applied to permanent redirects when nothing else was set.
const REDIRECT_SHARED_MAX_AGE: u64 = 60;

/// `name[=value]` where value is a quoted string (with `\` escapes) or a
/// bare token.
static DIRECTIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?:^|,)\s*([A-Za-z0-9!#$%&'*+.^_`|~-]+)\s*(?:=\s*(?:"((?:[^"\\]|\\.)*)"|([^,\s]*)))?"#)
        .expect("invalid directive regex")
});

/// A set of `Cache-Control` directives.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CacheControl {
    directives: BTreeMap<String, Option<String>>,
}

impl CacheControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a `Cache-Control` header value.
    ///
    /// Unrecognizable fragments are skipped rather than reported.
    pub fn parse(value: &str) -> Self {
        let mut cc = Self::new();
        for caps in DIRECTIVE.captures_iter(value) {
            let name = &caps[1];
            match (caps.get(2), caps.get(3)) {
                (Some(quoted), _) => {
                    cc.add_directive_value(name, unescape(quoted.as_str()));
                }
                (None, Some(bare)) if !bare.as_str().is_empty() => {
                    cc.add_directive_value(name, bare.as_str());
                }
                _ => {
                    cc.add_directive(name);
                }
            }
        }
        cc
    }

    /// Add a value-less directive.
    pub fn add_directive(&mut self, name: &str) -> &mut Self {
        self.insert(name, None)
    }

    /// Add (or replace) a directive carrying a value.
    pub fn add_directive_value(&mut self, name: &str, value: impl Into<String>) -> &mut Self {
        self.insert(name, Some(value.into()))
    }

    pub fn remove_directive(&mut self, name: &str) -> &mut Self {
        self.directives.remove(&name.to_ascii_lowercase());
        self
    }

    /// Mark the response cacheable by shared caches. Clears `private`.
    pub fn set_public(&mut self) -> &mut Self {
        self.add_directive(PUBLIC)
    }

    /// Restrict the response to the user agent's cache. Clears `public`.
    pub fn set_private(&mut self) -> &mut Self {
        self.add_directive(PRIVATE)
    }

    pub fn set_max_age(&mut self, seconds: u64) -> &mut Self {
        self.add_directive_value(MAX_AGE, seconds.to_string())
    }

    pub fn set_shared_max_age(&mut self, seconds: u64) -> &mut Self {
        self.add_directive_value(S_MAXAGE, seconds.to_string())
    }

    pub fn no_cache(&mut self) -> &mut Self {
        self.add_directive(NO_CACHE)
    }

    pub fn no_store(&mut self) -> &mut Self {
        self.add_directive(NO_STORE)
    }

    pub fn no_transform(&mut self) -> &mut Self {
        self.add_directive(NO_TRANSFORM)
    }

    pub fn must_revalidate(&mut self) -> &mut Self {
        self.add_directive(MUST_REVALIDATE)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.directives.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.directives.len()
    }

    pub fn has(&self, name: &str) -> bool {
        self.directives.contains_key(&name.to_ascii_lowercase())
    }

    /// Value of a directive. `None` both when absent and when value-less.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.directives
            .get(&name.to_ascii_lowercase())
            .and_then(|v| v.as_deref())
    }

    /// Directives in serialization order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.directives
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_deref()))
    }

    /// Finalize the `Cache-Control` header of a response about to be sent.
    ///
    /// An existing header wins over the directives on `self`. An empty set
    /// falls back to `public, s-maxage=60` for 301, `no-cache` without
    /// freshness headers, and `private, must-revalidate` otherwise. A
    /// non-empty set without a visibility directive gets `private`, unless it
    /// carries `no-cache` or `no-store`. Every output is a fixed point, so a
    /// second pass over the same headers changes nothing.
    ///
    /// Never fails: a value that cannot be encoded leaves the header unset.
    pub fn sensible_defaults(&self, headers: &mut HeaderMap, status: StatusCode) {
        let mut cc = match headers.get(CACHE_CONTROL).and_then(|v| v.to_str().ok()) {
            Some(existing) => Self::parse(existing),
            None => self.clone(),
        };

        if cc.is_empty() {
            if status == StatusCode::MOVED_PERMANENTLY {
                cc.set_public().set_shared_max_age(REDIRECT_SHARED_MAX_AGE);
            } else if !has_freshness_headers(headers) {
                cc.no_cache();
            } else {
                cc.set_private().must_revalidate();
            }
        } else if !cc.declares_visibility() && !cc.forbids_reuse() {
            cc.set_private();
        }

        match HeaderValue::from_str(&cc.to_string()) {
            Ok(value) => {
                headers.insert(CACHE_CONTROL, value);
            }
            Err(_) => {
                headers.remove(CACHE_CONTROL);
            }
        }
    }

    fn declares_visibility(&self) -> bool {
        self.has(PUBLIC) || self.has(PRIVATE) || self.has(S_MAXAGE)
    }

    /// Caches must revalidate or not store at all.
    fn forbids_reuse(&self) -> bool {
        self.has(NO_CACHE) || self.has(NO_STORE)
    }

    fn insert(&mut self, name: &str, value: Option<String>) -> &mut Self {
        let name = name.trim().to_ascii_lowercase();
        if name.is_empty() {
            return self;
        }
        match name.as_str() {
            PUBLIC => {
                self.directives.remove(PRIVATE);
            }
            PRIVATE => {
                self.directives.remove(PUBLIC);
            }
            _ => {}
        }
        self.directives.insert(name, value);
        self
    }
}

fn has_freshness_headers(headers: &HeaderMap) -> bool {
    headers.contains_key(EXPIRES) || headers.contains_key(ETAG) || headers.contains_key(LAST_MODIFIED)
}

/// Bare values must be tokens; anything else is quoted.
fn needs_quotes(value: &str) -> bool {
    value.is_empty()
        || value
            .bytes()
            .any(|b| !(b.is_ascii_alphanumeric() || b"!#$%&'*+.^_`|~-".contains(&b)))
}

/// Undo quoted-pair escapes (`\"`, `\\`).
fn unescape(quoted: &str) -> String {
    let mut out = String::with_capacity(quoted.len());
    let mut chars = quoted.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => out.extend(chars.next()),
            c => out.push(c),
        }
    }
    out
}

impl fmt::Display for CacheControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (name, value)) in self.directives.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            f.write_str(name)?;
            if let Some(v) = value {
                if needs_quotes(v) {
                    let escaped = v.replace('\\', "\\\\").replace('"', "\\\"");
                    write!(f, "=\"{}\"", escaped)?;
                } else {
                    write!(f, "={}", v)?;
                }
            }
        }
        Ok(())
    }
}
