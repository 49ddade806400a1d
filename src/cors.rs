//! CORS negotiation.
//!
//! [`Cors`] is a handler the engine puts in front of route chains when CORS
//! is configured, globally or per route. Per request it:
//!
//! 1. Sets `Allow` on `OPTIONS` requests.
//! 2. Without an `Origin` header, answers `OPTIONS` with 204 and lets any
//!    other method through untouched.
//! 3. Matches `Origin` against the allow-list. An exact entry echoes the
//!    origin with `Vary: Origin`. A `*` entry echoes the origin when
//!    credentials are allowed and sends a literal `*` otherwise.
//! 4. On a match adds the configured `Access-Control-*` headers.
//! 5. Answers a matched preflight with 204 without running the route.
//!
//! An unmatched origin gets no CORS headers and the chain continues.

use std::sync::Arc;

use async_trait::async_trait;
use http::header::{self, HeaderName, HeaderValue};
use http::{HeaderMap, Method, StatusCode};
use tracing::debug;

use crate::core::Context;
use crate::handler::Handler;
use crate::router::{join_methods, sort_methods};

mod header_names {
    use super::*;
    pub static ALLOW: HeaderName = header::ALLOW;
    pub static VARY: HeaderName = header::VARY;
    pub static ALLOW_ORIGIN: HeaderName = header::ACCESS_CONTROL_ALLOW_ORIGIN;
    pub static ALLOW_METHODS: HeaderName = header::ACCESS_CONTROL_ALLOW_METHODS;
    pub static ALLOW_HEADERS: HeaderName = header::ACCESS_CONTROL_ALLOW_HEADERS;
    pub static ALLOW_CREDENTIALS: HeaderName = header::ACCESS_CONTROL_ALLOW_CREDENTIALS;
    pub static EXPOSE_HEADERS: HeaderName = header::ACCESS_CONTROL_EXPOSE_HEADERS;
    pub static MAX_AGE: HeaderName = header::ACCESS_CONTROL_MAX_AGE;
    pub static REQUEST_HEADERS: HeaderName = header::ACCESS_CONTROL_REQUEST_HEADERS;
}

mod header_values {
    use super::*;
    pub static ORIGIN: HeaderValue = HeaderValue::from_static("Origin");
    pub static ANY: HeaderValue = HeaderValue::from_static("*");
    pub static TRUE: HeaderValue = HeaderValue::from_static("true");
}

/// Static CORS configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CorsOptions {
    /// Exact origins, or `*` for any.
    pub allowed_origins: Vec<String>,
    pub allow_credentials: bool,
    pub expose_headers: Vec<String>,
    /// When empty, `Access-Control-Request-Headers` is mirrored.
    pub allow_headers: Vec<String>,
    /// Preflight cache lifetime in seconds.
    pub max_age: Option<u64>,
}

impl CorsOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allow-list containing only `*`.
    pub fn any_origin() -> Self {
        Self::new().with_origins(["*"])
    }

    pub fn with_origins<I, S>(mut self, origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_origins = origins.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_credentials(mut self, allow: bool) -> Self {
        self.allow_credentials = allow;
        self
    }

    pub fn with_expose_headers<I, S>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.expose_headers = headers.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_allow_headers<I, S>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allow_headers = headers.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_max_age(mut self, seconds: u64) -> Self {
        self.max_age = Some(seconds);
        self
    }

    /// Layer a per-route override on top of these options.
    ///
    /// Non-empty lists and a set max-age in `route` replace the base values;
    /// credentials are allowed if either side allows them.
    pub fn merge(&self, route: &CorsOptions) -> CorsOptions {
        let pick = |base: &Vec<String>, over: &Vec<String>| {
            if over.is_empty() {
                base.clone()
            } else {
                over.clone()
            }
        };
        CorsOptions {
            allowed_origins: pick(&self.allowed_origins, &route.allowed_origins),
            allow_credentials: self.allow_credentials || route.allow_credentials,
            expose_headers: pick(&self.expose_headers, &route.expose_headers),
            allow_headers: pick(&self.allow_headers, &route.allow_headers),
            max_age: route.max_age.or(self.max_age),
        }
    }

    fn match_origin(&self, origin: &str) -> Option<OriginMatch> {
        if self
            .allowed_origins
            .iter()
            .any(|o| o != "*" && o == origin)
        {
            return Some(OriginMatch::Exact);
        }
        if self.allowed_origins.iter().any(|o| o == "*") {
            return Some(OriginMatch::Wildcard);
        }
        None
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum OriginMatch {
    Exact,
    Wildcard,
}

/// Methods to advertise for a route: the registered ones plus `HEAD` when
/// `GET` is present and always `OPTIONS`, sorted.
pub fn allow_methods(registered: &[Method]) -> Vec<Method> {
    let mut methods = registered.to_vec();
    if methods.contains(&Method::GET) {
        methods.push(Method::HEAD);
    }
    methods.push(Method::OPTIONS);
    sort_methods(&mut methods);
    methods
}

/// CORS negotiating handler.
#[derive(Clone, Debug)]
pub struct Cors {
    options: Arc<CorsOptions>,
}

impl Cors {
    pub fn new(options: CorsOptions) -> Self {
        Self {
            options: Arc::new(options),
        }
    }

    pub fn options(&self) -> &CorsOptions {
        &self.options
    }

    fn apply(&self, headers: &mut HeaderMap, origin: &str, matched: OriginMatch, request_headers: Option<HeaderValue>) {
        let opts = &*self.options;

        let mirror = matched == OriginMatch::Exact || opts.allow_credentials;
        if mirror {
            let Ok(value) = HeaderValue::from_str(origin) else {
                return;
            };
            headers.append(header_names::VARY.clone(), header_values::ORIGIN.clone());
            headers.insert(header_names::ALLOW_ORIGIN.clone(), value);
        } else {
            headers.insert(header_names::ALLOW_ORIGIN.clone(), header_values::ANY.clone());
        }

        if !opts.allow_headers.is_empty() {
            insert_list(headers, &header_names::ALLOW_HEADERS, &opts.allow_headers);
        } else if let Some(requested) = request_headers {
            headers.insert(header_names::ALLOW_HEADERS.clone(), requested);
        }
        if !opts.expose_headers.is_empty() {
            insert_list(headers, &header_names::EXPOSE_HEADERS, &opts.expose_headers);
        }
        if opts.allow_credentials {
            headers.insert(
                header_names::ALLOW_CREDENTIALS.clone(),
                header_values::TRUE.clone(),
            );
        }
        if let Some(max_age) = opts.max_age {
            headers.insert(header_names::MAX_AGE.clone(), HeaderValue::from(max_age));
        }
    }
}

fn insert_list(headers: &mut HeaderMap, name: &HeaderName, values: &[String]) {
    if let Ok(value) = HeaderValue::from_str(&values.join(", ")) {
        headers.insert(name.clone(), value);
    }
}

#[async_trait]
impl Handler for Cors {
    async fn call(&self, ctx: &mut Context) {
        let preflight = ctx.method() == Method::OPTIONS;
        let allow = join_methods(&allow_methods(ctx.allowed_methods()));
        let allow = HeaderValue::from_str(&allow).ok();

        if preflight {
            if let Some(allow) = &allow {
                ctx.header_mut()
                    .insert(header_names::ALLOW.clone(), allow.clone());
            }
        }

        let Some(origin) = ctx.request().origin().map(str::to_owned) else {
            if preflight {
                ctx.write_header(StatusCode::NO_CONTENT);
                return;
            }
            return ctx.next().await;
        };

        let Some(matched) = self.options.match_origin(&origin) else {
            debug!(origin = %origin, "origin not allowed, no CORS headers");
            return ctx.next().await;
        };

        let request_headers = ctx
            .request()
            .headers()
            .get(&header_names::REQUEST_HEADERS)
            .cloned();
        self.apply(ctx.header_mut(), &origin, matched, request_headers);

        if preflight {
            if let Some(allow) = allow {
                ctx.header_mut()
                    .insert(header_names::ALLOW_METHODS.clone(), allow);
            }
            ctx.write_header(StatusCode::NO_CONTENT);
            return;
        }
        ctx.next().await
    }

    fn name(&self) -> &'static str {
        "cors"
    }
}
