//! Per-request context.
//!
//! A [`Context`] carries everything one request needs through the handler
//! chain: the request, the wrapped [`ResponseWriter`], route parameters, the
//! lazily parsed query, the request's cancellation token and a slot for a
//! recovered panic. Contexts are pooled by the engine, so every field is
//! reset explicitly between requests.

use std::any::Any;
use std::collections::HashMap;
use std::time::{Duration, Instant};

use http::{HeaderMap, HeaderValue, Method, StatusCode};
use tokio_util::sync::CancellationToken;
use tracing::error;

use super::request::{Request, X_REQUEST_ID};
use super::writer::ResponseWriter;
use crate::handler::{Chain, HandlerRef};
use crate::response::{ApiResponse, Formatter, JSON_FORMATTER};

/// Route parameters extracted from the matched pattern. Keys are unique.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Params {
    pairs: Vec<(String, String)>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a parameter.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.pairs.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.pairs.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    fn clear(&mut self) {
        self.pairs.clear();
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Params::new();
        for (k, v) in iter {
            params.insert(k, v);
        }
        params
    }
}

/// Decoded query string.
#[derive(Clone, Debug, Default)]
pub struct Query {
    pairs: Vec<(String, String)>,
}

impl Query {
    /// Parse an `application/x-www-form-urlencoded` query string.
    pub fn parse(raw: Option<&str>) -> Self {
        let pairs = raw
            .map(|q| {
                form_urlencoded::parse(q.as_bytes())
                    .map(|(k, v)| (k.into_owned(), v.into_owned()))
                    .collect()
            })
            .unwrap_or_default();
        Self { pairs }
    }

    /// First value for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Every value for `key`, in order of appearance.
    pub fn get_all<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.pairs
            .iter()
            .filter(move |(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn has(&self, key: &str) -> bool {
        self.pairs.iter().any(|(k, _)| k == key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

/// Request context shared across the handler chain.
pub struct Context {
    request: Request,
    writer: ResponseWriter,
    params: Params,
    query: Option<Query>,

    /// Handlers of this request; `handlers[index..]` is what remains.
    handlers: Vec<HandlerRef>,
    index: usize,

    /// Request-scoped cancellation, a child of the engine's root token.
    cancel: CancellationToken,
    /// Cancelled when the client goes away before the response is done.
    disconnect: CancellationToken,

    panic: Option<String>,
    allowed_methods: Vec<Method>,
    formatter: Formatter,

    /// Request ID, echoed back as `X-Request-ID`.
    request_id: String,
    started_at: Instant,

    /// Custom key-value storage for handlers.
    values: HashMap<String, Box<dyn Any + Send + Sync>>,
}

impl Default for Context {
    fn default() -> Self {
        Self {
            request: Request::default(),
            writer: ResponseWriter::new(),
            params: Params::new(),
            query: None,
            handlers: Vec::new(),
            index: 0,
            cancel: CancellationToken::new(),
            disconnect: CancellationToken::new(),
            panic: None,
            allowed_methods: Vec::new(),
            formatter: JSON_FORMATTER,
            request_id: String::new(),
            started_at: Instant::now(),
            values: HashMap::new(),
        }
    }
}

impl Context {
    /// Context for a standalone request, outside any engine.
    pub fn new(request: Request) -> Self {
        let mut ctx = Self::default();
        ctx.prepare(
            request,
            CancellationToken::new(),
            CancellationToken::new(),
            JSON_FORMATTER,
        );
        ctx
    }

    /// Bind a new request. Every per-request field starts from scratch.
    pub(crate) fn prepare(
        &mut self,
        request: Request,
        cancel: CancellationToken,
        disconnect: CancellationToken,
        formatter: Formatter,
    ) {
        self.writer.reset(request.method() == Method::HEAD);
        self.request_id = request
            .request_id()
            .filter(|id| !id.is_empty() && id.len() <= 128)
            .map(str::to_owned)
            .unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string());
        if let Ok(value) = HeaderValue::from_str(&self.request_id) {
            self.writer.headers_mut().insert(X_REQUEST_ID.clone(), value);
        }
        self.request = request;
        self.params.clear();
        self.query = None;
        self.handlers.clear();
        self.index = 0;
        self.cancel = cancel;
        self.disconnect = disconnect;
        self.panic = None;
        self.allowed_methods.clear();
        self.formatter = formatter;
        self.started_at = Instant::now();
        self.values.clear();
    }

    /// Drop everything that belongs to the finished request.
    pub(crate) fn recycle(&mut self) {
        self.request = Request::default();
        self.writer.reset(false);
        self.params.clear();
        self.query = None;
        self.handlers.clear();
        self.index = 0;
        self.panic = None;
        self.allowed_methods.clear();
        self.request_id.clear();
        self.values.clear();
    }

    // ---- chain -------------------------------------------------------------

    /// Run the next handler in the chain. A no-op once the chain is exhausted.
    pub async fn next(&mut self) {
        let Some(handler) = self.handlers.get(self.index).cloned() else {
            return;
        };
        self.index += 1;
        handler.call(self).await;
    }

    /// Skip every handler that has not run yet.
    pub fn abort(&mut self) {
        self.index = self.handlers.len();
    }

    /// Number of handlers that have not run yet.
    pub fn remaining(&self) -> usize {
        self.handlers.len() - self.index
    }

    /// Replace the handler chain. Only meaningful before the chain starts.
    pub fn set_chain(&mut self, chain: &Chain) {
        self.handlers.clear();
        self.handlers.extend(chain.handlers().iter().cloned());
        self.index = 0;
    }

    /// Append handlers to the chain before it starts.
    pub(crate) fn push_chain(&mut self, chain: &Chain) {
        self.handlers.extend(chain.handlers().iter().cloned());
    }

    // ---- request -----------------------------------------------------------

    #[inline]
    pub fn request(&self) -> &Request {
        &self.request
    }

    #[inline]
    pub fn request_mut(&mut self) -> &mut Request {
        &mut self.request
    }

    #[inline]
    pub fn method(&self) -> &Method {
        self.request.method()
    }

    #[inline]
    pub fn path(&self) -> &str {
        self.request.path()
    }

    /// Request header by name.
    #[inline]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.request.header(name)
    }

    /// Route parameter by name.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name)
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Install the route parameters in one step.
    pub(crate) fn set_params(&mut self, params: Params) {
        self.params = params;
    }

    /// Query string accessor, parsed on first use.
    pub fn query(&mut self) -> &Query {
        let raw = self.request.query();
        self.query.get_or_insert_with(|| Query::parse(raw))
    }

    /// Methods registered for the matched path.
    pub fn allowed_methods(&self) -> &[Method] {
        &self.allowed_methods
    }

    pub(crate) fn set_allowed_methods(&mut self, methods: Vec<Method>) {
        self.allowed_methods = methods;
    }

    #[inline]
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    #[inline]
    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    #[inline]
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Get elapsed time in milliseconds.
    #[inline]
    pub fn elapsed_ms(&self) -> f64 {
        self.started_at.elapsed().as_secs_f64() * 1000.0
    }

    // ---- response ----------------------------------------------------------

    #[inline]
    pub fn writer(&self) -> &ResponseWriter {
        &self.writer
    }

    #[inline]
    pub fn writer_mut(&mut self) -> &mut ResponseWriter {
        &mut self.writer
    }

    /// Response headers; mutations are ignored once headers are written.
    #[inline]
    pub fn header_mut(&mut self) -> &mut HeaderMap {
        self.writer.headers_mut()
    }

    #[inline]
    pub fn write_header(&mut self, status: StatusCode) {
        self.writer.write_header(status)
    }

    #[inline]
    pub fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
        self.writer.write(data)
    }

    #[inline]
    pub fn write_str(&mut self, s: &str) -> std::io::Result<usize> {
        self.writer.write_str(s)
    }

    /// Status written so far, 0 if none.
    #[inline]
    pub fn status(&self) -> u16 {
        self.writer.status()
    }

    pub fn formatter(&self) -> Formatter {
        self.formatter
    }

    /// Serialize an envelope with the engine's formatter.
    ///
    /// Failures are logged; at that point nothing useful can be sent anyway.
    pub fn respond(&mut self, response: &ApiResponse) {
        if let Err(e) = (self.formatter)(response, &mut self.writer) {
            error!(request_id = %self.request_id, error = %e, "failed to write response envelope");
        }
    }

    // ---- cancellation ------------------------------------------------------

    /// Token cancelled when this request should stop working.
    #[inline]
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Swap the request token, returning the previous one.
    pub fn replace_cancel_token(&mut self, token: CancellationToken) -> CancellationToken {
        std::mem::replace(&mut self.cancel, token)
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Token cancelled when the client disconnects early.
    #[inline]
    pub fn disconnect_token(&self) -> &CancellationToken {
        &self.disconnect
    }

    // ---- panic slot --------------------------------------------------------

    pub fn set_panic(&mut self, payload: impl Into<String>) {
        self.panic = Some(payload.into());
    }

    /// Recovered panic message, if a handler panicked.
    pub fn panic(&self) -> Option<&str> {
        self.panic.as_deref()
    }

    // ---- values ------------------------------------------------------------

    /// Store a custom value.
    pub fn set<T: Send + Sync + 'static>(&mut self, key: &str, value: T) {
        self.values.insert(key.to_string(), Box::new(value));
    }

    /// Get a custom value.
    pub fn get<T: 'static>(&self, key: &str) -> Option<&T> {
        self.values.get(key).and_then(|v| v.downcast_ref())
    }

    /// Get a mutable custom value.
    pub fn get_mut<T: 'static>(&mut self, key: &str) -> Option<&mut T> {
        self.values.get_mut(key).and_then(|v| v.downcast_mut())
    }

    /// Remove a custom value.
    pub fn remove<T: 'static>(&mut self, key: &str) -> Option<T> {
        self.values
            .remove(key)
            .and_then(|v| v.downcast().ok())
            .map(|b| *b)
    }

    #[cfg(test)]
    pub(crate) fn for_test(method: Method, uri: &str) -> Self {
        let request = Request::new(
            method,
            uri.parse().expect("test uri"),
            HeaderMap::new(),
            bytes::Bytes::new(),
        );
        Self::new(request)
    }
}
