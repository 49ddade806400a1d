//! Incoming HTTP request as seen by handlers.

use std::io::Read;
use std::net::SocketAddr;

use bytes::{Buf, Bytes};
use http::header::{self, HeaderName};
use http::{HeaderMap, Method, Uri};

/// Header name constants for fast lookup.
mod header_names {
    use super::*;

    pub static ACCEPT_ENCODING: HeaderName = header::ACCEPT_ENCODING;
    pub static CONTENT_TYPE: HeaderName = header::CONTENT_TYPE;
    pub static CONTENT_LENGTH: HeaderName = header::CONTENT_LENGTH;
    pub static USER_AGENT: HeaderName = header::USER_AGENT;
    pub static ORIGIN: HeaderName = header::ORIGIN;
    pub static REFERER: HeaderName = header::REFERER;
}

/// `X-Request-ID` header name.
pub static X_REQUEST_ID: std::sync::LazyLock<HeaderName> =
    std::sync::LazyLock::new(|| HeaderName::from_static("x-request-id"));

/// HTTP request with a fully buffered body.
///
/// Clone is not derived: the engine moves the request into the pooled
/// context and drops it when the context is reset.
#[derive(Debug)]
pub struct Request {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
    version: http::Version,
    remote_addr: Option<SocketAddr>,
}

impl Request {
    /// Create a new request.
    #[inline]
    pub fn new(method: Method, uri: Uri, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            method,
            uri,
            headers,
            body,
            version: http::Version::HTTP_11,
            remote_addr: None,
        }
    }

    /// Attach the peer address.
    #[inline]
    pub fn with_remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    #[inline]
    pub fn method(&self) -> &Method {
        &self.method
    }

    #[inline]
    pub fn path(&self) -> &str {
        self.uri.path()
    }

    /// Raw query string, without the leading `?`.
    #[inline]
    pub fn query(&self) -> Option<&str> {
        self.uri.query()
    }

    #[inline]
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    #[inline]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    #[inline]
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    #[inline]
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Body as a blocking reader. Cheap: the underlying bytes are refcounted.
    pub fn body_reader(&self) -> impl Read {
        self.body.clone().reader()
    }

    #[inline]
    pub fn version(&self) -> http::Version {
        self.version
    }

    #[inline]
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    #[inline]
    fn header_by_name(&self, name: &HeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Get a header value by string name (case-insensitive).
    #[inline]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    #[inline]
    pub fn accept_encoding(&self) -> Option<&str> {
        self.header_by_name(&header_names::ACCEPT_ENCODING)
    }

    /// Check if client accepts Gzip compression.
    ///
    /// An explicit `gzip;q=0` is treated as a refusal.
    pub fn accepts_gzip(&self) -> bool {
        self.accept_encoding()
            .map(|v| {
                v.split(',').any(|part| {
                    let mut it = part.trim().split(';');
                    let coding = it.next().unwrap_or("").trim();
                    let refused = it.any(|p| {
                        let p = p.trim();
                        p == "q=0" || p == "q=0.0" || p == "q=0.00" || p == "q=0.000"
                    });
                    (coding.eq_ignore_ascii_case("gzip") || coding == "*") && !refused
                })
            })
            .unwrap_or(false)
    }

    #[inline]
    pub fn content_type(&self) -> Option<&str> {
        self.header_by_name(&header_names::CONTENT_TYPE)
    }

    #[inline]
    pub fn content_length(&self) -> Option<u64> {
        self.header_by_name(&header_names::CONTENT_LENGTH)
            .and_then(|v| v.parse().ok())
    }

    #[inline]
    pub fn user_agent(&self) -> Option<&str> {
        self.header_by_name(&header_names::USER_AGENT)
    }

    #[inline]
    pub fn referer(&self) -> Option<&str> {
        self.header_by_name(&header_names::REFERER)
    }

    /// `Origin` header, if present and non-empty.
    #[inline]
    pub fn origin(&self) -> Option<&str> {
        self.header_by_name(&header_names::ORIGIN)
            .filter(|o| !o.is_empty())
    }

    #[inline]
    pub fn request_id(&self) -> Option<&str> {
        self.header_by_name(&X_REQUEST_ID)
    }
}

impl Default for Request {
    fn default() -> Self {
        Self::new(Method::GET, Uri::from_static("/"), HeaderMap::new(), Bytes::new())
    }
}

impl<B> From<http::Request<B>> for Request
where
    B: Into<Bytes>,
{
    fn from(req: http::Request<B>) -> Self {
        let (parts, body) = req.into_parts();
        Self {
            method: parts.method,
            uri: parts.uri,
            headers: parts.headers,
            body: body.into(),
            version: parts.version,
            remote_addr: None,
        }
    }
}
