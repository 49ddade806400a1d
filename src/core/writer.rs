//! Wrapped response writer.
//!
//! The writer buffers the body and records the status and byte count. Headers
//! are committed exactly once, on the first [`ResponseWriter::write_header`]
//! or [`ResponseWriter::write`]; after that point header mutations are
//! silently dropped.
//!
//! # Body suppression
//!
//! HEAD requests and 1xx, 204 and 304 responses swap in a discarding sink:
//! writes report success but nothing is stored and the byte counter stays at
//! zero. A 204 also loses its `Content-Type`.

use std::io::{self, Write};
use std::mem;

use bytes::buf::Writer;
use bytes::{BufMut, Bytes, BytesMut};
use flate2::write::GzEncoder;
use flate2::Compression;
use http::header::{self, HeaderName};
use http::{HeaderMap, HeaderValue, StatusCode};
use http_body_util::Full;
use tracing::debug;

use crate::cache_control::CacheControl;

/// Common header name constants for fast lookup.
mod header_names {
    use super::*;
    pub static CONTENT_TYPE: HeaderName = header::CONTENT_TYPE;
    pub static CONTENT_ENCODING: HeaderName = header::CONTENT_ENCODING;
    pub static CONTENT_LENGTH: HeaderName = header::CONTENT_LENGTH;
    pub static VARY: HeaderName = header::VARY;
}

/// Pre-allocated static header values.
pub(crate) mod header_values {
    use super::*;
    pub static TEXT_PLAIN: HeaderValue = HeaderValue::from_static("text/plain; charset=utf-8");
    pub static APPLICATION_JSON: HeaderValue =
        HeaderValue::from_static("application/json; charset=utf-8");
    pub static APPLICATION_XML: HeaderValue =
        HeaderValue::from_static("application/xml; charset=utf-8");
    pub static GZIP: HeaderValue = HeaderValue::from_static("gzip");
    pub static ACCEPT_ENCODING: HeaderValue = HeaderValue::from_static("Accept-Encoding");
}

/// Where body bytes go.
enum Sink {
    Buffer(BytesMut),
    Gzip(GzEncoder<Writer<BytesMut>>),
    Discard,
    /// Body sealed by [`ResponseWriter::finish`].
    Done(BytesMut),
}

impl Default for Sink {
    fn default() -> Self {
        Sink::Buffer(BytesMut::new())
    }
}

/// Response writer handed to every handler through the context.
#[derive(Default)]
pub struct ResponseWriter {
    headers: HeaderMap,
    /// Receives mutations after commit; cleared on every access.
    detached: HeaderMap,
    cache_control: CacheControl,
    status: u16,
    header_written: bool,
    bytes_written: u64,
    head: bool,
    gzip: Option<Compression>,
    sink: Sink,
}

impl ResponseWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writer for a HEAD request: body is discarded from the start.
    pub fn for_head() -> Self {
        let mut w = Self::new();
        w.reset(true);
        w
    }

    /// Clear every field for reuse, keeping allocations where possible.
    pub fn reset(&mut self, head: bool) {
        self.headers.clear();
        self.detached.clear();
        self.cache_control = CacheControl::new();
        self.status = 0;
        self.header_written = false;
        self.bytes_written = 0;
        self.head = head;
        self.gzip = None;
        self.sink = if head {
            Sink::Discard
        } else {
            match mem::take(&mut self.sink) {
                Sink::Buffer(mut buf) | Sink::Done(mut buf) => {
                    buf.clear();
                    Sink::Buffer(buf)
                }
                _ => Sink::default(),
            }
        };
    }

    /// Response headers as they are (or will be) sent.
    #[inline]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Mutable headers. Once headers are written, changes made through the
    /// returned map are discarded.
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        if self.header_written {
            self.detached.clear();
            &mut self.detached
        } else {
            &mut self.headers
        }
    }

    /// Directives merged into `Cache-Control` when headers are committed.
    pub fn cache_control_mut(&mut self) -> &mut CacheControl {
        &mut self.cache_control
    }

    /// Status code, or 0 if headers were not written yet.
    #[inline]
    pub fn status(&self) -> u16 {
        self.status
    }

    #[inline]
    pub fn header_written(&self) -> bool {
        self.header_written
    }

    /// Body bytes accepted so far. Zero when the body is suppressed.
    #[inline]
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Whether body bytes are being discarded.
    pub fn is_body_suppressed(&self) -> bool {
        matches!(self.sink, Sink::Discard)
    }

    /// Whether this writer answers a HEAD request.
    #[inline]
    pub fn is_head(&self) -> bool {
        self.head
    }

    /// Ask for a gzip-encoded body.
    ///
    /// Takes effect when headers are committed, and only if the response may
    /// carry a body and no `Content-Encoding` was set by then. Returns false
    /// when headers are already written.
    pub fn enable_gzip(&mut self, level: u32) -> bool {
        if self.header_written {
            return false;
        }
        self.gzip = Some(Compression::new(level.min(9)));
        true
    }

    /// Whether the body is being gzip-compressed.
    pub fn is_gzip(&self) -> bool {
        matches!(self.sink, Sink::Gzip(_))
    }

    /// Commit the status and headers. Only the first call has any effect.
    pub fn write_header(&mut self, status: StatusCode) {
        if self.header_written {
            debug!(
                first = self.status,
                ignored = status.as_u16(),
                "superfluous write_header call"
            );
            return;
        }
        self.header_written = true;
        self.status = status.as_u16();

        if status == StatusCode::NO_CONTENT {
            self.sink = Sink::Discard;
            self.headers.remove(&header_names::CONTENT_TYPE);
        } else if status.is_informational() || status == StatusCode::NOT_MODIFIED {
            self.sink = Sink::Discard;
        } else if !self.headers.contains_key(&header_names::CONTENT_TYPE) {
            self.headers.insert(
                header_names::CONTENT_TYPE.clone(),
                header_values::TEXT_PLAIN.clone(),
            );
        }

        if let Some(level) = self.gzip.take() {
            self.headers.append(
                header_names::VARY.clone(),
                header_values::ACCEPT_ENCODING.clone(),
            );
            let already_encoded = self.headers.contains_key(&header_names::CONTENT_ENCODING);
            if !already_encoded {
                if let Sink::Buffer(buf) = mem::take(&mut self.sink) {
                    self.headers.insert(
                        header_names::CONTENT_ENCODING.clone(),
                        header_values::GZIP.clone(),
                    );
                    self.headers.remove(&header_names::CONTENT_LENGTH);
                    self.sink = Sink::Gzip(GzEncoder::new(buf.writer(), level));
                } else {
                    self.sink = Sink::Discard;
                }
            }
        }

        self.cache_control.sensible_defaults(&mut self.headers, status);
    }

    /// Write body bytes, committing a 200 status first if needed.
    pub fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        if !self.header_written {
            self.write_header(StatusCode::OK);
        }
        match &mut self.sink {
            Sink::Discard => return Ok(data.len()),
            Sink::Buffer(buf) => buf.extend_from_slice(data),
            Sink::Gzip(enc) => enc.write_all(data)?,
            Sink::Done(_) => {
                return Err(io::Error::other("response body already finished"));
            }
        }
        self.bytes_written += data.len() as u64;
        Ok(data.len())
    }

    /// Convenience for string bodies.
    pub fn write_str(&mut self, s: &str) -> io::Result<usize> {
        self.write(s.as_bytes())
    }

    /// Flush and close the compressor, if any. Idempotent.
    pub fn finish(&mut self) -> io::Result<()> {
        match mem::take(&mut self.sink) {
            Sink::Gzip(enc) => {
                let buf = enc.finish()?.into_inner();
                self.sink = Sink::Done(buf);
            }
            Sink::Buffer(buf) => self.sink = Sink::Done(buf),
            other => self.sink = other,
        }
        Ok(())
    }

    /// Seal the response and move it out, leaving the writer ready for reset.
    ///
    /// A handler that never wrote anything yields an empty 200.
    pub fn take_response(&mut self) -> io::Result<http::Response<Full<Bytes>>> {
        if !self.header_written {
            self.write_header(StatusCode::OK);
        }
        self.finish()?;

        let body = match &mut self.sink {
            Sink::Done(buf) => buf.split().freeze(),
            _ => Bytes::new(),
        };
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::OK);

        let mut response = http::Response::new(Full::new(body));
        *response.status_mut() = status;
        *response.headers_mut() = mem::take(&mut self.headers);
        Ok(response)
    }

    /// Body bytes buffered so far (compressed bytes when gzip is active and
    /// finished). Mostly useful in tests.
    pub fn body(&self) -> &[u8] {
        match &self.sink {
            Sink::Buffer(buf) | Sink::Done(buf) => &buf[..],
            Sink::Gzip(enc) => &enc.get_ref().get_ref()[..],
            Sink::Discard => &[],
        }
    }
}

impl Write for ResponseWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        ResponseWriter::write(self, buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl std::fmt::Debug for ResponseWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseWriter")
            .field("status", &self.status)
            .field("header_written", &self.header_written)
            .field("bytes_written", &self.bytes_written)
            .field("head", &self.head)
            .finish()
    }
}
