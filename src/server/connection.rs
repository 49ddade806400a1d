//! Per-request service run on every accepted connection.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http::{header, StatusCode};
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Incoming;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::core::Request;
use crate::engine::Engine;
use crate::response::{ApiError, ApiResponse};
use crate::validator::BODY_EXCEEDED;

/// Buffer the body up to the engine limit and run the request through the engine.
///
/// The disconnect token fires if hyper drops this future before the
/// response is produced, which happens when the client goes away.
pub(super) async fn handle(
    engine: Arc<Engine>,
    remote_addr: SocketAddr,
    req: hyper::Request<Incoming>,
) -> Result<http::Response<Full<Bytes>>, Infallible> {
    let disconnect = CancellationToken::new();
    let guard = disconnect.clone().drop_guard();

    let (parts, body) = req.into_parts();
    let limit = engine.config().max_body_bytes;

    let declared = parts
        .headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());
    if declared.is_some_and(|len| len > limit as u64) {
        guard.disarm();
        return Ok(engine.render(&parts.method, &body_too_large(limit)));
    }

    let body = match Limited::new(body, limit).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            guard.disarm();
            if e.downcast_ref::<LengthLimitError>().is_some() {
                return Ok(engine.render(&parts.method, &body_too_large(limit)));
            }
            debug!(%remote_addr, error = %e, "failed to read request body");
            let response = ApiResponse::error(StatusCode::BAD_REQUEST, "failed to read request body");
            return Ok(engine.render(&parts.method, &response));
        }
    };

    let request =
        Request::from(http::Request::from_parts(parts, body)).with_remote_addr(remote_addr);
    let response = engine.serve_request(request, disconnect).await;
    guard.disarm();
    Ok(response)
}

fn body_too_large(limit: usize) -> ApiResponse {
    ApiResponse::failure(
        StatusCode::PAYLOAD_TOO_LARGE,
        vec![ApiError::new(
            BODY_EXCEEDED,
            format!("request body exceeds {} bytes", limit),
        )],
    )
}

/// Errors caused by the peer going away; not worth a log line.
pub(super) fn is_peer_error(err: &(dyn std::error::Error + 'static)) -> bool {
    let text = err.to_string();
    text.contains("connection reset")
        || text.contains("broken pipe")
        || text.contains("Connection reset")
        || text.contains("os error 104")
        || text.contains("os error 32")
        || text.contains("timed out")
}
