//! REST security and compression middleware.
//!
//! Mutating routes stack `check_origin -> verify_signature ->
//! decompress_request`; the signature therefore covers the exact bytes on
//! the wire. `compress_response` wraps the whole router.

use axum::{
    body::{to_bytes, Body},
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::net::SocketAddr;
use tracing::{debug, warn};

use super::SharedState;
use crate::codec::{
    accepts_gzip, compress, decompress, CodecError, GZIP, REAL_IP_HEADER, SIGNATURE_HEADER,
};

/// Largest request or response body buffered by the middleware.
pub const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

fn header_str<'a>(req: &'a Request, name: &str) -> Option<&'a str> {
    req.headers().get(name).and_then(|v| v.to_str().ok())
}

async fn buffer(body: Body) -> Result<axum::body::Bytes, Response> {
    to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|_| (StatusCode::BAD_REQUEST, "unreadable request body").into_response())
}

/// Rejects requests whose origin is outside the trusted subnet with 403.
pub async fn check_origin(State(state): State<SharedState>, req: Request, next: Next) -> Response {
    if state.origin.is_enabled() {
        let peer = req
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip());
        if let Err(e) = state.origin.check(header_str(&req, REAL_IP_HEADER), peer) {
            warn!("Rejected {} {}: {}", req.method(), req.uri().path(), e);
            return (StatusCode::FORBIDDEN, e.to_string()).into_response();
        }
    }
    next.run(req).await
}

/// Verifies `HashSHA256` over the raw body. Mismatch is 400; a missing or
/// `none` header is an explicit opt-out.
pub async fn verify_signature(
    State(state): State<SharedState>,
    req: Request,
    next: Next,
) -> Response {
    if state.opener.signer().is_none() {
        return next.run(req).await;
    }
    let Some(signature) = header_str(&req, SIGNATURE_HEADER).map(str::to_owned) else {
        return next.run(req).await;
    };

    let (parts, body) = req.into_parts();
    let bytes = match buffer(body).await {
        Ok(bytes) => bytes,
        Err(response) => return response,
    };
    if let Err(e) = state.opener.verify(&bytes, Some(&signature)) {
        warn!("Rejected {} {}: {}", parts.method, parts.uri.path(), e);
        return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
    }
    next.run(Request::from_parts(parts, Body::from(bytes))).await
}

/// Inflates gzip request bodies and drops the `Content-Encoding` header.
pub async fn decompress_request(req: Request, next: Next) -> Response {
    if !header_str(&req, header::CONTENT_ENCODING.as_str()).is_some_and(accepts_gzip) {
        return next.run(req).await;
    }

    let (mut parts, body) = req.into_parts();
    let bytes = match buffer(body).await {
        Ok(bytes) => bytes,
        Err(response) => return response,
    };
    let plain = match decompress(&bytes) {
        Ok(plain) => plain,
        Err(e @ CodecError::TooLarge(_)) => {
            warn!("Rejected {} {}: {}", parts.method, parts.uri.path(), e);
            return (StatusCode::PAYLOAD_TOO_LARGE, e.to_string()).into_response();
        }
        Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    };
    debug!("Inflated request body {} -> {} bytes", bytes.len(), plain.len());
    parts.headers.remove(header::CONTENT_ENCODING);
    parts.headers.remove(header::CONTENT_LENGTH);
    next.run(Request::from_parts(parts, Body::from(plain))).await
}

/// Gzips responses for clients that advertise support.
pub async fn compress_response(req: Request, next: Next) -> Response {
    let wants_gzip = header_str(&req, header::ACCEPT_ENCODING.as_str()).is_some_and(accepts_gzip);
    let response = next.run(req).await;
    if !wants_gzip || response.headers().contains_key(header::CONTENT_ENCODING) {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(_) => return StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    };
    match compress(&bytes) {
        Ok(packed) => {
            parts
                .headers
                .insert(header::CONTENT_ENCODING, HeaderValue::from_static(GZIP));
            parts.headers.remove(header::CONTENT_LENGTH);
            Response::from_parts(parts, Body::from(packed))
        }
        Err(e) => {
            warn!("Response compression failed: {}", e);
            Response::from_parts(parts, Body::from(bytes))
        }
    }
}
