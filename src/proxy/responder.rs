//! Canonical error replies.
//!
//! The dispatch core only ever emits 400, 404 and 502 itself; everything
//! else on the wire comes from a backend. Bodies carry the status line text
//! so probes and humans see the same thing.

use axum::body::Body;
use axum::http::{header, HeaderValue, Response, StatusCode};

/// `<code> <reason phrase>\n` as a plain-text response.
fn status_response(code: StatusCode) -> Response<Body> {
    let body = format!("{} {}\n", code.as_u16(), code.canonical_reason().unwrap_or(""));
    Response::builder()
        .status(code)
        .header(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"))
        .body(Body::from(body))
        .expect("static response parts")
}

/// Protocol admission failure. The connection is unusable for anything
/// further, so it is also told to close.
pub fn bad_request() -> Response<Body> {
    let mut response = status_response(StatusCode::BAD_REQUEST);
    response
        .headers_mut()
        .insert(header::CONNECTION, HeaderValue::from_static("close"));
    response
}

/// No eligible backend for the request's host.
pub fn not_found() -> Response<Body> {
    status_response(StatusCode::NOT_FOUND)
}

/// Upstream dial or round-trip failure.
pub fn bad_gateway() -> Response<Body> {
    status_response(StatusCode::BAD_GATEWAY)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_carries_the_status_line() {
        let response = not_found();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "text/plain"
        );
    }

    #[test]
    fn bad_request_closes_the_connection() {
        let response = bad_request();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response.headers().get(header::CONNECTION).unwrap(), "close");
    }
}
