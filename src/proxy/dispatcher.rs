//! Request dispatch handler.
//!
//! # Responsibilities
//! - Admit only HTTP/1.x requests
//! - Answer balancer health probes locally
//! - Select a backend and rewrite the request for transparent forwarding
//! - Relay the upstream response, emitting affinity and trace headers
//! - Hand websocket handshakes to the upgrade tunnel
//!
//! # Design Decisions
//! - Header mutations happen on the per-request object only; nothing shared
//! - Every request outcome is captured by the varz sink exactly once
//! - No retries here; the selector's restart loop is the only internal retry

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Instant;

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::uri::{Authority, PathAndQuery, Scheme};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Request, Response, StatusCode, Uri, Version};

use crate::proxy::selector::select_backend;
use crate::proxy::server::AppState;
use crate::proxy::{responder, tunnel};
use crate::registry::{Backend, RouteKey};

pub const VCAP_BACKEND_HEADER: HeaderName = HeaderName::from_static("x-vcap-backend");
pub const VCAP_ROUTER_HEADER: HeaderName = HeaderName::from_static("x-vcap-router");
pub const VCAP_TRACE_HEADER: HeaderName = HeaderName::from_static("x-vcap-trace");
pub const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

/// Cookie carried by clients as the affinity hint.
pub const VCAP_COOKIE_ID: &str = "__VCAP_ID__";
/// Response cookie that signals the backend has begun a session.
pub const STICKY_COOKIE_KEY: &str = "JSESSIONID";

/// User-Agent the fronting balancer probes with.
const HEALTH_PROBE_USER_AGENT: &str = "HTTP-Monitor/1.1";

/// Serve one request end-to-end.
pub async fn dispatch(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    mut request: Request<Body>,
) -> Response<Body> {
    // 1. Protocol admission: only HTTP/1.0 and HTTP/1.1 are forwarded
    if !matches!(request.version(), Version::HTTP_10 | Version::HTTP_11) {
        return responder::bad_request();
    }

    let start = Instant::now();

    // 2. Heartbeats from the fronting balancer are answered locally
    if user_agent(request.headers()) == Some(HEALTH_PROBE_USER_AGENT) {
        return Response::builder()
            .status(StatusCode::OK)
            .body(Body::from("ok\n"))
            .expect("static response parts");
    }

    // 3. Select a backend for the request's host
    let key = RouteKey::new(&request_host(&request));
    let sticky = sticky_cookie(request.headers());

    let Some(backend) = select_backend(state.registry.as_ref(), &key, sticky.as_deref()) else {
        tracing::debug!(host = %key.host(), "No eligible backend");
        state.varz.capture_bad_request(request.method(), key.host());
        return responder::not_found();
    };

    // 4. Record the dispatch before any upstream I/O
    state.registry.capture_backend_request(&backend, start);
    state.varz.capture_backend_request(&backend, request.method());

    // 5. Point the request at the backend; path and query stay untouched
    if let Err(response) = rewrite_target(&mut request, &backend) {
        return response;
    }

    // 6. Record the hop. Upstream is trusted to have stripped any
    //    client-supplied value; the header lives on the per-request object
    append_forwarded_for(request.headers_mut(), peer);

    // 7. Websocket handshakes become opaque byte tunnels
    if is_upgrade_request(&request) {
        return tunnel::serve_upgrade(request, &backend).await;
    }

    // 8. One upstream connection per request; inbound hop-by-hop intent is
    //    replaced with our own
    request
        .headers_mut()
        .insert(header::CONNECTION, HeaderValue::from_static("close"));

    let trace_requested = trace_requested(request.headers());

    // 9. Round-trip
    let result = state.client.request(request).await;
    let latency = start.elapsed();

    let upstream = match result {
        Ok(upstream) => upstream,
        Err(err) => {
            tracing::warn!(
                backend = %backend.canonical_addr(),
                error = %err,
                "Upstream request failed"
            );
            state.varz.capture_backend_response(&backend, None, latency);
            return responder::bad_gateway();
        }
    };

    state
        .varz
        .capture_backend_response(&backend, Some(upstream.status()), latency);

    // 10. Relay the response: all upstream headers, order preserved
    let (mut parts, body) = upstream.into_parts();

    if trace_requested {
        if let Ok(value) = HeaderValue::from_str(&state.advertised_ip()) {
            parts.headers.insert(VCAP_ROUTER_HEADER, value);
        }
        if let Ok(value) = HeaderValue::from_str(&backend.canonical_addr()) {
            parts.headers.insert(VCAP_BACKEND_HEADER, value);
        }
    }

    // 11. The backend started a session: steer this client back to it
    if backend_started_session(&parts.headers) && !backend.private_instance_id.is_empty() {
        let cookie = format!("{}={}; Path=/", VCAP_COOKIE_ID, backend.private_instance_id);
        if let Ok(value) = HeaderValue::from_str(&cookie) {
            parts.headers.append(header::SET_COOKIE, value);
        }
    }

    Response::from_parts(parts, Body::new(body))
}

fn user_agent(headers: &HeaderMap) -> Option<&str> {
    headers.get(header::USER_AGENT).and_then(|value| value.to_str().ok())
}

/// Host the request routes on: the Host header, else the request target.
fn request_host<B>(request: &Request<B>) -> String {
    if let Some(host) = request.headers().get(header::HOST).and_then(|value| value.to_str().ok()) {
        return host.to_string();
    }
    request.uri().host().unwrap_or_default().to_string()
}

/// Value of the affinity cookie, if the client sent one.
fn sticky_cookie(headers: &HeaderMap) -> Option<String> {
    for value in headers.get_all(header::COOKIE) {
        let Ok(value) = value.to_str() else { continue };
        for pair in value.split(';') {
            let Some((name, value)) = pair.split_once('=') else { continue };
            if name.trim() == VCAP_COOKIE_ID {
                return Some(value.trim().to_string());
            }
        }
    }
    None
}

/// Whether the upstream response carries the session-inducing cookie.
fn backend_started_session(headers: &HeaderMap) -> bool {
    headers.get_all(header::SET_COOKIE).iter().any(|value| {
        value
            .to_str()
            .ok()
            .and_then(|cookie| cookie.split(';').next())
            .and_then(|pair| pair.split_once('='))
            .map(|(name, _)| name.trim() == STICKY_COOKIE_KEY)
            .unwrap_or(false)
    })
}

/// Exact canonical-form match, as the handshake requires.
fn is_upgrade_request<B>(request: &Request<B>) -> bool {
    let connection = request.headers().get(header::CONNECTION);
    let upgrade = request.headers().get(header::UPGRADE);
    connection.map(|value| value.as_bytes() == b"Upgrade").unwrap_or(false)
        && upgrade.map(|value| value.as_bytes() == b"websocket").unwrap_or(false)
}

/// Rewrite the request target to `http://<backend>`, keeping path and query.
fn rewrite_target(request: &mut Request<Body>, backend: &Backend) -> Result<(), Response<Body>> {
    let mut parts = request.uri().clone().into_parts();
    parts.scheme = Some(Scheme::HTTP);
    parts.authority =
        Some(Authority::from_str(&backend.canonical_addr()).map_err(|_| responder::bad_gateway())?);
    if parts.path_and_query.is_none() {
        parts.path_and_query = Some(PathAndQuery::from_static("/"));
    }

    *request.uri_mut() = Uri::from_parts(parts).map_err(|_| responder::bad_gateway())?;
    Ok(())
}

/// Append the peer host to any forwarded-for chain already present.
fn append_forwarded_for(headers: &mut HeaderMap, peer: SocketAddr) {
    let mut hops: Vec<String> = headers
        .get_all(X_FORWARDED_FOR)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .map(str::to_string)
        .collect();
    hops.push(peer.ip().to_string());

    if let Ok(value) = HeaderValue::from_str(&hops.join(", ")) {
        headers.insert(X_FORWARDED_FOR, value);
    }
}

fn trace_requested(headers: &HeaderMap) -> bool {
    headers
        .get(VCAP_TRACE_HEADER)
        .map(|value| !value.is_empty())
        .unwrap_or(false)
}
