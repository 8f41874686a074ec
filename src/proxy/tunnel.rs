//! Upgrade tunnel.
//!
//! # Responsibilities
//! - Relay the websocket handshake to the backend verbatim
//! - Turn both connections into one opaque bidirectional byte pipe
//! - Release both sockets on every exit path
//!
//! # Design Decisions
//! - The proxy never parses frames; after the handshake it only moves bytes
//! - The backend answers the handshake; its response head is relayed as-is
//! - First copy completion or error wins; closing both ends unblocks the peer

use axum::body::Body;
use axum::http::{Request, Response, StatusCode, Uri};
use http_body_util::Empty;
use hyper::body::Bytes;
use hyper::client::conn::http1;
use hyper_util::rt::TokioIo;
use tokio::io::{copy_bidirectional, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::proxy::responder;
use crate::registry::Backend;

/// Relay an upgrade handshake and, on success, splice the two connections.
///
/// The request arrives with its target already rewritten and the forwarded
/// chain appended; `Host`, `Upgrade` and `Connection` are still the client's
/// own. Returns the backend's handshake answer (101 or otherwise); the
/// spliced copy runs on its own task once the client connection switches
/// protocols.
pub async fn serve_upgrade(mut request: Request<Body>, backend: &Backend) -> Response<Body> {
    let client_upgrade = hyper::upgrade::on(&mut request);
    let addr = backend.canonical_addr();

    // A fresh connection per tunnel; nothing here is poolable
    let stream = match TcpStream::connect(&addr).await {
        Ok(stream) => stream,
        Err(err) => {
            tracing::warn!(backend = %addr, error = %err, "Tunnel dial failed");
            return responder::bad_gateway();
        }
    };

    let (mut sender, conn) = match http1::handshake(TokioIo::new(stream)).await {
        Ok(pair) => pair,
        Err(err) => {
            tracing::warn!(backend = %addr, error = %err, "Tunnel handshake failed");
            return responder::bad_gateway();
        }
    };

    // The connection task owns the socket until the upgrade hands it over
    tokio::spawn(async move {
        if let Err(err) = conn.with_upgrades().await {
            tracing::debug!(error = %err, "Tunnel connection ended with error");
        }
    });

    let mut response = match sender.send_request(handshake_head(&request)).await {
        Ok(response) => response,
        Err(err) => {
            tracing::warn!(backend = %addr, error = %err, "Tunnel handshake write failed");
            return responder::bad_gateway();
        }
    };

    // The backend declined to switch protocols: relay its answer unchanged
    if response.status() != StatusCode::SWITCHING_PROTOCOLS {
        let (parts, body) = response.into_parts();
        return Response::from_parts(parts, Body::new(body));
    }

    let backend_upgrade = hyper::upgrade::on(&mut response);

    tokio::spawn(async move {
        let (client_io, backend_io) =
            match tokio::try_join!(client_upgrade, backend_upgrade) {
                Ok(pair) => pair,
                Err(err) => {
                    tracing::warn!(error = %err, "Protocol switch failed");
                    return;
                }
            };

        let mut client = TokioIo::new(client_io);
        let mut backend = TokioIo::new(backend_io);

        // Runs until either side closes or errors; the copy forwards EOF so
        // closure of one half propagates to the other
        if let Err(err) = copy_bidirectional(&mut client, &mut backend).await {
            tracing::debug!(error = %err, "Tunnel closed with error");
        }

        let _ = client.shutdown().await;
        let _ = backend.shutdown().await;
    });

    // Relaying the 101 head switches the client connection over
    let (parts, _) = response.into_parts();
    Response::from_parts(parts, Body::empty())
}

/// The original request head over an empty body: method, origin-form
/// target, version, and every header (Host, Upgrade, Connection included).
fn handshake_head(request: &Request<Body>) -> Request<Empty<Bytes>> {
    let target = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let uri: Uri = target.parse().expect("path-and-query is a valid origin-form target");

    let mut head = Request::new(Empty::new());
    *head.method_mut() = request.method().clone();
    *head.uri_mut() = uri;
    *head.version_mut() = request.version();
    *head.headers_mut() = request.headers().clone();
    head
}
