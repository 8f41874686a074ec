//! Shared utilities for integration testing.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use std::time::Instant;

use axum::http::{Method, StatusCode};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

use fleet_router::observability::VarzSink;
use fleet_router::proxy::server::{app, AppState, RouterSettings};
use fleet_router::registry::{Backend, BackendId, RouteKey, RouteRegistry};

/// Advertised IP the test proxy reports in trace headers.
pub const TEST_ROUTER_IP: &str = "10.0.0.1";

/// Build proxy state around the given registry and sink.
pub fn test_state(registry: Arc<dyn RouteRegistry>, varz: Arc<dyn VarzSink>) -> AppState {
    AppState::new(
        registry,
        varz,
        RouterSettings {
            ip: TEST_ROUTER_IP.to_string(),
        },
    )
}

/// Spawn the proxy on an ephemeral port, returning its address.
pub async fn spawn_proxy(state: AppState) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let service = app(state).into_make_service_with_connect_info::<SocketAddr>();

    tokio::spawn(async move {
        axum::serve(listener, service).await.unwrap();
    });

    addr
}

/// A registered backend plus the id it was registered under.
pub fn backend(id: &str, addr: SocketAddr, instance_id: &str) -> Backend {
    Backend::new(BackendId::from(id), addr, instance_id)
}

/// Start a mock backend that reads the request head and then answers every
/// connection with a fixed raw response.
pub async fn start_canned_backend(response: &'static str) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    tokio::spawn(async move {
                        if read_until_blank_line(&mut socket).await.is_none() {
                            return;
                        }
                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

/// Start a mock backend that echoes the raw request head back as the body,
/// so tests can assert on exactly what the proxy forwarded.
pub async fn start_head_echo_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    tokio::spawn(async move {
                        let Some(head) = read_until_blank_line(&mut socket).await else {
                            return;
                        };
                        let response = format!(
                            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            head.len(),
                            head
                        );
                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

/// Handles to observe an upgrade-echo backend from the test body.
pub struct UpgradeBackend {
    pub addr: SocketAddr,
    /// Request heads the backend received, one per connection.
    pub heads: mpsc::UnboundedReceiver<String>,
    /// Fires when the backend side of a tunnel reaches end-of-stream.
    pub closed: mpsc::UnboundedReceiver<()>,
}

/// Start a mock backend that accepts the websocket handshake itself and then
/// echoes every byte until the peer closes.
pub async fn start_upgrade_echo_backend() -> UpgradeBackend {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (head_tx, heads) = mpsc::unbounded_channel();
    let (closed_tx, closed) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let head_tx = head_tx.clone();
                    let closed_tx = closed_tx.clone();
                    tokio::spawn(async move {
                        let Some(head) = read_until_blank_line(&mut socket).await else {
                            return;
                        };
                        let _ = head_tx.send(head);

                        let accept = "HTTP/1.1 101 Switching Protocols\r\n\
                                      Connection: Upgrade\r\n\
                                      Upgrade: websocket\r\n\r\n";
                        if socket.write_all(accept.as_bytes()).await.is_err() {
                            return;
                        }

                        let mut buf = [0u8; 1024];
                        loop {
                            match socket.read(&mut buf).await {
                                Ok(0) | Err(_) => {
                                    let _ = closed_tx.send(());
                                    return;
                                }
                                Ok(n) => {
                                    if socket.write_all(&buf[..n]).await.is_err() {
                                        let _ = closed_tx.send(());
                                        return;
                                    }
                                }
                            }
                        }
                    });
                }
                Err(_) => break,
            }
        }
    });

    UpgradeBackend { addr, heads, closed }
}

/// Read from `socket` until the end of an HTTP head, returning everything
/// read so far (head only for well-behaved peers).
async fn read_until_blank_line(socket: &mut TcpStream) -> Option<String> {
    let mut data = Vec::new();
    let mut buf = [0u8; 1024];
    loop {
        match socket.read(&mut buf).await {
            Ok(0) | Err(_) => return None,
            Ok(n) => {
                data.extend_from_slice(&buf[..n]);
                if data.windows(4).any(|window| window == b"\r\n\r\n") {
                    return Some(String::from_utf8_lossy(&data).to_string());
                }
            }
        }
    }
}

/// Read an HTTP response head from `stream` (through the blank line).
pub async fn read_response_head(stream: &mut TcpStream) -> String {
    let mut data = Vec::new();
    let mut buf = [0u8; 1024];
    loop {
        let n = stream.read(&mut buf).await.unwrap();
        assert!(n > 0, "connection closed before response head completed");
        data.extend_from_slice(&buf[..n]);
        if data.windows(4).any(|window| window == b"\r\n\r\n") {
            return String::from_utf8_lossy(&data).to_string();
        }
    }
}

/// An address that refuses connections: bound, then immediately released.
pub async fn refused_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    tokio::time::sleep(Duration::from_millis(10)).await;
    addr
}

/// Varz sink that records every capture for assertions.
#[derive(Default)]
pub struct RecordingVarz {
    pub bad_requests: AtomicUsize,
    pub backend_requests: AtomicUsize,
    pub responses: Mutex<Vec<Option<StatusCode>>>,
}

impl VarzSink for RecordingVarz {
    fn capture_bad_request(&self, _method: &Method, _host: &str) {
        self.bad_requests.fetch_add(1, Ordering::SeqCst);
    }

    fn capture_backend_request(&self, _backend: &Backend, _method: &Method) {
        self.backend_requests.fetch_add(1, Ordering::SeqCst);
    }

    fn capture_backend_response(
        &self,
        _backend: &Backend,
        status: Option<StatusCode>,
        _latency: Duration,
    ) {
        self.responses.lock().unwrap().push(status);
    }
}

/// Registry wrapper counting lookups, for asserting the probe shortcut
/// never touches the registry.
pub struct CountingRegistry<R> {
    pub inner: R,
    pub lookups: AtomicUsize,
}

impl<R> CountingRegistry<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            lookups: AtomicUsize::new(0),
        }
    }
}

impl<R: RouteRegistry> RouteRegistry for CountingRegistry<R> {
    fn lookup(&self, key: &RouteKey) -> Vec<BackendId> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.inner.lookup(key)
    }

    fn lookup_by_id(&self, id: &BackendId) -> Option<Backend> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.inner.lookup_by_id(id)
    }

    fn lookup_by_ids(&self, ids: &[BackendId]) -> Option<Vec<Backend>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.inner.lookup_by_ids(ids)
    }

    fn capture_backend_request(&self, backend: &Backend, start: Instant) {
        self.inner.capture_backend_request(backend, start);
    }
}
