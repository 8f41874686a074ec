//! Per-request observation sink.

use std::time::Duration;

use axum::http::{Method, StatusCode};

use crate::registry::Backend;

/// Receives one observation per request outcome.
///
/// Implementations must be non-blocking; the dispatcher calls these inline
/// on the request path and never awaits them.
pub trait VarzSink: Send + Sync {
    /// A request no backend was eligible for.
    fn capture_bad_request(&self, method: &Method, host: &str);

    /// A request handed to a backend, before the round-trip.
    fn capture_backend_request(&self, backend: &Backend, method: &Method);

    /// The round-trip outcome: `status` is `None` when the transport failed
    /// before a response arrived.
    fn capture_backend_response(&self, backend: &Backend, status: Option<StatusCode>, latency: Duration);
}

/// Prometheus-backed sink.
pub struct MetricsVarz;

impl VarzSink for MetricsVarz {
    fn capture_bad_request(&self, method: &Method, host: &str) {
        let labels = [("method", method.to_string()), ("host", host.to_string())];
        metrics::counter!("router_bad_requests_total", &labels).increment(1);
    }

    fn capture_backend_request(&self, backend: &Backend, method: &Method) {
        let labels = [
            ("method", method.to_string()),
            ("backend", backend.canonical_addr()),
        ];
        metrics::counter!("router_backend_requests_total", &labels).increment(1);
    }

    fn capture_backend_response(&self, backend: &Backend, status: Option<StatusCode>, latency: Duration) {
        let backend_addr = backend.canonical_addr();
        match status {
            Some(status) => {
                let labels = [
                    ("backend", backend_addr),
                    ("status", status.as_u16().to_string()),
                ];
                metrics::histogram!("router_backend_response_seconds", &labels)
                    .record(latency.as_secs_f64());
            }
            None => {
                metrics::counter!("router_backend_errors_total", "backend" => backend_addr)
                    .increment(1);
            }
        }
    }
}

/// Sink that drops every capture.
pub struct NullVarz;

impl VarzSink for NullVarz {
    fn capture_bad_request(&self, _method: &Method, _host: &str) {}

    fn capture_backend_request(&self, _backend: &Backend, _method: &Method) {}

    fn capture_backend_response(&self, _backend: &Backend, _status: Option<StatusCode>, _latency: Duration) {}
}
