//! Backend registry subsystem.
//!
//! # Data Flow
//! ```text
//! membership feed (external)
//!     → register / unregister
//!     → InMemoryRegistry (host → eligible ids, id → record)
//!     → RouteRegistry reads from the dispatch path
//! ```
//!
//! # Design Decisions
//! - The dispatch path only ever sees the read-side `RouteRegistry` trait
//! - Batch resolution happens under a single read guard
//! - Request accounting is lock-free, kept beside the membership lock

pub mod backend;
pub mod store;

pub use backend::{Backend, BackendId};
pub use store::InMemoryRegistry;

use std::time::Instant;

/// Routing fingerprint derived from an inbound request.
///
/// Currently just the normalized Host. Registries are free to key on richer
/// fingerprints; everything the dispatcher knows goes through this type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RouteKey {
    host: String,
}

impl RouteKey {
    /// Build a key from a raw Host header value.
    ///
    /// Lowercases and drops a trailing `:port` so `App.Example.com:8080`
    /// and `app.example.com` land on the same entry.
    pub fn new(host: &str) -> Self {
        let mut host = host.trim().to_ascii_lowercase();
        if let Some((name, port)) = host.rsplit_once(':') {
            if !name.is_empty() && port.parse::<u16>().is_ok() {
                host.truncate(name.len());
            }
        }
        Self { host }
    }

    /// The normalized host this key routes on.
    pub fn host(&self) -> &str {
        &self.host
    }
}

/// Read capability the dispatch path holds on the registry.
///
/// Implementations must answer from a consistent snapshot per call and must
/// not block on network I/O; the dispatcher calls these on the request path.
pub trait RouteRegistry: Send + Sync {
    /// Backend ids eligible to serve `key` at the instant of lookup.
    fn lookup(&self, key: &RouteKey) -> Vec<BackendId>;

    /// Resolve one id to its full record, or `None` if it has been evicted.
    fn lookup_by_id(&self, id: &BackendId) -> Option<Backend>;

    /// Resolve a batch of ids in one pass under one read guard.
    ///
    /// Returns `None` when no id in the batch resolves. Atomicity matters:
    /// resolving the ids one by one could race an in-flight re-registration
    /// and hide a valid sticky target.
    fn lookup_by_ids(&self, ids: &[BackendId]) -> Option<Vec<Backend>>;

    /// Per-backend accounting event for a dispatched request.
    fn capture_backend_request(&self, backend: &Backend, start: Instant);
}
