//! In-process registry implementation.
//!
//! # Responsibilities
//! - Hold the host → eligible-ids and id → record maps
//! - Serve the read-side `RouteRegistry` interface to the dispatch path
//! - Accept register/unregister calls from the membership feed
//! - Keep per-backend request counters
//!
//! # Design Decisions
//! - One `RwLock` over both maps so a batch resolve sees a single snapshot
//! - The lock is never held across I/O; every method is a short read or write
//! - Counters live in a `DashMap` so accounting never contends with lookups

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Instant;

use dashmap::DashMap;

use crate::registry::backend::{Backend, BackendId};
use crate::registry::{RouteKey, RouteRegistry};

#[derive(Default)]
struct Membership {
    by_id: HashMap<BackendId, Backend>,
    by_host: HashMap<String, Vec<BackendId>>,
}

/// Registry backed by in-process maps, seeded from config and mutated by
/// the membership feed.
#[derive(Default)]
pub struct InMemoryRegistry {
    membership: RwLock<Membership>,
    request_counts: DashMap<BackendId, u64>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `backend` eligible for `host`. Re-registering an existing id
    /// replaces its record in place.
    pub fn register(&self, host: &str, backend: Backend) {
        let key = RouteKey::new(host);
        let mut m = self.membership.write().expect("registry lock poisoned");
        let ids = m.by_host.entry(key.host().to_string()).or_default();
        if !ids.contains(&backend.id) {
            ids.push(backend.id.clone());
        }
        m.by_id.insert(backend.id.clone(), backend);
    }

    /// Remove a backend from the registry entirely.
    pub fn unregister(&self, id: &BackendId) {
        let mut m = self.membership.write().expect("registry lock poisoned");
        m.by_id.remove(id);
        for ids in m.by_host.values_mut() {
            ids.retain(|candidate| candidate != id);
        }
        m.by_host.retain(|_, ids| !ids.is_empty());
        self.request_counts.remove(id);
    }

    /// Requests dispatched to `id` since it was registered.
    pub fn request_count(&self, id: &BackendId) -> u64 {
        self.request_counts.get(id).map(|count| *count).unwrap_or(0)
    }
}

impl RouteRegistry for InMemoryRegistry {
    fn lookup(&self, key: &RouteKey) -> Vec<BackendId> {
        let m = self.membership.read().expect("registry lock poisoned");
        m.by_host.get(key.host()).cloned().unwrap_or_default()
    }

    fn lookup_by_id(&self, id: &BackendId) -> Option<Backend> {
        let m = self.membership.read().expect("registry lock poisoned");
        m.by_id.get(id).cloned()
    }

    fn lookup_by_ids(&self, ids: &[BackendId]) -> Option<Vec<Backend>> {
        let m = self.membership.read().expect("registry lock poisoned");
        let found: Vec<Backend> = ids.iter().filter_map(|id| m.by_id.get(id).cloned()).collect();
        if found.is_empty() {
            None
        } else {
            Some(found)
        }
    }

    fn capture_backend_request(&self, backend: &Backend, start: Instant) {
        *self.request_counts.entry(backend.id.clone()).or_insert(0) += 1;
        tracing::debug!(
            backend = %backend.canonical_addr(),
            instance = %backend.id,
            started_at = ?start,
            "Backend request dispatched"
        );
    }
}
