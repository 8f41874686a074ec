//! Backend selection.
//!
//! # Responsibilities
//! - Turn the registry's eligible set into one chosen backend
//! - Honor the sticky hint when the instance is still eligible
//! - Retry when a record is evicted between the two lookups
//!
//! # Design Decisions
//! - Uniform random balancing: no per-host state, safe under concurrent
//!   dispatch
//! - Stickiness is advisory; a stale hint degrades silently to random
//! - Absence is the only failure mode; selection never errors

use rand::Rng;

use crate::registry::{Backend, RouteKey, RouteRegistry};

/// Choose one backend for `key`, preferring the instance named by `sticky`
/// when more than one is eligible.
///
/// Returns `None` only when the eligible set is empty. A record that
/// disappears between the id lookup and its resolution restarts the
/// procedure; the loop stays live as long as some eligible backend exists.
pub fn select_backend(
    registry: &dyn RouteRegistry,
    key: &RouteKey,
    sticky: Option<&str>,
) -> Option<Backend> {
    // Loop in case a lookup races an eviction between the id set and the
    // record resolve. Every exit is an explicit return.
    loop {
        let ids = registry.lookup(key);
        if ids.is_empty() {
            return None;
        }

        // Only one candidate: take it
        if ids.len() == 1 {
            match registry.lookup_by_id(&ids[0]) {
                Some(backend) => return Some(backend),
                None => continue,
            }
        }

        // Resolve the whole set in one pass so a half-visible
        // re-registration cannot hide the sticky target
        if let Some(wanted) = sticky {
            if let Some(candidates) = registry.lookup_by_ids(&ids) {
                if let Some(backend) = candidates
                    .into_iter()
                    .find(|backend| backend.private_instance_id == wanted)
                {
                    return Some(backend);
                }
                // No instance matched the hint; fall through to random
            }
        }

        let pick = rand::thread_rng().gen_range(0..ids.len());
        match registry.lookup_by_id(&ids[pick]) {
            Some(backend) => return Some(backend),
            None => continue,
        }
    }
}
