//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! dispatcher outcome
//!     → varz.rs (VarzSink capture, fire-and-forget)
//!     → metrics.rs (Prometheus series, exposed on its own listener)
//! ```
//!
//! # Design Decisions
//! - Captures must never block the request path
//! - Exactly one outcome capture per request
//! - The sink is a trait so tests can record instead of export

pub mod metrics;
pub mod varz;

pub use varz::{MetricsVarz, NullVarz, VarzSink};
