//! Request dispatch subsystem.
//!
//! # Data Flow
//! ```text
//! accepted connection
//!     → server.rs (axum setup, per-request task)
//!     → dispatcher.rs (admission, probe shortcut, rewrite, relay)
//!     → selector.rs (registry lookup, stickiness, random pick)
//!     → tunnel.rs (upgrade handshakes become byte pipes)
//!     → responder.rs (canonical 400/404/502)
//! ```

pub mod dispatcher;
pub mod responder;
pub mod selector;
pub mod server;
pub mod tunnel;

pub use server::{AppState, HttpServer, RouterSettings};
