//! Session-affine HTTP reverse proxy core.
//!
//! # Architecture Overview
//!
//! ```text
//!                     ┌────────────────────────────────────────────┐
//!                     │                FLEET ROUTER                 │
//!                     │                                            │
//!   Client Request    │  ┌──────────┐   ┌──────────┐   ┌────────┐ │
//!   ──────────────────┼─▶│dispatcher│──▶│ selector │──▶│registry│ │
//!                     │  └────┬─────┘   └──────────┘   └────────┘ │
//!                     │       │                                    │
//!                     │       ├── upgrade? ──▶ tunnel (byte pipe)  │
//!                     │       │                                    │
//!   Client Response   │  ┌────▼─────┐   ┌──────────┐              │
//!   ◀─────────────────┼──│  relay   │◀──│ upstream │◀─────────────┼── Backend
//!                     │  └──────────┘   │  client  │              │
//!                     │                 └──────────┘              │
//!                     │  ┌──────────────────────────────────────┐ │
//!                     │  │ config · observability (varz/metrics)│ │
//!                     │  └──────────────────────────────────────┘ │
//!                     └────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod observability;
pub mod proxy;
pub mod registry;

pub use config::schema::RouterConfig;
pub use proxy::server::HttpServer;
