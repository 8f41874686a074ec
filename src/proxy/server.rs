//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Build the axum router around the dispatch handler
//! - Seed the registry from configuration
//! - Own the shared state handed to every request task
//! - Bind the server to a listener and run it to shutdown

use std::net::SocketAddr;
use std::sync::{Arc, RwLock};

use axum::body::Body;
use axum::routing::any;
use axum::Router;
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::config::RouterConfig;
use crate::observability::{MetricsVarz, VarzSink};
use crate::proxy::dispatcher;
use crate::registry::{Backend, BackendId, InMemoryRegistry, RouteRegistry};

/// Runtime settings consulted on the request path.
///
/// Held behind a read/write lock; request handling takes the read side only.
#[derive(Debug, Clone)]
pub struct RouterSettings {
    /// Advertised proxy IP, emitted in trace headers.
    pub ip: String,
}

/// Shared state injected into the dispatch handler.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<dyn RouteRegistry>,
    pub varz: Arc<dyn VarzSink>,
    pub client: Client<HttpConnector, Body>,
    settings: Arc<RwLock<RouterSettings>>,
}

impl AppState {
    pub fn new(
        registry: Arc<dyn RouteRegistry>,
        varz: Arc<dyn VarzSink>,
        settings: RouterSettings,
    ) -> Self {
        // Zero idle capacity: every request dials a fresh upstream socket
        let client = Client::builder(TokioExecutor::new())
            .pool_max_idle_per_host(0)
            .build(HttpConnector::new());

        Self {
            registry,
            varz,
            client,
            settings: Arc::new(RwLock::new(settings)),
        }
    }

    pub fn advertised_ip(&self) -> String {
        self.settings.read().expect("settings lock poisoned").ip.clone()
    }

    pub fn set_advertised_ip(&self, ip: impl Into<String>) {
        self.settings.write().expect("settings lock poisoned").ip = ip.into();
    }
}

/// Build the router: one catch-all dispatch route plus tracing.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/", any(dispatcher::dispatch))
        .route("/{*path}", any(dispatcher::dispatch))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// The reverse proxy server.
pub struct HttpServer {
    state: AppState,
    config: RouterConfig,
}

impl HttpServer {
    /// Create a server with a config-seeded registry and the metrics sink.
    pub fn new(config: RouterConfig) -> Self {
        let registry = Arc::new(InMemoryRegistry::new());
        for seed in &config.backends {
            match seed.address.parse() {
                Ok(addr) => {
                    let id = BackendId::new(Uuid::new_v4().to_string());
                    registry.register(&seed.host, Backend::new(id, addr, seed.instance_id.clone()));
                }
                Err(_) => {
                    tracing::warn!(address = %seed.address, "Invalid backend address");
                }
            }
        }

        Self::with_parts(config, registry, Arc::new(MetricsVarz))
    }

    /// Create a server around an existing registry and sink.
    pub fn with_parts(
        config: RouterConfig,
        registry: Arc<dyn RouteRegistry>,
        varz: Arc<dyn VarzSink>,
    ) -> Self {
        let settings = RouterSettings {
            ip: config.ip.clone(),
        };
        Self {
            state: AppState::new(registry, varz, settings),
            config,
        }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(self, listener: TcpListener) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let app = app(self.state).into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Wait for shutdown signal (Ctrl+C).
async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    tracing::info!("Shutdown signal received");
}
