//! Configuration validation logic.

use std::net::SocketAddr;

use crate::config::schema::RouterConfig;

/// Error type for configuration validation failures.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError(pub String);

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Validation error: {}", self.0)
    }
}

/// Validate a RouterConfig for semantic correctness.
pub fn validate_config(config: &RouterConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    // 1. The listener must bind somewhere parsable
    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError(format!(
            "listener.bind_address '{}' is not a socket address",
            config.listener.bind_address
        )));
    }

    // 2. Trace headers need an advertised IP
    if config.ip.trim().is_empty() {
        errors.push(ValidationError("ip must not be empty".to_string()));
    }

    // 3. Seeds must name a host and a dialable address
    for seed in &config.backends {
        if seed.host.trim().is_empty() {
            errors.push(ValidationError(format!(
                "backend seed '{}' has an empty host",
                seed.address
            )));
        }
        if seed.address.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError(format!(
                "backend address '{}' is not a socket address",
                seed.address
            )));
        }
    }

    // 4. Metrics exposition needs its own address when enabled
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError(format!(
            "observability.metrics_address '{}' is not a socket address",
            config.observability.metrics_address
        )));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
