//! Backend record types.

use std::fmt;
use std::net::SocketAddr;

/// Opaque registry key for a backend instance.
///
/// Two lookups may return different id sets for the same host as membership
/// changes; ids are only compared, never interpreted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BackendId(String);

impl BackendId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BackendId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BackendId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// A single addressable application instance.
///
/// The dispatcher only ever holds short-lived clones of these records; the
/// registry creates and destroys them as membership changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backend {
    /// Registry primary key.
    pub id: BackendId,
    /// Network address requests are forwarded to.
    pub addr: SocketAddr,
    /// Stable instance identifier used for session affinity. May be empty
    /// for applications that never request stickiness.
    pub private_instance_id: String,
}

impl Backend {
    pub fn new(id: BackendId, addr: SocketAddr, private_instance_id: impl Into<String>) -> Self {
        Self {
            id,
            addr,
            private_instance_id: private_instance_id.into(),
        }
    }

    /// The `host:port` form used for URI rewriting and trace headers.
    pub fn canonical_addr(&self) -> String {
        self.addr.to_string()
    }
}
