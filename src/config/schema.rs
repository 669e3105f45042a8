//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from TOML files, and
//! every field has a default so a minimal (or empty) file is valid.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct RpcConfig {
    /// In-memory transport settings.
    pub transport: TransportConfig,

    /// Client and server budgets.
    pub timeouts: TimeoutConfig,

    /// Logging and metrics.
    pub observability: ObservabilityConfig,
}

/// In-memory transport configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct TransportConfig {
    /// Bytes buffered in each direction of a connection.
    pub buffer_size: usize,

    /// Maximum concurrently served connections (backpressure).
    pub max_connections: usize,

    /// Dialed connections waiting to be accepted before `dial` blocks.
    pub accept_backlog: usize,

    /// Largest frame accepted off the wire.
    pub max_frame_bytes: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            buffer_size: 1204 * 1024,
            max_connections: 64,
            accept_backlog: 16,
            max_frame_bytes: 4 * 1024 * 1024,
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Budget for establishing a connection in milliseconds.
    pub dial_ms: u64,

    /// Client-side call budget in milliseconds. Unset means unbounded.
    pub client_call_ms: Option<u64>,

    /// Server-imposed handler budget in milliseconds. Unset disables the
    /// server timeout interceptor.
    pub server_call_ms: Option<u64>,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            dial_ms: 5_000,
            client_call_ms: None,
            server_call_ms: None,
        }
    }
}

impl TimeoutConfig {
    pub fn dial(&self) -> Duration {
        Duration::from_millis(self.dial_ms)
    }

    pub fn client_call(&self) -> Option<Duration> {
        self.client_call_ms.map(Duration::from_millis)
    }

    pub fn server_call(&self) -> Option<Duration> {
        self.server_call_ms.map(Duration::from_millis)
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit JSON log lines instead of the human format.
    pub json_logs: bool,

    /// Enable the Prometheus scrape endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
