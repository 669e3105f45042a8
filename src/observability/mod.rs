//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! client / server / transport produce:
//!     → logging.rs (structured log events via `tracing`)
//!     → metrics.rs (counters, gauges, histograms via `metrics`)
//!     → spans.rs (per-call spans carrying call and request IDs)
//!
//! Consumers:
//!     → stdout (human or JSON lines)
//!     → Metrics endpoint (Prometheus scrape), when enabled
//! ```
//!
//! # Design Decisions
//! - Request ID flows from client metadata into the server's call span
//! - Deadline expiry is counted per layer that observed it
//! - Metrics are cheap (atomic increments) and no-ops without a recorder

pub mod logging;
pub mod metrics;
pub mod spans;
