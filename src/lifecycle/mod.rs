//! Lifecycle management.
//!
//! # Data Flow
//! ```text
//! Shutdown::trigger()
//!     → root context cancelled
//!     → listener stops accepting, every connection context cancelled
//!     → in-flight calls observe Canceled, clients see Unavailable
//!     → server waits for tracked connections to drain
//! ```
//!
//! # Design Decisions
//! - Shutdown is a context: everything the server derives inherits it
//! - Triggering is idempotent and may happen from any task

pub mod shutdown;

pub use shutdown::Shutdown;
