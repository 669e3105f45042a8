//! RPC server.
//!
//! # Data Flow
//! ```text
//! Listener::accept()
//!     → connection task (ctx = child of shutdown root)
//!     → Request frame → decode grpc-timeout → call ctx (measured from receipt)
//!     → Dispatcher (tower::Service) → InterceptorChain → UnaryHandler
//!     → race against call ctx → Response frame
//! ```
//!
//! # Design Decisions
//! - A malformed timeout token or a reused call id is answered without running the chain
//! - Handlers run on their own task; an expired call is answered immediately
//! - Cancel frames, EOF and shutdown all cancel call contexts

mod conn;
pub mod dispatch;
pub mod handler;
pub mod serve;

pub use dispatch::{Dispatcher, ServerCall};
pub use handler::{NamedHandler, UnaryHandler};
pub use serve::{Server, ServerBuilder};
