//! In-process unary RPC with deadline propagation.
//!
//! A client call carries its remaining budget across the connection as a
//! `grpc-timeout` token; the server rebuilds a [`CallContext`] from it, lets
//! interceptors tighten it, and hands it to the handler. Either side sees an
//! expired budget as `DeadlineExceeded`.
//!
//! ```text
//!   client ctx ──attach──▶ Envelope ──▶ server ctx (receipt + budget)
//!                                          │
//!                                          ▼
//!                               interceptors (may tighten)
//!                                          │
//!                                          ▼
//!   CallOutcome ◀── resolve ◀── Response ◀─ handler
//! ```

// Core
pub mod context;
pub mod deadline;
pub mod metadata;
pub mod request;
pub mod status;

// Call path
pub mod client;
pub mod greeter;
pub mod interceptor;
pub mod net;
pub mod server;

// Cross-cutting concerns
pub mod config;
pub mod lifecycle;
pub mod observability;

pub use config::RpcConfig;
pub use context::{CallContext, CancelGuard};
pub use lifecycle::Shutdown;
pub use request::{IntoRequest, Request};
pub use server::Server;
pub use status::{CallOutcome, Code, Status};
