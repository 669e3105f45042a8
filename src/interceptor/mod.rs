//! Server interceptor chain.
//!
//! # Data Flow
//! ```text
//! call ctx (client budget, if any)
//!     → interceptor[0]   (outermost; may pass, tighten, or short-circuit)
//!     → interceptor[1]
//!     → ...
//!     → handler          (sees the tightest deadline of all layers)
//! ```
//!
//! # Design Decisions
//! - The chain is fixed at server construction and shared read-only by all calls
//! - Composition is an index walk over a shared slice; no per-call allocation
//!   beyond the boxed futures
//! - Deadline interceptors derive from the context they receive, so a client
//!   budget can only ever be tightened on the server

pub mod builtin;
pub mod chain;
pub mod timeout;

pub use builtin::{RequireDeadlineInterceptor, TracingInterceptor};
pub use chain::{Interceptor, InterceptorChain, Next};
pub use timeout::TimeoutInterceptor;
