//! Call context subsystem.
//!
//! # Data Flow
//! ```text
//! client:  CallContext::background()
//!              → with_timeout(1s)              (client budget)
//!              → deadline::attach()            (remaining budget on the wire)
//!
//! server:  server root ctx (shutdown)
//!              → connection ctx                (cancelled on EOF)
//!              → call ctx (decoded budget)     (cancelled on Cancel frame / completion)
//!              → interceptor child (tighter)   (released when the interceptor returns)
//!              → handler
//! ```
//!
//! # Design Decisions
//! - Contexts form a tree of immutable nodes; a child only ever tightens the
//!   effective deadline of its parent
//! - Cancellation flows downward through `CancellationToken::child_token`,
//!   never to siblings or ancestors
//! - Deadline expiry is observed lazily (`is_done`, `done`) and latched, so the
//!   reported reason never changes once seen
//! - Deriving a context hands back a `CancelGuard`; dropping it releases the
//!   context on every exit path

mod call;

pub use call::{CallContext, CancelGuard, ContextError};
