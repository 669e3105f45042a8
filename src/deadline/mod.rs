//! Deadline propagation across the RPC boundary.
//!
//! # Data Flow
//! ```text
//! client ctx (absolute deadline)
//!     → carrier::attach()  remaining budget → "grpc-timeout: 750ms"
//!     → transport (token carried verbatim)
//!     → carrier::extract() "750ms" → Duration
//!     → server call ctx = receipt instant + budget
//! ```
//!
//! # Design Decisions
//! - Only relative budgets cross the wire; the two sides' clocks are never
//!   compared
//! - No token means no client budget; a token that does not parse is
//!   `InvalidArgument`, never "unbounded"
//! - A hand-set token and a context deadline compose by taking the tighter

pub mod carrier;
pub mod token;

pub use carrier::{attach, extract, GRPC_TIMEOUT};
pub use token::{decode, encode, encode_budget, TimeBudget};
