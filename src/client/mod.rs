//! RPC client.
//!
//! # Data Flow
//! ```text
//! unary(ctx, method, request)
//!     → ctx already done? return its status, send nothing
//!     → attach grpc-timeout (remaining budget) and x-request-id
//!     → Request frame on the shared connection
//!     → race: response | ctx.done() | connection lost
//!       (ctx expiry or dropping the call future sends a Cancel frame)
//!     → exactly one CallOutcome
//! ```

pub mod channel;

pub use channel::Channel;
