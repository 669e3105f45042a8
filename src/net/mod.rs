//! In-memory transport subsystem.
//!
//! # Data Flow
//! ```text
//! Dialer::dial(ctx)
//!     → listener.rs (bounded backlog, connection limits)
//!     → connection.rs (duplex stream, lifecycle tracking)
//!     → frame.rs (length-delimited JSON frames)
//!     → hand off to server / client connection tasks
//! ```
//!
//! # Design Decisions
//! - No sockets: both ends live in the same process (`tokio::io::duplex`)
//! - Bounded accept backlog prevents unbounded dial queues
//! - Each server connection tracked for graceful shutdown
//! - Frames carry metadata verbatim; deadlines are interpreted above this layer

pub mod connection;
pub mod frame;
pub mod listener;

pub use connection::{Connection, ConnectionId, ConnectionTracker, FramedConnection};
pub use frame::{Envelope, Frame, FrameCodec, FrameError, ResponseEnvelope, WireOutcome};
pub use listener::{listen, ConnectionPermit, Dialer, Listener, ListenerCloser};
