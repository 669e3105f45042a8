//! Connection handles and lifecycle tracking.
//!
//! # Responsibilities
//! - Wrap one end of an in-memory duplex stream
//! - Tag each connection with a process-wide id for log correlation
//! - Count live server connections so shutdown can wait for them

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::io::DuplexStream;
use tokio::sync::Notify;
use tokio_util::codec::Framed;

use crate::net::frame::FrameCodec;
use crate::observability::metrics;

static NEXT_CONNECTION: AtomicU64 = AtomicU64::new(1);

/// Process-wide connection tag. Both ends of a dialed pair share one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub(crate) fn next() -> Self {
        Self(NEXT_CONNECTION.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// One end of an established in-memory connection.
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    stream: DuplexStream,
    max_frame_bytes: usize,
}

/// A connection speaking [`Frame`](crate::net::frame::Frame)s.
pub type FramedConnection = Framed<DuplexStream, FrameCodec>;

impl Connection {
    pub(crate) fn new(id: ConnectionId, stream: DuplexStream, max_frame_bytes: usize) -> Self {
        Self {
            id,
            stream,
            max_frame_bytes,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Wrap the stream in the frame codec.
    pub fn framed(self) -> (ConnectionId, FramedConnection) {
        let codec = FrameCodec::new(self.max_frame_bytes);
        (self.id, Framed::new(self.stream, codec))
    }
}

/// Live server connection count, shared by the accept loop and shutdown.
#[derive(Debug, Clone, Default)]
pub struct ConnectionTracker {
    inner: Arc<TrackerInner>,
}

#[derive(Debug, Default)]
struct TrackerInner {
    active_count: AtomicU64,
    idle: Notify,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count `id` as live until the returned guard is dropped.
    pub fn track(&self, id: ConnectionId) -> ConnectionGuard {
        let active = self.inner.active_count.fetch_add(1, Ordering::SeqCst) + 1;
        metrics::record_active_connections(active);
        ConnectionGuard {
            tracker: Arc::clone(&self.inner),
            id,
        }
    }

    pub fn active_count(&self) -> u64 {
        self.inner.active_count.load(Ordering::SeqCst)
    }

    /// Wait until every tracked connection has closed.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            if self.active_count() == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Keeps one connection counted as live.
#[derive(Debug)]
pub struct ConnectionGuard {
    tracker: Arc<TrackerInner>,
    id: ConnectionId,
}

impl ConnectionGuard {
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        let remaining = self.tracker.active_count.fetch_sub(1, Ordering::SeqCst) - 1;
        metrics::record_active_connections(remaining);
        if remaining == 0 {
            self.tracker.idle.notify_waiters();
        }
        tracing::trace!(connection_id = %self.id, active_connections = remaining, "Connection released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn ids_increase() {
        let first = ConnectionId::next();
        let second = ConnectionId::next();
        assert!(second > first);
        assert_eq!(format!("{}", first), format!("conn-{}", first.get()));
    }

    #[test]
    fn guards_keep_connections_counted() {
        let tracker = ConnectionTracker::new();
        let shared = tracker.clone();

        let a = tracker.track(ConnectionId::next());
        let b = shared.track(ConnectionId::next());
        assert_eq!(shared.active_count(), 2);
        assert_ne!(a.id(), b.id());

        drop(b);
        assert_eq!(tracker.active_count(), 1);
        drop(a);
        assert_eq!(tracker.active_count(), 0);
    }

    #[tokio::test]
    async fn wait_idle_returns_when_last_guard_drops() {
        let tracker = ConnectionTracker::new();
        let guard = tracker.track(ConnectionId::next());

        let waiter = {
            let tracker = tracker.clone();
            tokio::spawn(async move { tracker.wait_idle().await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());
        drop(guard);

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("tracker never went idle")
            .unwrap();
    }

    #[tokio::test]
    async fn wait_idle_is_immediate_without_connections() {
        tokio::time::timeout(Duration::from_millis(50), ConnectionTracker::new().wait_idle())
            .await
            .unwrap();
    }
}
