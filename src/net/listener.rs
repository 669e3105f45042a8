//! In-memory listener and dialer with backpressure.
//!
//! # Responsibilities
//! - Hand out in-process duplex connections (no sockets involved)
//! - Bound the accept backlog; `dial` waits for room, up to its context deadline
//! - Enforce max_connections limit via semaphore
//! - Report a closed listener as `Unavailable` to dialers

use std::sync::Arc;

use tokio::io::DuplexStream;
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::config::TransportConfig;
use crate::context::CallContext;
use crate::net::connection::{Connection, ConnectionId};
use crate::status::Status;

/// Create a connected listener/dialer pair.
pub fn listen(config: &TransportConfig) -> (Listener, Dialer) {
    let (tx, rx) = mpsc::channel(config.accept_backlog.max(1));
    let closed = CancellationToken::new();

    tracing::info!(
        buffer_size = config.buffer_size,
        max_connections = config.max_connections,
        accept_backlog = config.accept_backlog,
        "In-memory listener bound"
    );

    let listener = Listener {
        incoming: rx,
        closed: closed.clone(),
        connection_limit: Arc::new(Semaphore::new(config.max_connections)),
        max_connections: config.max_connections,
        max_frame_bytes: config.max_frame_bytes,
    };
    let dialer = Dialer {
        outgoing: tx,
        closed,
        buffer_size: config.buffer_size,
        max_frame_bytes: config.max_frame_bytes,
    };
    (listener, dialer)
}

/// Server side of the in-memory transport.
///
/// Uses a semaphore to enforce `max_connections`. When the limit is reached,
/// `accept` waits until a slot becomes available.
pub struct Listener {
    incoming: mpsc::Receiver<(ConnectionId, DuplexStream)>,
    closed: CancellationToken,
    connection_limit: Arc<Semaphore>,
    max_connections: usize,
    max_frame_bytes: usize,
}

impl Listener {
    /// Take the next dialed connection once a slot is free.
    ///
    /// Returns `None` once the listener is closed or every dialer is gone.
    /// The permit must be held for the connection's lifetime.
    pub async fn accept(&mut self) -> Option<(Connection, ConnectionPermit)> {
        // Slot first, so a full server leaves dialers queued in the backlog.
        let permit = tokio::select! {
            _ = self.closed.cancelled() => return None,
            permit = self.connection_limit.clone().acquire_owned() => permit.ok()?,
        };

        let (id, stream) = tokio::select! {
            _ = self.closed.cancelled() => return None,
            incoming = self.incoming.recv() => incoming?,
        };

        let connection = Connection::new(id, stream, self.max_frame_bytes);
        tracing::debug!(
            connection_id = %connection.id(),
            available_permits = self.connection_limit.available_permits(),
            "Connection accepted"
        );

        Some((connection, ConnectionPermit { _permit: permit }))
    }

    /// Stop accepting; pending and future dials fail with `Unavailable`.
    pub fn close(&self) {
        self.closed.cancel();
    }

    /// A handle that can close this listener from elsewhere.
    pub fn closer(&self) -> ListenerCloser {
        ListenerCloser(self.closed.clone())
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Slots left before `accept` starts waiting.
    pub fn available_permits(&self) -> usize {
        self.connection_limit.available_permits()
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.closed.cancel();
    }
}

/// Closes a [`Listener`] it was taken from.
#[derive(Debug, Clone)]
pub struct ListenerCloser(CancellationToken);

impl ListenerCloser {
    pub fn close(&self) {
        self.0.cancel();
    }
}

/// Client side of the in-memory transport.
#[derive(Debug, Clone)]
pub struct Dialer {
    outgoing: mpsc::Sender<(ConnectionId, DuplexStream)>,
    closed: CancellationToken,
    buffer_size: usize,
    max_frame_bytes: usize,
}

impl Dialer {
    /// Establish a connection, giving up when `ctx` is done.
    ///
    /// Fails with `DeadlineExceeded` (or `Canceled`) if the listener's backlog
    /// stays full until `ctx` ends, and with `Unavailable` if the listener is
    /// closed.
    pub async fn dial(&self, ctx: &CallContext) -> Result<Connection, Status> {
        if let Some(status) = ctx.status() {
            return Err(status);
        }
        if self.closed.is_cancelled() {
            return Err(Status::unavailable("listener closed"));
        }

        let (client, server) = tokio::io::duplex(self.buffer_size);
        let id = ConnectionId::next();

        tokio::select! {
            biased;
            _ = ctx.done() => {
                tracing::debug!("Dial abandoned: context done before listener accepted");
                Err(ctx
                    .status()
                    .unwrap_or_else(|| Status::deadline_exceeded("dial deadline exceeded")))
            }
            _ = self.closed.cancelled() => Err(Status::unavailable("listener closed")),
            sent = self.outgoing.send((id, server)) => match sent {
                Ok(()) => Ok(Connection::new(id, client, self.max_frame_bytes)),
                Err(_) => Err(Status::unavailable("listener closed")),
            },
        }
    }
}

/// One of the listener's `max_connections` slots, held while a connection is served.
#[derive(Debug)]
pub struct ConnectionPermit {
    _permit: tokio::sync::OwnedSemaphorePermit,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::Code;
    use std::time::Duration;

    fn small_config() -> TransportConfig {
        TransportConfig {
            accept_backlog: 1,
            max_connections: 1,
            ..TransportConfig::default()
        }
    }

    #[tokio::test]
    async fn dial_and_accept_pair_up() {
        let (mut listener, dialer) = listen(&small_config());
        let ctx = CallContext::background();
        let client = dialer.dial(&ctx).await.unwrap();
        let (server, _permit) = listener.accept().await.unwrap();
        assert_eq!(client.id(), server.id());
        assert_eq!(listener.available_permits(), 0);
    }

    #[tokio::test]
    async fn dial_respects_context_deadline_when_backlog_full() {
        let (_listener, dialer) = listen(&small_config());
        let ctx = CallContext::background();
        // Fills the single backlog slot; nobody accepts.
        let _first = dialer.dial(&ctx).await.unwrap();

        let (short, _guard) = ctx.with_timeout(Duration::from_millis(50));
        let err = dialer.dial(&short).await.unwrap_err();
        assert_eq!(err.code(), Code::DeadlineExceeded);
    }

    #[tokio::test]
    async fn dial_on_closed_listener_is_unavailable() {
        let (listener, dialer) = listen(&small_config());
        listener.close();
        let err = dialer.dial(&CallContext::background()).await.unwrap_err();
        assert_eq!(err.code(), Code::Unavailable);

        drop(listener);
        let err = dialer.dial(&CallContext::background()).await.unwrap_err();
        assert_eq!(err.code(), Code::Unavailable);
    }

    #[tokio::test]
    async fn dial_with_done_context_fails_fast() {
        let (_listener, dialer) = listen(&small_config());
        let ctx = CallContext::background();
        ctx.cancel();
        assert_eq!(dialer.dial(&ctx).await.unwrap_err().code(), Code::Canceled);
    }

    #[tokio::test]
    async fn accept_returns_none_after_close() {
        let (mut listener, _dialer) = listen(&small_config());
        let closer = listener.closer();
        closer.close();
        assert!(listener.accept().await.is_none());
        assert!(listener.is_closed());
    }
}
