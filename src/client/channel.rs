//! Client channel: one connection, many concurrent unary calls.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::context::{CallContext, ContextError};
use crate::deadline;
use crate::net::frame::{Envelope, Frame};
use crate::net::{Connection, ConnectionId, Dialer, FramedConnection};
use crate::observability::metrics::{self, Side};
use crate::observability::spans;
use crate::request::{Request, RequestIdExt};
use crate::status::{CallOutcome, Code, Status};

enum Command {
    Call {
        envelope: Envelope,
        reply: oneshot::Sender<CallOutcome<Bytes>>,
    },
    Cancel {
        call_id: u64,
    },
}

/// Handle to a client connection.
///
/// Cloning is cheap; all clones share the connection. The background task
/// owning the stream exits once every clone is dropped, [`close`](Self::close)
/// is called, or the server goes away.
#[derive(Clone)]
pub struct Channel {
    inner: Arc<ChannelInner>,
}

struct ChannelInner {
    id: ConnectionId,
    commands: mpsc::UnboundedSender<Command>,
    next_call_id: AtomicU64,
    closed: CancellationToken,
}

impl Channel {
    /// Dial the server, bounded by `ctx`.
    pub async fn connect(ctx: &CallContext, dialer: &Dialer) -> Result<Self, Status> {
        let connection = dialer.dial(ctx).await?;
        tracing::debug!(connection_id = %connection.id(), "Channel connected");
        Ok(Self::from_connection(connection))
    }

    /// Wrap an established connection and start its background task.
    pub fn from_connection(connection: Connection) -> Self {
        let (id, framed) = connection.framed();
        let (commands, command_rx) = mpsc::unbounded_channel();
        let closed = CancellationToken::new();

        tokio::spawn(drive(id, framed, command_rx, closed.clone()));

        Self {
            inner: Arc::new(ChannelInner {
                id,
                commands,
                next_call_id: AtomicU64::new(1),
                closed,
            }),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.inner.id
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.is_cancelled()
    }

    /// Drop the connection. Pending and later calls fail with `Unavailable`.
    pub fn close(&self) {
        self.inner.closed.cancel();
    }

    /// Issue one unary call and resolve it to exactly one outcome.
    ///
    /// The response, the expiry of `ctx` and loss of the connection race; on a
    /// tie `ctx` wins. A success that arrives after `ctx` is done is reported
    /// as the context's failure.
    pub async fn unary(&self, ctx: &CallContext, method: &str, request: Request<Bytes>) -> CallOutcome<Bytes> {
        if let Some(status) = ctx.status() {
            tracing::debug!(method, code = %status.code(), "Context done before send");
            return Err(status);
        }

        let start = Instant::now();
        let call_id = self.inner.next_call_id.fetch_add(1, Ordering::Relaxed);
        let (mut metadata, payload) = request.into_parts();
        let request_id = metadata.ensure_request_id();
        let budget = deadline::attach(&mut metadata, ctx);

        let span = spans::call_span(Side::Client, call_id, method, Some(&request_id), budget);
        let envelope = Envelope {
            call_id,
            method: method.to_string(),
            metadata,
            payload,
        };

        let outcome = self.resolve(ctx, envelope).instrument(span.clone()).await;

        let code = span.in_scope(|| match &outcome {
            Ok(_) => {
                tracing::debug!(elapsed = ?start.elapsed(), "Call succeeded");
                "ok"
            }
            Err(status) => {
                if status.code() == Code::DeadlineExceeded && ctx.err() == Some(ContextError::DeadlineExceeded) {
                    metrics::record_deadline_exceeded("client");
                }
                tracing::debug!(
                    elapsed = ?start.elapsed(),
                    code = %status.code(),
                    message = status.message(),
                    "Call failed"
                );
                status.code().as_str()
            }
        });
        metrics::record_call(Side::Client, method, code, start);
        outcome
    }

    async fn resolve(&self, ctx: &CallContext, envelope: Envelope) -> CallOutcome<Bytes> {
        let call_id = envelope.call_id;
        if self.is_closed() {
            return Err(Status::unavailable("connection closed"));
        }

        let (reply, response) = oneshot::channel();
        if self.inner.commands.send(Command::Call { envelope, reply }).is_err() {
            return Err(Status::unavailable("connection closed"));
        }
        // Sends the Cancel frame on ctx expiry and when this future is dropped.
        let in_flight = InFlight {
            call_id,
            commands: self.inner.commands.clone(),
            answered: false,
        };

        let outcome = tokio::select! {
            biased;
            _ = ctx.done() => {
                drop(in_flight);
                Err(ctx.status().unwrap_or_else(|| Status::canceled("context canceled")))
            }
            response = response => {
                in_flight.answered();
                match response {
                    Ok(outcome) => outcome,
                    Err(_) => Err(Status::unavailable("connection closed")),
                }
            }
        };

        match (outcome, ctx.status()) {
            (Ok(_), Some(status)) => {
                tracing::debug!("Discarding success that arrived after the context was done");
                Err(status)
            }
            (outcome, _) => outcome,
        }
    }
}

/// A sent call still waiting on its response.
///
/// Unless [`answered`](Self::answered) is called, dropping it asks the
/// background task to forget the call and send a `Cancel` frame.
struct InFlight {
    call_id: u64,
    commands: mpsc::UnboundedSender<Command>,
    answered: bool,
}

impl InFlight {
    fn answered(mut self) {
        self.answered = true;
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if !self.answered {
            let _ = self.commands.send(Command::Cancel { call_id: self.call_id });
        }
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("id", &self.inner.id)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Own the framed stream: write requests and cancels, route responses to
/// their waiting callers by call id.
async fn drive(
    id: ConnectionId,
    mut framed: FramedConnection,
    mut commands: mpsc::UnboundedReceiver<Command>,
    closed: CancellationToken,
) {
    let mut pending: HashMap<u64, oneshot::Sender<CallOutcome<Bytes>>> = HashMap::new();

    let reason = loop {
        tokio::select! {
            _ = closed.cancelled() => break "channel closed",
            command = commands.recv() => match command {
                Some(Command::Call { envelope, reply }) => {
                    let call_id = envelope.call_id;
                    if let Err(e) = framed.send(Frame::Request(envelope)).await {
                        tracing::warn!(connection_id = %id, call_id, error = %e, "Failed to send request");
                        let _ = reply.send(Err(Status::from(e)));
                        break "write failed";
                    }
                    pending.insert(call_id, reply);
                }
                Some(Command::Cancel { call_id }) => {
                    if pending.remove(&call_id).is_some() {
                        if let Err(e) = framed.send(Frame::Cancel { call_id }).await {
                            tracing::warn!(connection_id = %id, call_id, error = %e, "Failed to send cancel");
                            break "write failed";
                        }
                    }
                }
                None => break "all handles dropped",
            },
            frame = framed.next() => match frame {
                Some(Ok(Frame::Response(response))) => match pending.remove(&response.call_id) {
                    Some(reply) => {
                        let _ = reply.send(response.outcome.into());
                    }
                    None => tracing::debug!(
                        connection_id = %id,
                        call_id = response.call_id,
                        "Dropping response for abandoned call"
                    ),
                },
                Some(Ok(_)) => {
                    tracing::warn!(connection_id = %id, "Ignoring non-response frame from server");
                }
                Some(Err(e)) => {
                    tracing::warn!(connection_id = %id, error = %e, "Connection read error");
                    break "read failed";
                }
                None => break "server closed connection",
            },
        }
    };

    closed.cancel();
    tracing::debug!(connection_id = %id, reason, pending_calls = pending.len(), "Channel closed");
    for (_, reply) in pending.drain() {
        let _ = reply.send(Err(Status::unavailable(format!("connection lost: {}", reason))));
    }
}
