//! Per-connection serving loop.
//!
//! # Responsibilities
//! - Own the framed stream of one accepted connection
//! - Derive each call's context from the connection context and the decoded budget
//! - Race every handler against its call context and write exactly one response
//! - Cancel call contexts on `Cancel` frames, EOF and shutdown

use std::collections::HashMap;
use std::time::Instant;

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tower::ServiceExt;
use tracing::Instrument;

use crate::context::{CallContext, CancelGuard, ContextError};
use crate::deadline;
use crate::net::frame::{Envelope, Frame, ResponseEnvelope};
use crate::net::{Connection, ConnectionId, FramedConnection};
use crate::observability::metrics::{self, Side};
use crate::observability::spans;
use crate::request::{Request, RequestIdExt};
use crate::status::{CallOutcome, Code, Status};

use super::dispatch::{Dispatcher, ServerCall};

/// Serve one connection until EOF, a transport error, or `parent` is done.
pub(crate) async fn serve_connection(connection: Connection, dispatcher: Dispatcher, parent: CallContext) {
    let (id, framed) = connection.framed();
    let (conn_ctx, conn_guard) = parent.with_cancel();
    let (responses, outgoing) = mpsc::unbounded_channel();

    let mut task = ConnectionTask {
        id,
        framed,
        dispatcher,
        conn_ctx,
        calls: HashMap::new(),
        next_generation: 1,
        responses,
        outgoing,
    };

    tracing::debug!(connection_id = %id, "Connection opened");
    task.run().await;

    let abandoned = task.calls.len();
    // Dropping the guards cancels every call still in flight.
    drop(task);
    conn_guard.cancel();
    tracing::debug!(connection_id = %id, abandoned_calls = abandoned, "Connection closed");
}

struct ConnectionTask {
    id: ConnectionId,
    framed: FramedConnection,
    dispatcher: Dispatcher,
    conn_ctx: CallContext,
    /// In-flight calls by wire id, tagged with a per-connection generation.
    calls: HashMap<u64, (u64, CancelGuard)>,
    next_generation: u64,
    responses: mpsc::UnboundedSender<Outgoing>,
    outgoing: mpsc::UnboundedReceiver<Outgoing>,
}

/// A response queued for writing. `generation` is set for calls that were
/// registered in `calls` and is `None` for calls rejected at receipt.
struct Outgoing {
    generation: Option<u64>,
    response: ResponseEnvelope,
}

impl ConnectionTask {
    async fn run(&mut self) {
        loop {
            tokio::select! {
                biased;
                _ = self.conn_ctx.done() => {
                    tracing::debug!(connection_id = %self.id, "Connection context done, dropping connection");
                    return;
                }
                Some(Outgoing { generation, response }) = self.outgoing.recv() => {
                    let current = self.calls.get(&response.call_id).map(|(g, _)| *g);
                    if generation.is_some() && generation == current {
                        self.calls.remove(&response.call_id);
                    }
                    if let Err(e) = self.framed.send(Frame::Response(response)).await {
                        tracing::warn!(connection_id = %self.id, error = %e, "Failed to write response");
                        return;
                    }
                }
                frame = self.framed.next() => match frame {
                    Some(Ok(Frame::Request(envelope))) => self.start_call(envelope),
                    Some(Ok(Frame::Cancel { call_id })) => {
                        if let Some((_, guard)) = self.calls.remove(&call_id) {
                            tracing::debug!(connection_id = %self.id, call_id, "Call cancelled by client");
                            guard.cancel();
                        }
                    }
                    Some(Ok(Frame::Response(response))) => {
                        tracing::warn!(
                            connection_id = %self.id,
                            call_id = response.call_id,
                            "Ignoring response frame sent to server"
                        );
                    }
                    Some(Err(e)) => {
                        tracing::warn!(connection_id = %self.id, error = %e, "Connection read error");
                        return;
                    }
                    None => {
                        tracing::debug!(connection_id = %self.id, "Peer closed connection");
                        return;
                    }
                },
            }
        }
    }

    fn start_call(&mut self, envelope: Envelope) {
        let start = Instant::now();
        let Envelope {
            call_id,
            method,
            metadata,
            payload,
        } = envelope;

        if self.calls.contains_key(&call_id) {
            tracing::warn!(connection_id = %self.id, call_id, method = %method, "Rejecting duplicate call id");
            self.reject(call_id, &method, start, Status::invalid_argument("duplicate call id"));
            return;
        }

        // Budget is measured from receipt; clocks are never compared.
        let budget = match deadline::extract(&metadata) {
            Ok(budget) => budget,
            Err(status) => {
                tracing::warn!(
                    connection_id = %self.id,
                    call_id,
                    method = %method,
                    token = metadata.get(deadline::GRPC_TIMEOUT).unwrap_or_default(),
                    "Rejecting call with malformed timeout"
                );
                self.reject(call_id, &method, start, status);
                return;
            }
        };

        let (ctx, guard) = self.conn_ctx.child_with_budget(budget);
        let generation = self.next_generation;
        self.next_generation += 1;
        self.calls.insert(call_id, (generation, guard));

        let span = spans::call_span(Side::Server, call_id, &method, metadata.request_id(), budget);
        let call = ServerCall {
            ctx,
            method,
            request: Request::from_parts(metadata, payload),
        };
        let responses = self.responses.clone();
        let dispatcher = self.dispatcher.clone();

        tokio::spawn(
            async move {
                let outcome = run_call(dispatcher, call, start).await;
                let _ = responses.send(Outgoing {
                    generation: Some(generation),
                    response: ResponseEnvelope {
                        call_id,
                        outcome: outcome.into(),
                    },
                });
            }
            .instrument(span),
        );
    }

    /// Answer a call at receipt without running the chain.
    fn reject(&self, call_id: u64, method: &str, start: Instant, status: Status) {
        metrics::record_call(Side::Server, method, status.code().as_str(), start);
        let _ = self.responses.send(Outgoing {
            generation: None,
            response: ResponseEnvelope {
                call_id,
                outcome: Err::<Bytes, _>(status).into(),
            },
        });
    }
}

/// Run one call to its single outcome.
///
/// The handler gets its own task. If the call context ends first, the
/// context's status is returned at once and the handler task is left to run
/// out on its own; whatever it returns later is dropped.
async fn run_call(dispatcher: Dispatcher, call: ServerCall, start: Instant) -> CallOutcome<Bytes> {
    let ctx = call.ctx.clone();
    let method = call.method.clone();

    tracing::debug!(remaining = ?ctx.remaining(), "Call received");

    let mut handler = tokio::spawn(dispatcher.oneshot(call).in_current_span());

    let outcome = tokio::select! {
        biased;
        _ = ctx.done() => Err(context_status(&ctx)),
        joined = &mut handler => match joined {
            Ok(outcome) => outcome,
            Err(e) if e.is_panic() => {
                tracing::error!(method = %method, "Handler panicked");
                Err(Status::internal("handler panicked"))
            }
            Err(_) => Err(Status::canceled("handler task aborted")),
        },
    };

    // A success racing the deadline still loses to it.
    let outcome = match (outcome, ctx.status()) {
        (Ok(_), Some(status)) => Err(status),
        (outcome, _) => outcome,
    };

    let code = match &outcome {
        Ok(_) => "ok",
        Err(status) => status.code().as_str(),
    };
    match &outcome {
        Ok(_) => tracing::info!(elapsed = ?start.elapsed(), "Call completed"),
        Err(status) if status.code() == Code::DeadlineExceeded => {
            if ctx.err() == Some(ContextError::DeadlineExceeded) {
                metrics::record_deadline_exceeded("server");
            }
            tracing::info!(elapsed = ?start.elapsed(), code = %status.code(), "Call deadline exceeded");
        }
        Err(status) => tracing::info!(
            elapsed = ?start.elapsed(),
            code = %status.code(),
            message = status.message(),
            "Call failed"
        ),
    }
    metrics::record_call(Side::Server, &method, code, start);

    outcome
}

fn context_status(ctx: &CallContext) -> Status {
    ctx.status()
        .unwrap_or_else(|| Status::canceled("context canceled"))
}
