//! Server-imposed deadlines.

use std::time::Duration;

use bytes::Bytes;
use futures_util::future::{BoxFuture, FutureExt};

use crate::context::{CallContext, ContextError};
use crate::observability::metrics;
use crate::request::Request;
use crate::status::CallOutcome;

use super::chain::{Interceptor, Next};

/// Bounds the rest of the chain by a server-side budget.
///
/// The budget is layered onto the incoming context, so downstream stages see
/// whichever of the caller's and the server's deadlines is nearer. The rest of
/// the chain is raced against the derived context: once it is done the inner
/// future is dropped and the context's status returned, so a handler that
/// ignores its context cannot hold the call past the budget.
#[derive(Debug, Clone, Copy)]
pub struct TimeoutInterceptor {
    timeout: Duration,
}

impl TimeoutInterceptor {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Interceptor for TimeoutInterceptor {
    fn intercept(
        &self,
        ctx: CallContext,
        request: Request<Bytes>,
        next: Next,
    ) -> BoxFuture<'static, CallOutcome<Bytes>> {
        let timeout = self.timeout;
        async move {
            let (child, guard) = ctx.with_timeout(timeout);
            tracing::debug!(
                server_timeout = ?timeout,
                effective_remaining = ?child.remaining(),
                "Server timeout applied"
            );

            let outcome = child
                .run(next.run(child.clone(), request))
                .await
                .and_then(|outcome| outcome);

            if child.err() == Some(ContextError::DeadlineExceeded) {
                tracing::debug!(server_timeout = ?timeout, "Call stopped by server timeout");
                metrics::record_deadline_exceeded("interceptor");
            }

            guard.cancel();
            outcome
        }
        .boxed()
    }
}
