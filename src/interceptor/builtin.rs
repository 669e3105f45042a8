//! Small pass-through and gatekeeping interceptors.

use std::time::Instant;

use bytes::Bytes;
use futures_util::future::{BoxFuture, FutureExt};

use crate::context::CallContext;
use crate::request::{Request, RequestIdExt};
use crate::status::{CallOutcome, Status};

use super::chain::{Interceptor, Next};

/// Rejects calls that arrive without any deadline.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequireDeadlineInterceptor;

impl Interceptor for RequireDeadlineInterceptor {
    fn intercept(
        &self,
        ctx: CallContext,
        request: Request<Bytes>,
        next: Next,
    ) -> BoxFuture<'static, CallOutcome<Bytes>> {
        if ctx.deadline().is_none() {
            tracing::warn!(
                request_id = request.metadata().request_id().unwrap_or("-"),
                "Rejecting call without deadline"
            );
            return futures_util::future::ready(Err(Status::invalid_argument("deadline not set"))).boxed();
        }
        next.run(ctx, request)
    }
}

/// Logs entry budget and outcome of every call. Passes the context through.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingInterceptor;

impl Interceptor for TracingInterceptor {
    fn intercept(
        &self,
        ctx: CallContext,
        request: Request<Bytes>,
        next: Next,
    ) -> BoxFuture<'static, CallOutcome<Bytes>> {
        async move {
            let start = Instant::now();
            tracing::debug!(
                remaining = ?ctx.remaining(),
                payload_bytes = request.get_ref().len(),
                "Call entered chain"
            );
            let outcome = next.run(ctx, request).await;
            match &outcome {
                Ok(payload) => tracing::debug!(
                    elapsed = ?start.elapsed(),
                    payload_bytes = payload.len(),
                    "Call left chain"
                ),
                Err(status) => tracing::debug!(
                    elapsed = ?start.elapsed(),
                    code = %status.code(),
                    message = status.message(),
                    "Call left chain with failure"
                ),
            }
            outcome
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interceptor::InterceptorChain;
    use crate::server::handler::UnaryHandler;
    use crate::status::Code;
    use std::sync::Arc;
    use std::time::Duration;

    fn ok_handler() -> Arc<dyn UnaryHandler> {
        Arc::new(|_ctx: CallContext, _req: Request<Bytes>| async {
            Ok::<_, Status>(Bytes::from_static(b"ok"))
        })
    }

    #[tokio::test]
    async fn require_deadline_rejects_unbounded_calls() {
        let chain = InterceptorChain::new(vec![Arc::new(RequireDeadlineInterceptor)]);
        let out = chain
            .run(CallContext::background(), Request::new(Bytes::new()), ok_handler())
            .await;
        let status = out.unwrap_err();
        assert_eq!(status.code(), Code::InvalidArgument);
        assert_eq!(status.message(), "deadline not set");
    }

    #[tokio::test]
    async fn require_deadline_admits_bounded_calls() {
        let (ctx, _guard) = CallContext::background().with_timeout(Duration::from_secs(1));
        let chain = InterceptorChain::new(vec![
            Arc::new(TracingInterceptor),
            Arc::new(RequireDeadlineInterceptor),
        ]);
        let out = chain.run(ctx, Request::new(Bytes::new()), ok_handler()).await;
        assert_eq!(out.unwrap(), Bytes::from_static(b"ok"));
    }
}
