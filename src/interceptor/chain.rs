//! Interceptor trait and the chain that composes interceptors around a handler.

use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use futures_util::future::{BoxFuture, FutureExt};

use crate::context::CallContext;
use crate::request::Request;
use crate::server::handler::UnaryHandler;
use crate::status::CallOutcome;

/// Server-side middleware wrapping the rest of the chain.
///
/// An interceptor may pass the context through, derive a stricter child
/// from it and pass that down, or return a failure without calling `next`.
/// It must never replace the incoming context with a fresh root: that
/// would discard the caller's deadline.
pub trait Interceptor: Send + Sync + 'static {
    fn intercept(
        &self,
        ctx: CallContext,
        request: Request<Bytes>,
        next: Next,
    ) -> BoxFuture<'static, CallOutcome<Bytes>>;
}

impl<F, Fut> Interceptor for F
where
    F: Fn(CallContext, Request<Bytes>, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = CallOutcome<Bytes>> + Send + 'static,
{
    fn intercept(
        &self,
        ctx: CallContext,
        request: Request<Bytes>,
        next: Next,
    ) -> BoxFuture<'static, CallOutcome<Bytes>> {
        self(ctx, request, next).boxed()
    }
}

/// The remainder of the chain after the current interceptor.
#[derive(Clone)]
pub struct Next {
    interceptors: Arc<[Arc<dyn Interceptor>]>,
    index: usize,
    handler: Arc<dyn UnaryHandler>,
}

impl Next {
    /// Invoke the next interceptor, or the handler if none are left.
    pub fn run(self, ctx: CallContext, request: Request<Bytes>) -> BoxFuture<'static, CallOutcome<Bytes>> {
        match self.interceptors.get(self.index).cloned() {
            Some(interceptor) => {
                let next = Next {
                    index: self.index + 1,
                    ..self
                };
                interceptor.intercept(ctx, request, next)
            }
            None => self.handler.call(ctx, request),
        }
    }
}

impl std::fmt::Debug for Next {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Next")
            .field("remaining", &(self.interceptors.len() - self.index))
            .finish_non_exhaustive()
    }
}

/// Ordered interceptors, fixed at server construction.
///
/// The first interceptor is the outermost: it sees the request first and
/// the outcome last.
#[derive(Clone)]
pub struct InterceptorChain {
    interceptors: Arc<[Arc<dyn Interceptor>]>,
}

impl InterceptorChain {
    pub fn new(interceptors: Vec<Arc<dyn Interceptor>>) -> Self {
        Self {
            interceptors: interceptors.into(),
        }
    }

    /// Append an innermost interceptor.
    pub fn push(&mut self, interceptor: Arc<dyn Interceptor>) {
        let mut interceptors = self.interceptors.to_vec();
        interceptors.push(interceptor);
        self.interceptors = interceptors.into();
    }

    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }

    /// Run `request` through every interceptor and then `handler`.
    pub fn run(
        &self,
        ctx: CallContext,
        request: Request<Bytes>,
        handler: Arc<dyn UnaryHandler>,
    ) -> BoxFuture<'static, CallOutcome<Bytes>> {
        Next {
            interceptors: Arc::clone(&self.interceptors),
            index: 0,
            handler,
        }
        .run(ctx, request)
    }
}

impl Default for InterceptorChain {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl std::fmt::Debug for InterceptorChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterceptorChain")
            .field("interceptors", &format!("[{} interceptors]", self.interceptors.len()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::{Code, Status};
    use std::sync::Mutex;
    use std::time::Duration;

    fn recorder(log: Arc<Mutex<Vec<String>>>, name: &'static str) -> Arc<dyn Interceptor> {
        Arc::new(move |ctx: CallContext, req: Request<Bytes>, next: Next| {
            let log = Arc::clone(&log);
            async move {
                log.lock().unwrap().push(format!("enter {}", name));
                let outcome = next.run(ctx, req).await;
                log.lock().unwrap().push(format!("exit {}", name));
                outcome
            }
        })
    }

    fn echo() -> Arc<dyn UnaryHandler> {
        Arc::new(|_ctx: CallContext, req: Request<Bytes>| async move {
            Ok::<_, Status>(req.into_inner())
        })
    }

    #[tokio::test]
    async fn interceptors_nest_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = InterceptorChain::new(vec![
            recorder(Arc::clone(&log), "outer"),
            recorder(Arc::clone(&log), "inner"),
        ]);

        let out = chain
            .run(CallContext::background(), Request::new(Bytes::from_static(b"hi")), echo())
            .await;

        assert_eq!(out.unwrap(), Bytes::from_static(b"hi"));
        assert_eq!(
            *log.lock().unwrap(),
            vec!["enter outer", "enter inner", "exit inner", "exit outer"]
        );
    }

    #[tokio::test]
    async fn interceptor_can_short_circuit() {
        let reached = Arc::new(Mutex::new(false));
        let flag = Arc::clone(&reached);
        let handler: Arc<dyn UnaryHandler> = Arc::new(move |_ctx: CallContext, req: Request<Bytes>| {
            let flag = Arc::clone(&flag);
            async move {
                *flag.lock().unwrap() = true;
                Ok::<_, Status>(req.into_inner())
            }
        });
        let deny: Arc<dyn Interceptor> = Arc::new(|_ctx: CallContext, _req: Request<Bytes>, _next: Next| async {
            Err::<Bytes, _>(Status::invalid_argument("denied"))
        });

        let chain = InterceptorChain::new(vec![deny]);
        let out = chain
            .run(CallContext::background(), Request::new(Bytes::new()), handler)
            .await;

        assert_eq!(out.unwrap_err().code(), Code::InvalidArgument);
        assert!(!*reached.lock().unwrap());
    }

    #[tokio::test]
    async fn empty_chain_calls_handler_with_incoming_context() {
        let (ctx, _guard) = CallContext::background().with_timeout(Duration::from_secs(3));
        let expected = ctx.deadline();
        let handler: Arc<dyn UnaryHandler> = Arc::new(move |ctx: CallContext, _req: Request<Bytes>| async move {
            assert_eq!(ctx.deadline(), expected);
            Ok::<_, Status>(Bytes::new())
        });

        let chain = InterceptorChain::default();
        assert!(chain.is_empty());
        chain.run(ctx, Request::new(Bytes::new()), handler).await.unwrap();
    }
}
