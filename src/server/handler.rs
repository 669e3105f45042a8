//! Terminal call handlers.

use std::future::Future;

use bytes::Bytes;
use futures_util::future::{BoxFuture, FutureExt};

use crate::context::CallContext;
use crate::request::Request;
use crate::status::CallOutcome;

/// Innermost stage of a server call: business logic over raw payload bytes.
///
/// A handler receives whatever context the interceptor chain passed down.
/// Handlers doing bounded work should race it against that context
/// (see [`CallContext::run`]); a handler that ignores it still has its late
/// result discarded, but keeps running until it finishes on its own.
pub trait UnaryHandler: Send + Sync + 'static {
    fn call(&self, ctx: CallContext, request: Request<Bytes>) -> BoxFuture<'static, CallOutcome<Bytes>>;
}

impl<F, Fut> UnaryHandler for F
where
    F: Fn(CallContext, Request<Bytes>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = CallOutcome<Bytes>> + Send + 'static,
{
    fn call(&self, ctx: CallContext, request: Request<Bytes>) -> BoxFuture<'static, CallOutcome<Bytes>> {
        self(ctx, request).boxed()
    }
}

/// A handler bound to a fixed method path.
pub trait NamedHandler: UnaryHandler {
    /// Fully-qualified method path, e.g. `/helloworld.Greeter/SayHello`.
    const METHOD: &'static str;
}
