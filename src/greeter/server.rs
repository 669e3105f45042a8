//! Greeter service adapter.

use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use futures_util::future::{BoxFuture, FutureExt};

use crate::context::CallContext;
use crate::request::Request;
use crate::server::handler::{NamedHandler, UnaryHandler};
use crate::status::{CallOutcome, Status};

use super::messages::{self, HelloReply, HelloRequest};

/// Method path of `SayHello`.
pub const SAY_HELLO: &str = "/helloworld.Greeter/SayHello";

/// Business logic behind `SayHello`.
pub trait Greeter: Send + Sync + 'static {
    fn say_hello(
        &self,
        ctx: CallContext,
        request: Request<HelloRequest>,
    ) -> BoxFuture<'static, CallOutcome<HelloReply>>;
}

impl<F, Fut> Greeter for F
where
    F: Fn(CallContext, Request<HelloRequest>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = CallOutcome<HelloReply>> + Send + 'static,
{
    fn say_hello(
        &self,
        ctx: CallContext,
        request: Request<HelloRequest>,
    ) -> BoxFuture<'static, CallOutcome<HelloReply>> {
        self(ctx, request).boxed()
    }
}

/// Adapts a typed [`Greeter`] to the raw byte handler interface.
pub struct GreeterServer<G> {
    inner: Arc<G>,
}

impl<G: Greeter> GreeterServer<G> {
    pub fn new(greeter: G) -> Self {
        Self {
            inner: Arc::new(greeter),
        }
    }
}

impl<G> Clone for GreeterServer<G> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<G: Greeter> UnaryHandler for GreeterServer<G> {
    fn call(&self, ctx: CallContext, request: Request<Bytes>) -> BoxFuture<'static, CallOutcome<Bytes>> {
        let greeter = Arc::clone(&self.inner);
        async move {
            let (metadata, payload) = request.into_parts();
            let message: HelloRequest = messages::decode(&payload)?;
            let reply = greeter
                .say_hello(ctx, Request::from_parts(metadata, message))
                .await?;
            messages::encode(&reply)
        }
        .boxed()
    }
}

impl<G: Greeter> NamedHandler for GreeterServer<G> {
    const METHOD: &'static str = SAY_HELLO;
}

/// Reference greeter: replies `Hello <name>` after `work`, abandoning the
/// work when the context ends.
pub fn cooperative(work: std::time::Duration) -> impl Greeter {
    move |ctx: CallContext, request: Request<HelloRequest>| async move {
        ctx.run(tokio::time::sleep(work)).await?;
        Ok::<_, Status>(HelloReply {
            message: format!("Hello {}", request.get_ref().name),
        })
    }
}

/// Greeter that sleeps through `work` without looking at its context.
pub fn oblivious(work: std::time::Duration) -> impl Greeter {
    move |_ctx: CallContext, request: Request<HelloRequest>| async move {
        tokio::time::sleep(work).await;
        Ok::<_, Status>(HelloReply {
            message: format!("Hello {}", request.get_ref().name),
        })
    }
}
