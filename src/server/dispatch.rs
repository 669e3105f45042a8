//! Method routing in front of the interceptor chain.

use std::collections::HashMap;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_util::future::{self, BoxFuture, FutureExt};
use tower::Service;

use crate::context::CallContext;
use crate::interceptor::InterceptorChain;
use crate::request::Request;
use crate::status::{CallOutcome, Status};

use super::handler::UnaryHandler;

/// One decoded call, ready to dispatch.
#[derive(Debug)]
pub struct ServerCall {
    pub ctx: CallContext,
    pub method: String,
    pub request: Request<Bytes>,
}

/// Resolves a method to its handler and runs it through the chain.
///
/// Cloning shares the route table and chain.
#[derive(Clone)]
pub struct Dispatcher {
    chain: InterceptorChain,
    routes: Arc<HashMap<String, Arc<dyn UnaryHandler>>>,
}

impl Dispatcher {
    pub fn new(chain: InterceptorChain, routes: HashMap<String, Arc<dyn UnaryHandler>>) -> Self {
        Self {
            chain,
            routes: Arc::new(routes),
        }
    }

    pub fn has_route(&self, method: &str) -> bool {
        self.routes.contains_key(method)
    }

    pub fn methods(&self) -> impl Iterator<Item = &str> {
        self.routes.keys().map(String::as_str)
    }

    pub fn chain(&self) -> &InterceptorChain {
        &self.chain
    }
}

impl Service<ServerCall> for Dispatcher {
    type Response = Bytes;
    type Error = Status;
    type Future = BoxFuture<'static, CallOutcome<Bytes>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, call: ServerCall) -> Self::Future {
        match self.routes.get(&call.method) {
            Some(handler) => self.chain.run(call.ctx, call.request, Arc::clone(handler)),
            None => {
                tracing::warn!(method = %call.method, "Unknown method");
                future::ready(Err(Status::unknown(format!("unknown method {}", call.method)))).boxed()
            }
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("chain", &self.chain)
            .field("methods", &self.routes.keys().collect::<Vec<_>>())
            .finish()
    }
}
