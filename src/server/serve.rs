//! Server construction and the accept loop.

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::TimeoutConfig;
use crate::interceptor::{Interceptor, InterceptorChain, TimeoutInterceptor};
use crate::lifecycle::Shutdown;
use crate::net::{ConnectionTracker, Listener};

use super::conn::serve_connection;
use super::dispatch::Dispatcher;
use super::handler::{NamedHandler, UnaryHandler};

/// Unary RPC server over the in-memory transport.
#[derive(Debug, Clone)]
pub struct Server {
    dispatcher: Dispatcher,
    tracker: ConnectionTracker,
}

/// Builder registering interceptors (outermost first) and handlers.
#[derive(Default)]
pub struct ServerBuilder {
    interceptors: Vec<Arc<dyn Interceptor>>,
    routes: HashMap<String, Arc<dyn UnaryHandler>>,
}

impl ServerBuilder {
    /// Append an interceptor. The first one added runs outermost.
    pub fn interceptor(mut self, interceptor: impl Interceptor) -> Self {
        self.interceptors.push(Arc::new(interceptor));
        self
    }

    /// Apply the configured server-side call budget, if any.
    pub fn timeouts(self, timeouts: &TimeoutConfig) -> Self {
        match timeouts.server_call() {
            Some(timeout) => self.interceptor(TimeoutInterceptor::new(timeout)),
            None => self,
        }
    }

    /// Register `handler` for `method`. A later registration replaces an earlier one.
    pub fn route(mut self, method: impl Into<String>, handler: impl UnaryHandler) -> Self {
        let method = method.into();
        if self.routes.insert(method.clone(), Arc::new(handler)).is_some() {
            tracing::warn!(method = %method, "Replacing handler");
        }
        self
    }

    /// Register a handler under its own method path.
    pub fn add_service<S: NamedHandler>(self, service: S) -> Self {
        self.route(S::METHOD, service)
    }

    pub fn build(self) -> Server {
        Server {
            dispatcher: Dispatcher::new(InterceptorChain::new(self.interceptors), self.routes),
            tracker: ConnectionTracker::new(),
        }
    }
}

impl std::fmt::Debug for ServerBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerBuilder")
            .field("interceptors", &self.interceptors.len())
            .field("methods", &self.routes.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Server {
    pub fn builder() -> ServerBuilder {
        ServerBuilder::default()
    }

    /// Live connection tracker, shared with every clone of this server.
    pub fn connections(&self) -> &ConnectionTracker {
        &self.tracker
    }

    /// Serve until the listener is closed, then drain open connections.
    pub async fn serve(self, listener: Listener) {
        self.serve_with_shutdown(listener, Shutdown::new()).await
    }

    /// Serve until the listener is closed or `shutdown` is triggered.
    ///
    /// Every connection context is a child of the shutdown context, so
    /// triggering it cancels all in-flight calls and drops their connections.
    pub async fn serve_with_shutdown(self, mut listener: Listener, shutdown: Shutdown) {
        let root = shutdown.context();

        tracing::info!(
            methods = ?self.dispatcher.methods().collect::<Vec<_>>(),
            interceptors = self.dispatcher.chain().len(),
            max_connections = listener.max_connections(),
            "RPC server starting"
        );

        loop {
            let accepted = tokio::select! {
                biased;
                _ = root.done() => None,
                accepted = listener.accept() => accepted,
            };
            let Some((connection, permit)) = accepted else {
                break;
            };

            let guard = self.tracker.track(connection.id());
            tracing::debug!(
                connection_id = %connection.id(),
                active_connections = self.tracker.active_count(),
                available_permits = listener.available_permits(),
                "Accepted connection"
            );

            let dispatcher = self.dispatcher.clone();
            let parent = root.clone();
            tokio::spawn(async move {
                serve_connection(connection, dispatcher, parent).await;
                drop(guard);
                drop(permit);
            });
        }

        listener.close();
        tracing::info!(
            active_connections = self.tracker.active_count(),
            shutdown = shutdown.is_triggered(),
            "Stopped accepting, draining connections"
        );
        self.tracker.wait_idle().await;
        tracing::info!("RPC server stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TransportConfig;
    use crate::context::CallContext;
    use crate::net::listen;
    use crate::request::Request;
    use crate::status::{Code, Status};
    use bytes::Bytes;
    use std::time::Duration;

    fn noop(_ctx: CallContext, _req: Request<Bytes>) -> futures_util::future::Ready<Result<Bytes, Status>> {
        futures_util::future::ready(Ok(Bytes::new()))
    }

    #[test]
    fn builder_applies_configured_server_timeout() {
        let timeouts = TimeoutConfig {
            server_call_ms: Some(250),
            ..TimeoutConfig::default()
        };
        let server = Server::builder().timeouts(&timeouts).route("/a/B", noop).build();
        assert_eq!(server.dispatcher.chain().len(), 1);
        assert!(server.dispatcher.has_route("/a/B"));

        let server = Server::builder().timeouts(&TimeoutConfig::default()).build();
        assert!(server.dispatcher.chain().is_empty());
    }

    #[tokio::test]
    async fn shutdown_stops_accepting_and_refuses_dials() {
        let (listener, dialer) = listen(&TransportConfig::default());
        let shutdown = Shutdown::new();
        let server = Server::builder().route("/a/B", noop).build();
        let tracker = server.connections().clone();

        let serving = tokio::spawn(server.serve_with_shutdown(listener, shutdown.clone()));

        let _conn = dialer.dial(&CallContext::background()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(tracker.active_count(), 1);

        shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(1), serving)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(tracker.active_count(), 0);
        let err = dialer.dial(&CallContext::background()).await.unwrap_err();
        assert_eq!(err.code(), Code::Unavailable);
    }
}
