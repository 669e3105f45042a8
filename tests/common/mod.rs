//! Shared utilities for integration tests.

use std::future::Future;

use deadline_rpc::config::TransportConfig;
use deadline_rpc::context::CallContext;
use deadline_rpc::greeter::{GreeterClient, GreeterServer, HelloReply, HelloRequest};
use deadline_rpc::lifecycle::Shutdown;
use deadline_rpc::net::{self, Dialer};
use deadline_rpc::request::Request;
use deadline_rpc::server::{Server, ServerBuilder};
use deadline_rpc::status::CallOutcome;
use tokio::task::JoinHandle;

/// A running server plus a connected Greeter client.
#[allow(dead_code)]
pub struct Harness {
    pub client: GreeterClient,
    pub dialer: Dialer,
    pub shutdown: Shutdown,
    pub serving: JoinHandle<()>,
}

/// Start a Greeter server with a programmable handler. `configure` registers
/// interceptors on the builder before the service is added.
#[allow(dead_code)]
pub async fn start_programmable_greeter<C, F, Fut>(configure: C, f: F) -> Harness
where
    C: FnOnce(ServerBuilder) -> ServerBuilder,
    F: Fn(CallContext, Request<HelloRequest>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = CallOutcome<HelloReply>> + Send + 'static,
{
    let (listener, dialer) = net::listen(&TransportConfig::default());
    let shutdown = Shutdown::new();

    let server = configure(Server::builder())
        .add_service(GreeterServer::new(f))
        .build();
    let serving = tokio::spawn(server.serve_with_shutdown(listener, shutdown.clone()));

    let client = GreeterClient::connect(&CallContext::background(), &dialer)
        .await
        .unwrap();

    Harness {
        client,
        dialer,
        shutdown,
        serving,
    }
}

/// Hello request named `name`.
#[allow(dead_code)]
pub fn hello(name: &str) -> HelloRequest {
    HelloRequest { name: name.to_string() }
}
