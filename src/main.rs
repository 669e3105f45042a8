//! Demo binary: one server, one client, one `SayHello` call over the
//! in-memory transport, with client and server budgets set from the command line.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::Parser;

use deadline_rpc::config::{load_config, RpcConfig};
use deadline_rpc::context::CallContext;
use deadline_rpc::deadline;
use deadline_rpc::greeter::{cooperative, oblivious, GreeterClient, GreeterServer, HelloRequest};
use deadline_rpc::interceptor::{RequireDeadlineInterceptor, TimeoutInterceptor, TracingInterceptor};
use deadline_rpc::lifecycle::Shutdown;
use deadline_rpc::net;
use deadline_rpc::observability::{logging, metrics};
use deadline_rpc::server::Server;
use deadline_rpc::status::Status;

#[derive(Parser)]
#[command(name = "deadline-rpc")]
#[command(about = "Run one SayHello call with client and server deadlines", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Client budget, e.g. `1s` or `500ms` (overrides timeouts.client_call_ms)
    #[arg(long, value_parser = parse_budget)]
    client_timeout: Option<Duration>,

    /// Server budget imposed by an interceptor (overrides timeouts.server_call_ms)
    #[arg(long, value_parser = parse_budget)]
    server_timeout: Option<Duration>,

    /// How long the handler works before replying
    #[arg(long, value_parser = parse_budget, default_value = "2s")]
    work: Duration,

    /// Use a handler that ignores its context
    #[arg(long)]
    oblivious: bool,

    /// Reject calls that carry no deadline
    #[arg(long)]
    require_deadline: bool,

    #[arg(short, long, default_value = "world")]
    name: String,
}

fn parse_budget(token: &str) -> Result<Duration, String> {
    deadline::decode(token).map_err(|status| status.message().to_string())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => RpcConfig::default(),
    };
    logging::init(&config.observability);

    let client_timeout = cli.client_timeout.or(config.timeouts.client_call());
    let server_timeout = cli.server_timeout.or(config.timeouts.server_call());

    tracing::info!(
        client_timeout = ?client_timeout,
        server_timeout = ?server_timeout,
        work = ?cli.work,
        oblivious = cli.oblivious,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let (listener, dialer) = net::listen(&config.transport);
    let shutdown = Shutdown::new();

    let mut builder = Server::builder().interceptor(TracingInterceptor);
    if cli.require_deadline {
        builder = builder.interceptor(RequireDeadlineInterceptor);
    }
    if let Some(timeout) = server_timeout {
        builder = builder.interceptor(TimeoutInterceptor::new(timeout));
    }
    let builder = if cli.oblivious {
        builder.add_service(GreeterServer::new(oblivious(cli.work)))
    } else {
        builder.add_service(GreeterServer::new(cooperative(cli.work)))
    };
    let serving = tokio::spawn(builder.build().serve_with_shutdown(listener, shutdown.clone()));

    let root = CallContext::background();
    let (dial_ctx, dial_guard) = root.with_timeout(config.timeouts.dial());
    let client = GreeterClient::connect(&dial_ctx, &dialer).await?;
    dial_guard.cancel();

    let (call_ctx, call_guard) = root.child_with_budget(client_timeout);
    let start = Instant::now();
    let outcome = tokio::select! {
        outcome = client.say_hello(&call_ctx, HelloRequest { name: cli.name.clone() }) => outcome,
        _ = tokio::signal::ctrl_c() => Err(Status::canceled("interrupted")),
    };
    call_guard.cancel();

    match &outcome {
        Ok(reply) => println!("{} (after {:?})", reply.message, start.elapsed()),
        Err(status) => println!("call failed: {} (after {:?})", status, start.elapsed()),
    }

    drop(client);
    shutdown.trigger();
    serving.await?;
    tracing::info!("Shutdown complete");

    outcome.map(|_| ()).map_err(Into::into)
}
