//! End-to-end deadline behaviour between a Greeter client and server.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use deadline_rpc::config::TransportConfig;
use deadline_rpc::context::CallContext;
use deadline_rpc::deadline::GRPC_TIMEOUT;
use deadline_rpc::greeter::{GreeterClient, HelloReply, HelloRequest};
use deadline_rpc::interceptor::{Next, RequireDeadlineInterceptor, TimeoutInterceptor};
use deadline_rpc::net::{self, Frame, ResponseEnvelope, WireOutcome};
use deadline_rpc::request::Request;
use deadline_rpc::status::{Code, Status};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

mod common;

fn greet(request: &Request<HelloRequest>) -> HelloReply {
    HelloReply {
        message: format!("Hello {}", request.get_ref().name),
    }
}

#[tokio::test]
async fn test_client_deadline_bounds_cooperative_handler() {
    let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
    let harness = common::start_programmable_greeter(
        |builder| builder,
        move |ctx: CallContext, req: Request<HelloRequest>| {
            let seen_tx = seen_tx.clone();
            async move {
                let _ = seen_tx.send(ctx.clone());
                ctx.run(tokio::time::sleep(Duration::from_secs(2))).await?;
                Ok::<_, Status>(greet(&req))
            }
        },
    )
    .await;

    let (ctx, _guard) = CallContext::background().with_timeout(Duration::from_millis(200));
    let start = Instant::now();
    let err = harness.client.say_hello(&ctx, common::hello("world")).await.unwrap_err();

    assert_eq!(err.code(), Code::DeadlineExceeded);
    assert!(start.elapsed() >= Duration::from_millis(190));
    assert!(start.elapsed() < Duration::from_secs(1));

    let server_ctx = seen_rx.recv().await.unwrap();
    assert!(server_ctx.deadline().is_some());

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(server_ctx.is_done());
}

#[tokio::test]
async fn test_server_interceptor_tightens_client_budget() {
    let harness = common::start_programmable_greeter(
        |builder| builder.interceptor(TimeoutInterceptor::new(Duration::from_millis(200))),
        |ctx: CallContext, req: Request<HelloRequest>| async move {
            ctx.run(tokio::time::sleep(Duration::from_secs(2))).await?;
            Ok::<_, Status>(greet(&req))
        },
    )
    .await;

    let (ctx, _guard) = CallContext::background().with_timeout(Duration::from_secs(2));
    let start = Instant::now();
    let err = harness.client.say_hello(&ctx, common::hello("world")).await.unwrap_err();

    assert_eq!(err.code(), Code::DeadlineExceeded);
    assert!(start.elapsed() < Duration::from_secs(1));
    assert!(!ctx.is_done());
}

#[tokio::test]
async fn test_server_timeout_stops_handler_that_ignores_context() {
    let harness = common::start_programmable_greeter(
        |builder| builder.interceptor(TimeoutInterceptor::new(Duration::from_millis(100))),
        |_ctx: CallContext, req: Request<HelloRequest>| async move {
            tokio::time::sleep(Duration::from_secs(2)).await;
            Ok::<_, Status>(greet(&req))
        },
    )
    .await;

    let start = Instant::now();
    let err = harness
        .client
        .say_hello(&CallContext::background(), common::hello("world"))
        .await
        .unwrap_err();

    assert_eq!(err.code(), Code::DeadlineExceeded);
    assert!(start.elapsed() < Duration::from_secs(1));
}

#[tokio::test]
async fn test_no_budget_runs_to_completion() {
    let saw_deadline = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&saw_deadline);
    let harness = common::start_programmable_greeter(
        |builder| builder,
        move |ctx: CallContext, req: Request<HelloRequest>| {
            let sink = Arc::clone(&sink);
            async move {
                *sink.lock().unwrap() = Some(ctx.deadline());
                tokio::time::sleep(Duration::from_millis(100)).await;
                Ok::<_, Status>(greet(&req))
            }
        },
    )
    .await;

    let reply = harness
        .client
        .say_hello(&CallContext::background(), common::hello("world"))
        .await
        .unwrap();

    assert_eq!(reply.message, "Hello world");
    assert_eq!(*saw_deadline.lock().unwrap(), Some(None));
}

#[tokio::test]
async fn test_late_success_is_discarded() {
    let harness = common::start_programmable_greeter(
        |builder| builder,
        |_ctx: CallContext, req: Request<HelloRequest>| async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            Ok::<_, Status>(greet(&req))
        },
    )
    .await;

    let (ctx, _guard) = CallContext::background().with_timeout(Duration::from_millis(100));
    let start = Instant::now();
    let err = harness.client.say_hello(&ctx, common::hello("world")).await.unwrap_err();

    assert_eq!(err.code(), Code::DeadlineExceeded);
    assert!(start.elapsed() < Duration::from_millis(140));
}

#[tokio::test]
async fn test_client_gives_up_on_server_that_ignores_budget() {
    let (mut listener, dialer) = net::listen(&TransportConfig::default());
    let server = tokio::spawn(async move {
        let (connection, _permit) = listener.accept().await.unwrap();
        let (_, mut framed) = connection.framed();
        let envelope = match framed.next().await {
            Some(Ok(Frame::Request(envelope))) => envelope,
            other => panic!("expected request, got {:?}", other),
        };

        tokio::time::sleep(Duration::from_millis(400)).await;
        let payload = serde_json::to_vec(&greet(&Request::new(common::hello("world")))).unwrap();
        let _ = framed
            .send(Frame::Response(ResponseEnvelope {
                call_id: envelope.call_id,
                outcome: WireOutcome::Success { payload: payload.into() },
            }))
            .await;

        // The client sent Cancel when it gave up.
        framed.next().await
    });

    let client = GreeterClient::connect(&CallContext::background(), &dialer).await.unwrap();
    let (ctx, _guard) = CallContext::background().with_timeout(Duration::from_millis(100));
    let start = Instant::now();
    let err = client.say_hello(&ctx, common::hello("world")).await.unwrap_err();

    assert_eq!(err.code(), Code::DeadlineExceeded);
    assert!(start.elapsed() >= Duration::from_millis(90));
    assert!(start.elapsed() < Duration::from_millis(300));

    let after = tokio::time::timeout(Duration::from_secs(1), server).await.unwrap().unwrap();
    assert!(matches!(after, Some(Ok(Frame::Cancel { .. }))));
}

#[tokio::test]
async fn test_malformed_timeout_token_is_invalid_argument() {
    let ran = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&ran);
    let harness = common::start_programmable_greeter(
        |builder| builder,
        move |_ctx: CallContext, req: Request<HelloRequest>| {
            flag.store(true, Ordering::SeqCst);
            async move { Ok::<_, Status>(greet(&req)) }
        },
    )
    .await;

    for token in ["abc", "-1s", "1.5s", "10x"] {
        let mut request = Request::new(common::hello("world"));
        request.metadata_mut().insert(GRPC_TIMEOUT, token);

        let err = harness
            .client
            .say_hello(&CallContext::background(), request)
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::InvalidArgument, "token {:?}", token);
    }
    assert!(!ran.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_hand_set_timeout_header_bounds_server() {
    let harness = common::start_programmable_greeter(
        |builder| builder,
        |ctx: CallContext, req: Request<HelloRequest>| async move {
            ctx.run(tokio::time::sleep(Duration::from_secs(2))).await?;
            Ok::<_, Status>(greet(&req))
        },
    )
    .await;

    let mut request = Request::new(common::hello("world"));
    request.metadata_mut().insert(GRPC_TIMEOUT, "100ms");

    let start = Instant::now();
    let err = harness
        .client
        .say_hello(&CallContext::background(), request)
        .await
        .unwrap_err();

    assert_eq!(err.code(), Code::DeadlineExceeded);
    assert!(start.elapsed() < Duration::from_secs(1));
}

#[tokio::test]
async fn test_tighter_of_header_and_context_wins() {
    let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
    let harness = common::start_programmable_greeter(
        |builder| builder,
        move |ctx: CallContext, req: Request<HelloRequest>| {
            let _ = seen_tx.send(ctx.remaining());
            async move { Ok::<_, Status>(greet(&req)) }
        },
    )
    .await;

    let mut request = Request::new(common::hello("world"));
    request.metadata_mut().insert(GRPC_TIMEOUT, "10s");
    let (ctx, _guard) = CallContext::background().with_timeout(Duration::from_millis(500));

    harness.client.say_hello(&ctx, request).await.unwrap();

    let remaining = seen_rx.recv().await.unwrap().unwrap();
    assert!(remaining <= Duration::from_millis(500));
}

#[tokio::test]
async fn test_require_deadline_rejects_unbounded_calls() {
    let harness = common::start_programmable_greeter(
        |builder| builder.interceptor(RequireDeadlineInterceptor),
        |_ctx: CallContext, req: Request<HelloRequest>| async move { Ok::<_, Status>(greet(&req)) },
    )
    .await;

    let err = harness
        .client
        .say_hello(&CallContext::background(), common::hello("world"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), Code::InvalidArgument);
    assert_eq!(err.message(), "deadline not set");

    let (ctx, _guard) = CallContext::background().with_timeout(Duration::from_secs(1));
    let reply = harness.client.say_hello(&ctx, common::hello("world")).await.unwrap();
    assert_eq!(reply.message, "Hello world");
}

#[tokio::test]
async fn test_interceptors_run_in_registration_order() {
    let order = Arc::new(Mutex::new(Vec::new()));
    let first = Arc::clone(&order);
    let second = Arc::clone(&order);

    let harness = common::start_programmable_greeter(
        move |builder| {
            builder
                .interceptor(move |ctx: CallContext, req: Request<bytes::Bytes>, next: Next| {
                    first.lock().unwrap().push("first");
                    next.run(ctx, req)
                })
                .interceptor(move |ctx: CallContext, req: Request<bytes::Bytes>, next: Next| {
                    second.lock().unwrap().push("second");
                    next.run(ctx, req)
                })
        },
        |_ctx: CallContext, req: Request<HelloRequest>| async move { Ok::<_, Status>(greet(&req)) },
    )
    .await;

    harness
        .client
        .say_hello(&CallContext::background(), common::hello("world"))
        .await
        .unwrap();

    assert_eq!(*order.lock().unwrap(), vec!["first", "second"]);
}

#[tokio::test]
async fn test_expiring_call_does_not_affect_sibling() {
    let harness = common::start_programmable_greeter(
        |builder| builder,
        |ctx: CallContext, req: Request<HelloRequest>| async move {
            ctx.run(tokio::time::sleep(Duration::from_millis(200))).await?;
            Ok::<_, Status>(greet(&req))
        },
    )
    .await;

    let (short, _short_guard) = CallContext::background().with_timeout(Duration::from_millis(50));
    let (long, _long_guard) = CallContext::background().with_timeout(Duration::from_secs(2));

    let (short_out, long_out) = tokio::join!(
        harness.client.say_hello(&short, common::hello("short")),
        harness.client.say_hello(&long, common::hello("long")),
    );

    assert_eq!(short_out.unwrap_err().code(), Code::DeadlineExceeded);
    assert_eq!(long_out.unwrap().message, "Hello long");
}

#[tokio::test]
async fn test_shutdown_fails_in_flight_call_with_unavailable() {
    let harness = common::start_programmable_greeter(
        |builder| builder,
        |ctx: CallContext, _req: Request<HelloRequest>| async move {
            ctx.done().await;
            Err::<HelloReply, _>(Status::canceled("stopped"))
        },
    )
    .await;

    let client = harness.client.clone();
    let call = tokio::spawn(async move {
        client
            .say_hello(&CallContext::background(), common::hello("world"))
            .await
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    harness.shutdown.trigger();

    let err = tokio::time::timeout(Duration::from_secs(1), call)
        .await
        .unwrap()
        .unwrap()
        .unwrap_err();
    assert_eq!(err.code(), Code::Unavailable);

    tokio::time::timeout(Duration::from_secs(1), harness.serving)
        .await
        .unwrap()
        .unwrap();

    let err = harness.dialer.dial(&CallContext::background()).await.unwrap_err();
    assert_eq!(err.code(), Code::Unavailable);
}
