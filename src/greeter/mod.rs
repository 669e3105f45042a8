//! `helloworld.Greeter` service: one unary method, `SayHello`.
//!
//! Payloads are JSON documents carried as opaque bytes by the transport.

pub mod client;
pub mod messages;
pub mod server;

pub use client::GreeterClient;
pub use messages::{HelloReply, HelloRequest};
pub use server::{cooperative, oblivious, Greeter, GreeterServer, SAY_HELLO};
