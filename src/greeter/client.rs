//! Typed Greeter client.

use crate::client::Channel;
use crate::context::CallContext;
use crate::net::Dialer;
use crate::request::{IntoRequest, Request};
use crate::status::{CallOutcome, Status};

use super::messages::{self, HelloReply, HelloRequest};
use super::server::SAY_HELLO;

#[derive(Debug, Clone)]
pub struct GreeterClient {
    channel: Channel,
}

impl GreeterClient {
    pub fn new(channel: Channel) -> Self {
        Self { channel }
    }

    /// Dial the server and wrap the resulting channel.
    pub async fn connect(ctx: &CallContext, dialer: &Dialer) -> Result<Self, Status> {
        Ok(Self::new(Channel::connect(ctx, dialer).await?))
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    /// Call `SayHello`, bounded by `ctx`.
    pub async fn say_hello(
        &self,
        ctx: &CallContext,
        request: impl IntoRequest<HelloRequest>,
    ) -> CallOutcome<HelloReply> {
        let (metadata, message) = request.into_request().into_parts();
        let payload = messages::encode(&message)?;
        let response = self
            .channel
            .unary(ctx, SAY_HELLO, Request::from_parts(metadata, payload))
            .await?;
        messages::decode(&response)
    }
}
