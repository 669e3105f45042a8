//! Greeter request and reply messages.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::status::{CallOutcome, Status};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelloRequest {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelloReply {
    pub message: String,
}

/// Serialise a message for the wire. Failure here is the sender's fault.
pub(crate) fn encode<T: Serialize>(message: &T) -> CallOutcome<Bytes> {
    serde_json::to_vec(message)
        .map(Bytes::from)
        .map_err(|e| Status::internal(format!("failed to encode message: {}", e)))
}

/// Deserialise a received payload. Failure here is the peer's fault.
pub(crate) fn decode<T: for<'de> Deserialize<'de>>(payload: &[u8]) -> CallOutcome<T> {
    serde_json::from_slice(payload).map_err(|e| Status::invalid_argument(format!("failed to decode message: {}", e)))
}
