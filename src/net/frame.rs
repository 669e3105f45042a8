//! Envelope framing over a duplex byte stream.
//!
//! Each frame is a length-prefixed JSON document. The business payload inside
//! an envelope is opaque bytes; the transport never looks into it, nor into the
//! `grpc-timeout` metadata entry.

use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder, LengthDelimitedCodec};

use crate::deadline::GRPC_TIMEOUT;
use crate::metadata::Metadata;
use crate::status::{CallOutcome, Code, Status};

/// A request as it travels from client to server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Connection-scoped identifier pairing a request with its response.
    pub call_id: u64,
    pub method: String,
    pub metadata: Metadata,
    pub payload: Bytes,
}

impl Envelope {
    /// The client's remaining budget token at send time, if any.
    pub fn encoded_budget(&self) -> Option<&str> {
        self.metadata.get(GRPC_TIMEOUT)
    }
}

/// Outcome of a call as carried on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WireOutcome {
    Success { payload: Bytes },
    Failure { code: Code, message: String },
}

impl From<CallOutcome<Bytes>> for WireOutcome {
    fn from(outcome: CallOutcome<Bytes>) -> Self {
        match outcome {
            Ok(payload) => WireOutcome::Success { payload },
            Err(status) => WireOutcome::Failure {
                code: status.code(),
                message: status.message().to_string(),
            },
        }
    }
}

impl From<WireOutcome> for CallOutcome<Bytes> {
    fn from(outcome: WireOutcome) -> Self {
        match outcome {
            WireOutcome::Success { payload } => Ok(payload),
            WireOutcome::Failure { code, message } => Err(Status::new(code, message)),
        }
    }
}

/// A response as it travels from server to client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub call_id: u64,
    pub outcome: WireOutcome,
}

/// Everything that crosses a connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "frame", rename_all = "snake_case")]
pub enum Frame {
    Request(Envelope),
    Response(ResponseEnvelope),
    /// The client gave up on a call; the server should cancel its context.
    Cancel { call_id: u64 },
}

/// Errors reading or writing frames.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed frame: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<FrameError> for Status {
    fn from(err: FrameError) -> Self {
        Status::unavailable(err.to_string())
    }
}

/// Length-delimited JSON codec for [`Frame`]s.
#[derive(Debug)]
pub struct FrameCodec {
    inner: LengthDelimitedCodec,
}

impl FrameCodec {
    pub fn new(max_frame_bytes: usize) -> Self {
        Self {
            inner: LengthDelimitedCodec::builder()
                .max_frame_length(max_frame_bytes)
                .new_codec(),
        }
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, FrameError> {
        match self.inner.decode(src)? {
            Some(body) => Ok(Some(serde_json::from_slice(&body)?)),
            None => Ok(None),
        }
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = FrameError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), FrameError> {
        let body = serde_json::to_vec(&frame)?;
        self.inner.encode(Bytes::from(body), dst)?;
        Ok(())
    }
}
