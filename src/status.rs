//! Call status and error classification.
//!
//! Every layer (handler, interceptor, server dispatch, client resolver)
//! reports failure as a [`Status`]. The transport carries statuses verbatim
//! and never rewrites a code.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classification of a failed call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Code {
    /// A context deadline elapsed before the call completed.
    DeadlineExceeded,
    /// The call was cancelled before its deadline (caller or server shutdown).
    Canceled,
    /// Malformed deadline token, undecodable payload, or a request rejected
    /// for missing required context.
    InvalidArgument,
    /// Dial or transport failure.
    Unavailable,
    /// Server-side fault (handler panic, reply encoding).
    Internal,
    /// Anything else.
    Unknown,
}

impl Code {
    /// Stable lowercase label used in logs and metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            Code::DeadlineExceeded => "deadline_exceeded",
            Code::Canceled => "canceled",
            Code::InvalidArgument => "invalid_argument",
            Code::Unavailable => "unavailable",
            Code::Internal => "internal",
            Code::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for Code {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified call failure.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{code}: {message}")]
pub struct Status {
    code: Code,
    message: String,
}

impl Status {
    pub fn new(code: Code, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn deadline_exceeded(message: impl Into<String>) -> Self {
        Self::new(Code::DeadlineExceeded, message)
    }

    pub fn canceled(message: impl Into<String>) -> Self {
        Self::new(Code::Canceled, message)
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(Code::InvalidArgument, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(Code::Unavailable, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(Code::Internal, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(Code::Unknown, message)
    }

    pub fn code(&self) -> Code {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// The single result of one call attempt.
pub type CallOutcome<T> = Result<T, Status>;
