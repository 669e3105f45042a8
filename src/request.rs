//! Request wrapper and request IDs.
//!
//! # Responsibilities
//! - Pair a message with its call metadata
//! - Generate unique request IDs (UUID v4) for log correlation
//!
//! # Design Decisions
//! - Request ID is added by the client as early as possible; a caller-supplied
//!   ID is never replaced
//! - The server reads it back for its call span

use uuid::Uuid;

use crate::metadata::Metadata;

/// Metadata key carrying the request ID.
pub const X_REQUEST_ID: &str = "x-request-id";

/// A message plus the metadata that travels with it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Request<T> {
    metadata: Metadata,
    message: T,
}

impl<T> Request<T> {
    pub fn new(message: T) -> Self {
        Self {
            metadata: Metadata::new(),
            message,
        }
    }

    pub fn from_parts(metadata: Metadata, message: T) -> Self {
        Self { metadata, message }
    }

    pub fn into_parts(self) -> (Metadata, T) {
        (self.metadata, self.message)
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.metadata
    }

    pub fn get_ref(&self) -> &T {
        &self.message
    }

    pub fn into_inner(self) -> T {
        self.message
    }

    /// Replace the message, keeping the metadata.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Request<U> {
        Request {
            metadata: self.metadata,
            message: f(self.message),
        }
    }
}

/// Conversion into a [`Request`], so plain messages can be passed to clients.
pub trait IntoRequest<T> {
    fn into_request(self) -> Request<T>;
}

impl<T> IntoRequest<T> for T {
    fn into_request(self) -> Request<T> {
        Request::new(self)
    }
}

impl<T> IntoRequest<T> for Request<T> {
    fn into_request(self) -> Request<T> {
        self
    }
}

/// Unique request identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId(String);

impl RequestId {
    /// Generate a new random request ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Request ID accessors on [`Metadata`].
pub trait RequestIdExt {
    /// The request ID, if one was set.
    fn request_id(&self) -> Option<&str>;

    /// Set a fresh request ID unless one is already present; return it.
    fn ensure_request_id(&mut self) -> String;
}

impl RequestIdExt for Metadata {
    fn request_id(&self) -> Option<&str> {
        self.get(X_REQUEST_ID)
    }

    fn ensure_request_id(&mut self) -> String {
        if let Some(existing) = self.get(X_REQUEST_ID) {
            return existing.to_string();
        }
        let id = RequestId::new().to_string();
        self.insert(X_REQUEST_ID, id.clone());
        id
    }
}
