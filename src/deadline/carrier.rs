//! Moving a context's budget into and out of request metadata.

use std::time::Duration;

use crate::context::CallContext;
use crate::metadata::Metadata;
use crate::status::Status;

use super::token::{decode, encode, TimeBudget};

/// Metadata key carrying the caller's remaining budget.
pub const GRPC_TIMEOUT: &str = "grpc-timeout";

/// Write `ctx`'s remaining budget into `metadata`.
///
/// If the metadata already holds a valid token, the tighter budget is kept.
/// A hand-set token that does not parse is left alone for the receiver to
/// reject. Returns the budget that ends up on the wire.
pub fn attach(metadata: &mut Metadata, ctx: &CallContext) -> TimeBudget {
    let existing = match metadata.get(GRPC_TIMEOUT).map(decode) {
        Some(Ok(budget)) => Some(budget),
        Some(Err(_)) => return None,
        None => None,
    };

    let budget = match (existing, ctx.remaining()) {
        (Some(existing), Some(remaining)) => Some(existing.min(remaining)),
        (existing, remaining) => existing.or(remaining),
    };

    if let Some(budget) = budget {
        metadata.insert(GRPC_TIMEOUT, encode(budget));
    }
    budget
}

/// Read the caller's budget from `metadata`.
///
/// `Ok(None)` when no token is present.
pub fn extract(metadata: &Metadata) -> Result<Option<Duration>, Status> {
    metadata.get(GRPC_TIMEOUT).map(decode).transpose()
}
