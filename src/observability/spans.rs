//! Per-call spans.

use std::time::Duration;

use tracing::Span;

use super::metrics::Side;

/// Span covering one call on one side of the connection.
pub fn call_span(
    side: Side,
    call_id: u64,
    method: &str,
    request_id: Option<&str>,
    budget: Option<Duration>,
) -> Span {
    tracing::info_span!(
        "rpc_call",
        side = side.as_str(),
        call_id,
        method,
        request_id = request_id.unwrap_or("-"),
        budget = ?budget,
    )
}
