//! Text encoding of a relative time budget.
//!
//! Tokens are `<digits><unit>` with unit one of `h`, `m`, `s`, `ms`, `us`,
//! `ns`, e.g. `1s` or `500ms`.

use std::time::Duration;

use crate::status::Status;

/// A relative duration before a deadline; `None` means no budget.
pub type TimeBudget = Option<Duration>;

const NANOS_PER_MICRO: u128 = 1_000;
const NANOS_PER_MILLI: u128 = 1_000_000;
const NANOS_PER_SEC: u128 = 1_000_000_000;
const NANOS_PER_MIN: u128 = 60 * NANOS_PER_SEC;
const NANOS_PER_HOUR: u128 = 60 * NANOS_PER_MIN;

/// Coarsest first, so encoding picks the shortest exact form.
const UNITS: [(&str, u128); 6] = [
    ("h", NANOS_PER_HOUR),
    ("m", NANOS_PER_MIN),
    ("s", NANOS_PER_SEC),
    ("ms", NANOS_PER_MILLI),
    ("us", NANOS_PER_MICRO),
    ("ns", 1),
];

/// Encode a budget using the coarsest unit that represents it exactly.
pub fn encode(budget: Duration) -> String {
    let nanos = budget.as_nanos();
    if nanos == 0 {
        return "0ns".to_string();
    }
    for (unit, scale) in UNITS {
        if nanos % scale == 0 {
            return format!("{}{}", nanos / scale, unit);
        }
    }
    format!("{}ns", nanos)
}

/// Encode an optional budget; no budget produces no token.
pub fn encode_budget(budget: TimeBudget) -> Option<String> {
    budget.map(encode)
}

/// Decode a token produced by [`encode`] or written by hand.
pub fn decode(token: &str) -> Result<Duration, Status> {
    let token = token.trim();
    let split = token
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(token.len());
    let (digits, unit) = token.split_at(split);

    if digits.is_empty() {
        return Err(invalid(token, "missing magnitude"));
    }

    let value: u128 = digits
        .parse()
        .map_err(|_| invalid(token, "magnitude out of range"))?;

    let scale = UNITS
        .iter()
        .find(|(name, _)| *name == unit)
        .map(|(_, scale)| *scale)
        .ok_or_else(|| invalid(token, "unknown unit"))?;

    let nanos = value
        .checked_mul(scale)
        .ok_or_else(|| invalid(token, "magnitude out of range"))?;

    let secs = u64::try_from(nanos / NANOS_PER_SEC)
        .map_err(|_| invalid(token, "magnitude out of range"))?;
    // Remainder of a division by 1e9 always fits in u32.
    let subsec = (nanos % NANOS_PER_SEC) as u32;

    Ok(Duration::new(secs, subsec))
}

fn invalid(token: &str, reason: &str) -> Status {
    Status::invalid_argument(format!("malformed timeout token {:?}: {}", token, reason))
}
