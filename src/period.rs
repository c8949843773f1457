use chrono::Duration;

use crate::{MonitorError, Result};

/// Fallback bucket width when the interval unit is not recognized.
pub const DEFAULT_GRANULARITY_SECS: u32 = 60;

const MINUTE: i64 = 60;
const HOUR: i64 = 60 * MINUTE;
const DAY: i64 = 24 * HOUR;
const WEEK: i64 = 7 * DAY;

/// Splits a token such as `"6h"` into its leading count and the full trimmed token.
///
/// Only the leading run of ASCII digits is read as the count; whatever follows is
/// left to the caller, which inspects the trailing unit character.
fn split_token(token: &str) -> Result<(i64, &str)> {
    let token = token.trim();
    let digits = token
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(token.len());

    if digits == 0 {
        return Err(MonitorError::InvalidInput(format!(
            "duration token '{}' must start with a number",
            token
        )));
    }

    let count = token[..digits].parse::<i64>().map_err(|_| {
        MonitorError::InvalidInput(format!("duration token '{}' is out of range", token))
    })?;

    Ok((count, token))
}

fn scale(count: i64, unit_secs: i64, token: &str) -> Result<i64> {
    count.checked_mul(unit_secs).ok_or_else(|| {
        MonitorError::InvalidInput(format!("duration token '{}' is out of range", token))
    })
}

/// Parses the look-back window token (`h`, `d` or `w`).
///
/// Any other unit, `m` included, yields a zero duration so the window collapses to
/// nothing; the pipeline decides whether that is acceptable.
pub fn parse_window(token: &str) -> Result<Duration> {
    let (count, token) = split_token(token)?;

    let secs = if token.ends_with('h') {
        scale(count, HOUR, token)?
    } else if token.ends_with('d') {
        scale(count, DAY, token)?
    } else if token.ends_with('w') {
        scale(count, WEEK, token)?
    } else {
        0
    };

    Duration::try_seconds(secs).ok_or_else(|| {
        MonitorError::InvalidInput(format!("window '{}' is out of range", token))
    })
}

/// Parses the aggregation interval token (`m`, `h` or `d`) into seconds.
///
/// Unrecognized units fall back to [`DEFAULT_GRANULARITY_SECS`].
pub fn parse_granularity(token: &str) -> Result<u32> {
    let (count, token) = split_token(token)?;

    let secs = if token.ends_with('m') {
        scale(count, MINUTE, token)?
    } else if token.ends_with('h') {
        scale(count, HOUR, token)?
    } else if token.ends_with('d') {
        scale(count, DAY, token)?
    } else {
        return Ok(DEFAULT_GRANULARITY_SECS);
    };

    if secs == 0 {
        return Err(MonitorError::InvalidInput(format!(
            "interval '{}' must be at least one unit",
            token
        )));
    }

    u32::try_from(secs)
        .map_err(|_| MonitorError::InvalidInput(format!("interval '{}' is out of range", token)))
}
