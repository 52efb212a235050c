//! Schedule time parsing
//!
//! Turns operator input into a Unix timestamp for a campaign's send time or
//! a post's scheduled time.

use chrono::{DateTime, NaiveDateTime};

use crate::error::{Result, SocialcastError};

const ABSOLUTE_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"];

/// Parse a send time into Unix seconds
///
/// Supports:
/// - RFC 3339: "2025-03-01T09:30:00+01:00"
/// - UTC wall clock: "2025-03-01 08:30" or "2025-03-01 08:30:15"
/// - Relative to `now`: "30m", "2h", "1d", "1 hour"
///
/// # Errors
///
/// Returns `InvalidInput` for empty input or anything that does not parse.
pub fn parse_send_at(input: &str, now: i64) -> Result<i64> {
    let input = input.trim();
    if input.is_empty() {
        return Err(SocialcastError::InvalidInput(
            "Send time cannot be empty".to_string(),
        ));
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Ok(dt.timestamp());
    }

    for format in ABSOLUTE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(input, format) {
            return Ok(naive.and_utc().timestamp());
        }
    }

    if let Ok(duration) = humantime::parse_duration(input) {
        let secs = i64::try_from(duration.as_secs())
            .map_err(|_| SocialcastError::InvalidInput("Duration out of range".to_string()))?;
        return now
            .checked_add(secs)
            .ok_or_else(|| SocialcastError::InvalidInput("Duration out of range".to_string()));
    }

    Err(SocialcastError::InvalidInput(format!(
        "Could not parse send time: {}",
        input
    )))
}
