//! TTL Normalizer Module
//!
//! Converts a caller-supplied expiry into the absolute epoch-millisecond
//! timestamp sent on the wire.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::error::{ClientError, Result};

const SECOND_MS: f64 = 1_000.0;
const MINUTE_MS: f64 = 60.0 * SECOND_MS;
const HOUR_MS: f64 = 60.0 * MINUTE_MS;
const DAY_MS: f64 = 24.0 * HOUR_MS;
const WEEK_MS: f64 = 7.0 * DAY_MS;
const YEAR_MS: f64 = 365.25 * DAY_MS;

/// Longest duration string accepted.
const MAX_INPUT_LEN: usize = 100;

// == Expiry ==
/// A relative expiry as supplied by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expiry {
    /// Duration in milliseconds
    Millis(u64),
    /// Human readable duration such as `"10 seconds"` or `"2h"`
    Human(String),
}

impl From<u64> for Expiry {
    fn from(ms: u64) -> Self {
        Expiry::Millis(ms)
    }
}

impl From<u32> for Expiry {
    fn from(ms: u32) -> Self {
        Expiry::Millis(ms.into())
    }
}

impl From<Duration> for Expiry {
    fn from(duration: Duration) -> Self {
        Expiry::Millis(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }
}

impl From<&str> for Expiry {
    fn from(text: &str) -> Self {
        Expiry::Human(text.to_string())
    }
}

impl From<String> for Expiry {
    fn from(text: String) -> Self {
        Expiry::Human(text)
    }
}

impl Expiry {
    /// Returns the relative duration in milliseconds.
    pub fn as_millis(&self) -> Result<u64> {
        match self {
            Expiry::Millis(ms) => Ok(*ms),
            Expiry::Human(text) => parse_duration_ms(text),
        }
    }
}

// == Normalize ==
/// Returns `now + expiry` using the current wall clock.
pub fn normalize(expiry: &Expiry) -> Result<u64> {
    normalize_at(expiry, current_timestamp_ms())
}

/// Returns `now_ms + expiry`. Pure: the same inputs always give the same output.
pub fn normalize_at(expiry: &Expiry, now_ms: u64) -> Result<u64> {
    let duration = expiry.as_millis()?;
    now_ms
        .checked_add(duration)
        .ok_or_else(|| ClientError::InvalidDuration(format!("{expiry:?} overflows the clock")))
}

// == Parse Duration ==
/// Parses a human readable duration into milliseconds.
///
/// A bare number is milliseconds. Units are case-insensitive and may be
/// separated from the number by spaces; fractions are allowed
/// (`"1.5h"`, `".5s"`). Negative values are rejected.
pub fn parse_duration_ms(input: &str) -> Result<u64> {
    let invalid = || ClientError::InvalidDuration(input.to_string());

    let text = input.trim();
    if text.is_empty() || text.len() > MAX_INPUT_LEN {
        return Err(invalid());
    }

    let split = text
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(text.len());
    let (number, unit) = text.split_at(split);

    // Digits must follow a decimal point; only spaces may precede the unit.
    if number.ends_with('.') {
        return Err(invalid());
    }
    let amount: f64 = number.parse().map_err(|_| invalid())?;
    let unit = unit.trim_start_matches(' ');
    let factor = unit_factor(&unit.to_ascii_lowercase()).ok_or_else(invalid)?;

    let ms = (amount * factor).round();
    if !ms.is_finite() || ms < 0.0 || ms >= u64::MAX as f64 {
        return Err(invalid());
    }
    Ok(ms as u64)
}

fn unit_factor(unit: &str) -> Option<f64> {
    let factor = match unit {
        "" | "ms" | "msec" | "msecs" | "millisecond" | "milliseconds" => 1.0,
        "s" | "sec" | "secs" | "second" | "seconds" => SECOND_MS,
        "m" | "min" | "mins" | "minute" | "minutes" => MINUTE_MS,
        "h" | "hr" | "hrs" | "hour" | "hours" => HOUR_MS,
        "d" | "day" | "days" => DAY_MS,
        "w" | "week" | "weeks" => WEEK_MS,
        "y" | "yr" | "yrs" | "year" | "years" => YEAR_MS,
        _ => return None,
    };
    Some(factor)
}

// == Utility Functions ==
/// Returns current Unix timestamp in milliseconds.
pub fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}
