//! Timestamp parsing and conversion helpers.
//!
//! What this module provides:
//! - [`parse_ts_to_utc`]: Parse a ledger/cursor timestamp. RFC-3339 with an offset is
//!   converted to UTC; naive ISO-8601 values (`2025-01-01T10:00:00[.ffffff]`) and bare
//!   dates (`2025-01-01`), which older ledgers contain, are taken as UTC.
//! - [`from_local_naive_with_policy`]: Convert a naive local timestamp in an IANA zone
//!   to UTC, with an explicit [`DstPolicy`] for gaps and ambiguities.
//! - [`period_start_utc`]: Midnight of a dump period date in the dump's zone, as UTC.
//! - [`to_rfc3339`]: The single on-disk timestamp format.
//!
//! Notes:
//! - Ambiguous local times happen during "fall back" when a wall time occurs twice.
//! - Nonexistent local times happen during "spring forward" when a wall time is skipped.
//!   Some zones skip midnight itself, so period dates use [`DstPolicy::ShiftForward`].
//! - Everything written to disk is UTC.

use anyhow::Context;
use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use chrono_tz::Tz;

/// Ledger/cursor timestamp -> UTC.
///
/// Example:
/// - "2024-03-10T09:30:00-05:00" -> "2024-03-10T14:30:00Z"
/// - "2024-03-10T09:30:00"       -> "2024-03-10T09:30:00Z"
/// - "2024-03-10"                -> "2024-03-10T00:00:00Z"
pub fn parse_ts_to_utc(s: &str) -> anyhow::Result<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
        return Ok(Utc.from_utc_datetime(&naive));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return Ok(Utc.from_utc_datetime(&naive));
    }
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d").with_context(|| format!("bad timestamp: {s}"))?;
    Ok(Utc.from_utc_datetime(&date.and_time(chrono::NaiveTime::MIN)))
}

/// Policy for handling DST edge cases when converting local naive timestamps to UTC.
#[derive(Debug, Clone, Copy)]
pub enum DstPolicy {
    /// Strict behavior: error on ambiguous (fall-back) or nonexistent (spring-forward) local times.
    Strict,
    /// For nonexistent local times, shift forward in one-minute increments until the
    /// first valid instant is found (capped at 2 hours). Ambiguous times take the earliest.
    ShiftForward,
}

/// Convert a naive local timestamp to UTC using a specific IANA time zone and DST policy.
///
/// Errors:
/// - Returns an error if the time is ambiguous or nonexistent and the chosen policy does not resolve it.
pub fn from_local_naive_with_policy(
    naive: NaiveDateTime,
    tz: Tz,
    policy: DstPolicy,
) -> anyhow::Result<DateTime<Utc>> {
    use chrono::offset::LocalResult::*;
    match tz.from_local_datetime(&naive) {
        Single(dt) => Ok(dt.with_timezone(&Utc)),
        Ambiguous(a, _) => match policy {
            DstPolicy::ShiftForward => Ok(a.with_timezone(&Utc)),
            DstPolicy::Strict => Err(anyhow::anyhow!("ambiguous local time {naive} in {tz}")),
        },
        None => match policy {
            DstPolicy::ShiftForward => {
                let mut t = naive;
                for _ in 0..120 {
                    t += chrono::Duration::minutes(1);
                    if let Single(dt) = tz.from_local_datetime(&t) {
                        return Ok(dt.with_timezone(&Utc));
                    }
                }
                Err(anyhow::anyhow!("nonexistent local time {naive} in {tz}"))
            }
            DstPolicy::Strict => Err(anyhow::anyhow!("nonexistent local time {naive} in {tz}")),
        },
    }
}

/// The UTC instant a dump period starts: local midnight of `date` in `tz`.
pub fn period_start_utc(date: NaiveDate, tz: Tz) -> anyhow::Result<DateTime<Utc>> {
    from_local_naive_with_policy(date.and_time(chrono::NaiveTime::MIN), tz, DstPolicy::ShiftForward)
}

/// Format a UTC datetime as RFC-3339 with `Z`, keeping sub-second digits only when present.
pub fn to_rfc3339(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}
