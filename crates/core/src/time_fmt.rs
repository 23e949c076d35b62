// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! UTC timestamp helpers for artifacts and logs.

use chrono::{DateTime, SecondsFormat, Utc};

/// Current time as UTC ISO-8601 with millisecond precision.
pub fn utc_now_iso() -> String {
    iso8601(Utc::now())
}

/// Format a timestamp as UTC ISO-8601 with millisecond precision.
pub fn iso8601(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Compact UTC stamp used in scheduler-synthesized job ids
/// (`YYYYMMDDThhmmssZ`).
pub fn compact_stamp(ts: DateTime<Utc>) -> String {
    ts.format("%Y%m%dT%H%M%SZ").to_string()
}

#[cfg(test)]
#[path = "time_fmt_tests.rs"]
mod tests;
