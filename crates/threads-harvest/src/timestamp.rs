//! Timestamp normalization into canonical ISO-8601 UTC strings.

use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde_json::Value;

/// Marker used when no usable timestamp was found.
pub const UNKNOWN_TIMESTAMP: &str = "unknown";

const ISO_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Format epoch seconds as `YYYY-MM-DDTHH:MM:SSZ`.
///
/// Out-of-range values yield [`UNKNOWN_TIMESTAMP`].
pub fn normalize_epoch(secs: i64) -> String {
    match DateTime::from_timestamp(secs, 0) {
        Some(dt) => dt.format(ISO_FORMAT).to_string(),
        None => UNKNOWN_TIMESTAMP.to_string(),
    }
}

/// Normalize a site-provided timestamp string.
///
/// All-digit strings are treated as epoch seconds and RFC 3339 strings are
/// reformatted in UTC at second precision, so both compare correctly with
/// epoch-derived values. Anything else (a relative label such as `3h`, a
/// zoneless date) is passed through trimmed.
pub fn normalize_text(raw: &str) -> String {
    let raw = raw.trim();
    if raw.is_empty() {
        return UNKNOWN_TIMESTAMP.to_string();
    }
    if raw.bytes().all(|b| b.is_ascii_digit()) {
        if let Ok(secs) = raw.parse::<i64>() {
            return normalize_epoch(secs);
        }
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return dt.with_timezone(&Utc).format(ISO_FORMAT).to_string();
    }
    raw.to_string()
}

/// Normalize a JSON timestamp field, which may be absent.
pub fn normalize_value(value: Option<&Value>) -> String {
    match value {
        Some(Value::Number(n)) => {
            let secs = n
                .as_i64()
                .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64));
            match secs {
                Some(secs) => normalize_epoch(secs),
                None => UNKNOWN_TIMESTAMP.to_string(),
            }
        }
        Some(Value::String(s)) => normalize_text(s),
        _ => UNKNOWN_TIMESTAMP.to_string(),
    }
}

/// Whether `text` is a bare `DD/MM/YY` date badge.
pub fn is_short_date(text: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{2}/\d{2}/\d{2}$").expect("short date regex is valid"))
        .is_match(text.trim())
}

/// Sort key for newest-first ordering: `None` for unknown timestamps so
/// they order as the oldest.
pub fn sort_key(timestamp: &str) -> Option<&str> {
    let ts = timestamp.trim();
    if ts.is_empty() || ts == UNKNOWN_TIMESTAMP {
        None
    } else {
        Some(ts)
    }
}
