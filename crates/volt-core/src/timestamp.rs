use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::Value;

/// Numbers above this are already epoch milliseconds.
const MILLIS_FLOOR: f64 = 2e12;
/// Numbers below this are epoch seconds.
const SECONDS_CEILING: f64 = 1e12;

const NAIVE_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S%.f"];

/// Coerce a loosely-typed timestamp to epoch milliseconds.
///
/// Numbers between 10^12 and 2*10^12 pass through unchanged. Strings are read
/// as calendar dates in UTC; anything else is absent.
pub fn to_epoch(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => {
            let raw = n.as_f64()?;
            if !raw.is_finite() {
                return None;
            }
            if raw > MILLIS_FLOOR {
                Some(raw as i64)
            } else if raw < SECONDS_CEILING {
                Some((raw * 1000.0).round() as i64)
            } else {
                Some(raw as i64)
            }
        }
        Value::String(s) => parse_date(s.trim()),
        _ => None,
    }
}

fn parse_date(raw: &str) -> Option<i64> {
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.timestamp_millis());
    }
    for format in NAIVE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(dt.and_utc().timestamp_millis());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc().timestamp_millis())
}
