use chrono::{DateTime, FixedOffset, NaiveDate, Offset, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};

lazy_static! {
    static ref NUMBER_PREFIX_REGEX: Regex =
        Regex::new(r"^[+-]?(?:[0-9]+\.?[0-9]*|\.[0-9]+)(?:[eE][+-]?[0-9]+)?").expect("Invalid regex pattern");
    static ref STOCK_CODE_REGEX: Regex = Regex::new(r"^[0-9]{6}$").expect("Invalid regex pattern");
}

static CALLBACK_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// China Standard Time, the timezone every remote timestamp is expressed in.
pub fn china_offset() -> FixedOffset {
    FixedOffset::east_opt(8 * 3600).unwrap_or_else(|| Utc.fix())
}

/// Parses the longest numeric prefix of `value`, so `"+0.05%"` becomes `0.05`.
///
/// Returns `None` when no number can be read or the result is not finite.
pub fn to_number_or_null(value: &str) -> Option<f64> {
    let trimmed = value.trim_start();
    let matched = NUMBER_PREFIX_REGEX.find(trimmed)?;
    matched
        .as_str()
        .parse::<f64>()
        .ok()
        .filter(|n| n.is_finite())
}

/// Reads a number out of a JSON value that may hold either a number or a
/// numeric string.
pub fn json_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|n| n.is_finite()),
        Value::String(s) => to_number_or_null(s),
        _ => None,
    }
}

/// Reads a non-empty string (or a number rendered as a string) out of a JSON value.
pub fn json_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Reads an integer timestamp, truncating fractional parts like `parseInt`.
pub fn json_timestamp(value: &Value) -> Option<i64> {
    json_number(value).map(|n| n.trunc() as i64)
}

/// Calendar date in China Standard Time of a millisecond Unix timestamp.
pub fn china_date_from_millis(millis: i64) -> Option<NaiveDate> {
    DateTime::from_timestamp_millis(millis).map(|dt| dt.with_timezone(&china_offset()).date_naive())
}

/// Parses `2024-01-05` as well as the compact `20240105` form.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(value, "%Y%m%d"))
        .ok()
}

pub fn is_stock_code(code: &str) -> bool {
    STOCK_CODE_REGEX.is_match(code)
}

/// Market prefix used by the quote endpoint: Shanghai for codes starting with
/// 6 or 9, Beijing for 4 or 8, Shenzhen otherwise.
pub fn tencent_market_prefix(code: &str) -> Option<&'static str> {
    if !is_stock_code(code) {
        return None;
    }
    match code.as_bytes()[0] {
        b'6' | b'9' => Some("sh"),
        b'4' | b'8' => Some("bj"),
        _ => Some("sz"),
    }
}

/// Millisecond timestamp appended to URLs so intermediaries never serve a
/// cached script.
pub fn cache_buster() -> i64 {
    Utc::now().timestamp_millis()
}

/// A callback name unique within the process, e.g. `FundSuggest_1704445200000_3`.
pub fn unique_callback_name(prefix: &str) -> String {
    let sequence = CALLBACK_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}_{}_{sequence}", cache_buster())
}
