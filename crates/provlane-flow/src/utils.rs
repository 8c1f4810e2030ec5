//! Helpers for timestamps and display text shared by the derived views

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use std::borrow::Cow;

/// Convert Unix seconds (fractional) to a UTC timestamp
pub fn timestamp_from_secs(secs: f64) -> Option<DateTime<Utc>> {
    if !secs.is_finite() || secs < 0.0 {
        return None;
    }
    let whole = secs.trunc();
    let nanos = ((secs - whole) * 1_000_000_000.0).round() as u32;
    DateTime::from_timestamp(whole as i64, nanos.min(999_999_999))
}

/// Current time as fractional Unix seconds
pub fn now_secs() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

/// ISO-8601 rendering of Unix seconds with millisecond precision
pub fn format_timestamp(secs: f64) -> Option<String> {
    timestamp_from_secs(secs).map(|ts| ts.to_rfc3339_opts(SecondsFormat::Millis, true))
}

/// Strings render as-is; anything else as compact JSON
pub fn display_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Percent-encode `%` and `:` so a name embeds unambiguously in an id
pub fn escape_id_segment(text: &str) -> Cow<'_, str> {
    if !text.contains(['%', ':']) {
        return Cow::Borrowed(text);
    }
    let mut escaped = String::with_capacity(text.len() + 4);
    for ch in text.chars() {
        match ch {
            '%' => escaped.push_str("%25"),
            ':' => escaped.push_str("%3A"),
            other => escaped.push(other),
        }
    }
    Cow::Owned(escaped)
}

/// Cut `text` to at most `cap` characters; returns whether anything was cut
pub fn truncate_chars(text: &str, cap: usize) -> (String, bool) {
    match text.char_indices().nth(cap) {
        Some((byte_index, _)) => (text[..byte_index].to_string(), true),
        None => (text.to_string(), false),
    }
}

/// One-line preview used by the text renderer
pub fn preview(text: &str, cap: usize) -> String {
    let single_line = text.split_whitespace().collect::<Vec<_>>().join(" ");
    match truncate_chars(&single_line, cap) {
        (cut, true) => format!("{cut}..."),
        (whole, false) => whole,
    }
}

/// Human-readable duration, `850ms` or `1.25s`
pub fn format_duration_secs(secs: f64) -> String {
    let total_ms = (secs * 1000.0).round().max(0.0) as u64;
    if total_ms >= 1000 {
        format!("{:.2}s", total_ms as f64 / 1000.0)
    } else {
        format!("{total_ms}ms")
    }
}
