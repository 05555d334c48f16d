use crate::collector::entry::{LogEntry, LogLevel};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tracing::trace;

/// Keys the collector owns; producer values under these names are replaced.
const INJECTED_KEYS: [&str; 2] = ["source_file", "collected_at"];

/// Turn one raw line into a [`LogEntry`], stamping it with the current time.
///
/// Blank lines yield `None`. Everything else yields an entry: JSON objects
/// keep their fields, anything else is wrapped as a plain `message`.
pub fn classify(raw_line: &str, source_file: &str) -> Option<LogEntry> {
    classify_at(raw_line, source_file, Utc::now())
}

pub fn classify_at(
    raw_line: &str,
    source_file: &str,
    collected_at: DateTime<Utc>,
) -> Option<LogEntry> {
    let trimmed = raw_line.trim();
    if trimmed.is_empty() {
        return None;
    }

    if trimmed.starts_with('{') {
        match serde_json::from_str::<Value>(trimmed) {
            Ok(Value::Object(fields)) => {
                return Some(from_object(fields, source_file, collected_at));
            }
            Ok(_) => trace!(source_file, "Line is JSON but not an object"),
            Err(e) => trace!(source_file, error = %e, "Line looked like JSON but did not parse"),
        }
    }

    let mut fields = Map::new();
    fields.insert("message".to_string(), Value::String(trimmed.to_string()));
    Some(LogEntry {
        fields,
        source_file: source_file.to_string(),
        collected_at,
        log_level: LogLevel::Info,
    })
}

fn from_object(
    mut fields: Map<String, Value>,
    source_file: &str,
    collected_at: DateTime<Utc>,
) -> LogEntry {
    for key in INJECTED_KEYS {
        fields.remove(key);
    }

    let log_level = match fields.remove("log_level") {
        Some(raw) => match raw.as_str().and_then(|s| s.parse().ok()) {
            Some(level) => level,
            None => {
                fields.insert("original_log_level".to_string(), raw);
                LogLevel::Info
            }
        },
        None => fields
            .get("level")
            .and_then(Value::as_str)
            .and_then(|s| s.parse().ok())
            .unwrap_or(LogLevel::Info),
    };

    LogEntry {
        fields,
        source_file: source_file.to_string(),
        collected_at,
        log_level,
    }
}
