//! Per-category enrichment of collected entries.
//!
//! Enrichment never fails outward: a handler that hits bad input keeps what
//! it has done so far and records the problem under `processing_error`.

use crate::collector::entry::LogLevel;
use crate::processor::category::LogCategory;
use chrono::{DateTime, SecondsFormat, Utc};
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::LazyLock;
use thiserror::Error;
use tracing::warn;

/// A collected entry after enrichment, still a flat JSON object.
pub type ProcessedEntry = Map<String, Value>;

#[derive(Debug, Error)]
pub enum EnrichError {
    #[error("embedded message is not valid JSON: {0}")]
    EmbeddedMessage(#[source] serde_json::Error),

    #[error("embedded message is not a JSON object")]
    EmbeddedNotObject,

    #[error("field '{field}' should be {expected}, got {found}")]
    FieldType {
        field: &'static str,
        expected: &'static str,
        found: Value,
    },
}

static LEVEL_KEYWORDS: LazyLock<Vec<(LogLevel, Regex)>> = LazyLock::new(|| {
    [
        (LogLevel::Error, r"\b(error|exception|failed|failure)\b"),
        (LogLevel::Warning, r"\b(warn|warning|deprecated)\b"),
        (LogLevel::Debug, r"\b(debug|trace)\b"),
        (LogLevel::Info, r"\b(info|started|completed|success)\b"),
    ]
    .into_iter()
    .map(|(level, pattern)| (level, Regex::new(pattern).expect("level pattern is valid")))
    .collect()
});

pub fn enrich(category: LogCategory, entry: Map<String, Value>) -> ProcessedEntry {
    enrich_at(category, entry, Utc::now())
}

pub fn enrich_at(
    category: LogCategory,
    mut entry: Map<String, Value>,
    processed_at: DateTime<Utc>,
) -> ProcessedEntry {
    // Unrouted files pass through with their message untouched.
    let merged = if category == LogCategory::Unknown {
        Ok(())
    } else {
        merge_embedded_message(&mut entry)
    };

    entry.insert("log_category".to_string(), category.as_str().into());
    entry.insert(
        "processed_at".to_string(),
        processed_at
            .to_rfc3339_opts(SecondsFormat::Micros, true)
            .into(),
    );

    let result = merged.and_then(|()| match category {
        LogCategory::Access => enrich_access(&mut entry),
        LogCategory::Error => enrich_error(&mut entry),
        LogCategory::Application => enrich_application(&mut entry),
        LogCategory::Database => enrich_database(&mut entry),
        LogCategory::Job => enrich_job(&mut entry),
        LogCategory::Unknown => {
            set_level(&mut entry, LogLevel::Info);
            Ok(())
        }
    });

    if let Err(e) = result {
        warn!(category = %category, error = %e, "Failed to enrich entry");
        entry.insert("processing_error".to_string(), e.to_string().into());
    }
    entry
}

/// Producers that log a JSON document as their message get its fields
/// lifted onto the entry.
fn merge_embedded_message(entry: &mut Map<String, Value>) -> Result<(), EnrichError> {
    let Some(Value::String(message)) = entry.get("message") else {
        return Ok(());
    };
    if !message.starts_with('{') {
        return Ok(());
    }

    let parsed = serde_json::from_str::<Value>(message).map_err(EnrichError::EmbeddedMessage)?;
    let Value::Object(embedded) = parsed else {
        return Err(EnrichError::EmbeddedNotObject);
    };
    entry.remove("message");
    entry.extend(embedded);
    Ok(())
}

fn set_level(entry: &mut Map<String, Value>, level: LogLevel) {
    entry.insert("log_level".to_string(), level.as_str().into());
}

fn message(entry: &Map<String, Value>) -> &str {
    entry.get("message").and_then(Value::as_str).unwrap_or("")
}

fn enrich_access(entry: &mut Map<String, Value>) -> Result<(), EnrichError> {
    set_level(entry, LogLevel::Info);

    if let Some(path) = entry.get("path") {
        let path = path.as_str().ok_or_else(|| EnrichError::FieldType {
            field: "path",
            expected: "a string",
            found: path.clone(),
        })?;
        let endpoint = path.split('?').next().unwrap_or(path).to_string();
        entry.insert("endpoint".to_string(), endpoint.into());
    }

    if let Some(status) = entry.get("status_code") {
        let code = status.as_i64().ok_or_else(|| EnrichError::FieldType {
            field: "status_code",
            expected: "an integer",
            found: status.clone(),
        })?;
        let status_category = match code {
            200..=299 => "success",
            300..=399 => "redirect",
            400..=499 => "client_error",
            _ => "server_error",
        };
        entry.insert("status_category".to_string(), status_category.into());
    }
    Ok(())
}

fn enrich_error(entry: &mut Map<String, Value>) -> Result<(), EnrichError> {
    set_level(entry, LogLevel::Error);
    entry.insert("severity".to_string(), "high".into());

    let lower = message(entry).to_lowercase();
    let error_type = ["timeout", "connection", "validation"]
        .into_iter()
        .find(|kind| lower.contains(kind))
        .unwrap_or("unknown");
    entry.insert("error_type".to_string(), error_type.into());
    Ok(())
}

fn enrich_application(entry: &mut Map<String, Value>) -> Result<(), EnrichError> {
    let text = message(entry);
    let level = level_from_keywords(text);
    let component = if text.contains("web-api") {
        "web-api"
    } else if text.contains("background") {
        "background-task"
    } else {
        "unknown"
    };

    set_level(entry, level);
    entry.insert("component".to_string(), component.into());
    Ok(())
}

/// First keyword group found in the message, most severe group first.
pub fn level_from_keywords(message: &str) -> LogLevel {
    let lower = message.to_lowercase();
    LEVEL_KEYWORDS
        .iter()
        .find(|(_, pattern)| pattern.is_match(&lower))
        .map(|(level, _)| *level)
        .unwrap_or(LogLevel::Info)
}

fn enrich_database(entry: &mut Map<String, Value>) -> Result<(), EnrichError> {
    set_level(entry, LogLevel::Info);

    let Some(raw) = entry.get("execution_time_ms") else {
        return Ok(());
    };
    let millis = raw.as_f64().ok_or_else(|| EnrichError::FieldType {
        field: "execution_time_ms",
        expected: "a number",
        found: raw.clone(),
    })?;

    let performance = if millis > 5000.0 {
        set_level(entry, LogLevel::Warning);
        "very_slow"
    } else if millis > 1000.0 {
        "slow"
    } else if millis > 100.0 {
        "normal"
    } else {
        "fast"
    };
    entry.insert("performance_category".to_string(), performance.into());
    Ok(())
}

fn enrich_job(entry: &mut Map<String, Value>) -> Result<(), EnrichError> {
    let failed = matches!(
        entry.get("status").and_then(Value::as_str),
        Some("failed" | "error")
    );
    set_level(entry, if failed { LogLevel::Error } else { LogLevel::Info });
    Ok(())
}
