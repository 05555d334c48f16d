use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
            LogLevel::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownLevel(pub String);

impl fmt::Display for UnknownLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown log level '{}'", self.0)
    }
}

impl std::error::Error for UnknownLevel {}

impl FromStr for LogLevel {
    type Err = UnknownLevel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DEBUG" | "TRACE" => Ok(LogLevel::Debug),
            "INFO" => Ok(LogLevel::Info),
            "WARN" | "WARNING" => Ok(LogLevel::Warning),
            "ERROR" => Ok(LogLevel::Error),
            "CRITICAL" | "FATAL" => Ok(LogLevel::Critical),
            _ => Err(UnknownLevel(s.to_string())),
        }
    }
}

/// One classified line. Serialises as a single flat JSON object: the
/// producer's fields plus `source_file`, `collected_at` and `log_level`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    #[serde(flatten)]
    pub fields: Map<String, Value>,
    pub source_file: String,
    pub collected_at: DateTime<Utc>,
    pub log_level: LogLevel,
}

impl LogEntry {
    pub fn message(&self) -> Option<&str> {
        self.fields.get("message").and_then(Value::as_str)
    }

    /// Render as one line of JSON without the trailing newline
    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_parsing_is_lenient() {
        assert_eq!("warn".parse::<LogLevel>(), Ok(LogLevel::Warning));
        assert_eq!(" Error ".parse::<LogLevel>(), Ok(LogLevel::Error));
        assert_eq!("fatal".parse::<LogLevel>(), Ok(LogLevel::Critical));
        assert!("loud".parse::<LogLevel>().is_err());
    }

    #[test]
    fn test_levels_are_ordered_by_severity() {
        assert!(LogLevel::Debug < LogLevel::Info);
        assert!(LogLevel::Warning < LogLevel::Error);
        assert!(LogLevel::Error < LogLevel::Critical);
    }

    #[test]
    fn test_entry_serialises_flat() {
        let mut fields = Map::new();
        fields.insert("message".to_string(), Value::from("hello"));
        let entry = LogEntry {
            fields,
            source_file: "app.log".to_string(),
            collected_at: "2025-01-02T03:04:05Z".parse().unwrap(),
            log_level: LogLevel::Warning,
        };

        let value: Value = serde_json::from_str(&entry.to_json_line().unwrap()).unwrap();
        assert_eq!(value["message"], "hello");
        assert_eq!(value["source_file"], "app.log");
        assert_eq!(value["log_level"], "WARNING");
        assert_eq!(value["collected_at"], "2025-01-02T03:04:05Z");

        let back: LogEntry = serde_json::from_value(value).unwrap();
        assert_eq!(back, entry);
    }
}
