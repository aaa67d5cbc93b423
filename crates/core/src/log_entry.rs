//! LogEntry: a single classified line of child stderr (or malformed stdout).

use crate::ids::WorkerId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Classify a stderr line by case-insensitive keyword: "error"/"fatal"
    /// -> error, "warn" -> warn, "debug" -> debug, else info.
    pub fn classify(line: &str) -> Self {
        let lower = line.to_ascii_lowercase();
        if lower.contains("error") || lower.contains("fatal") {
            LogLevel::Error
        } else if lower.contains("warn") {
            LogLevel::Warn
        } else if lower.contains("debug") {
            LogLevel::Debug
        } else {
            LogLevel::Info
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub id: u64,
    pub worker_id: WorkerId,
    #[serde(rename = "timestamp")]
    pub timestamp_ms: u64,
    pub level: LogLevel,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}
