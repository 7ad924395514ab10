// crates/autoschema-core/src/log.rs
// ============================================================================
// Module: Store Logging
// Description: Structured diagnostic events and sinks for the schema manager.
// Purpose: Emit leveled JSON-line logs without a hard logging-framework dependency.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! The store reports every recoverable failure, every schema migration, and
//! every fatal error before it propagates. Events are plain serializable
//! structs handed to a [`StoreLogSink`], so deployments can route them into
//! whatever pipeline they already run.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Severity of a store log event.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum StoreLogLevel {
    /// Verbose diagnostics.
    Debug,
    /// Normal lifecycle events.
    #[default]
    Info,
    /// Recoverable failures.
    Warning,
    /// Failures surfaced to the caller.
    Error,
}

/// Structured store log event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreLogEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// Event severity.
    pub level: StoreLogLevel,
    /// Human-readable summary.
    pub message: String,
    /// Table the event concerns, when any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    /// Extra diagnostic context (statements, values, driver messages).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl StoreLogEvent {
    /// Creates a new event with a consistent timestamp.
    #[must_use]
    pub fn new(level: StoreLogLevel, event: &'static str, message: impl Into<String>) -> Self {
        let timestamp_ms =
            SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis();
        Self {
            event,
            timestamp_ms,
            level,
            message: message.into(),
            table: None,
            detail: None,
        }
    }

    /// Attaches the table name.
    #[must_use]
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    /// Attaches diagnostic detail.
    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Destination for store log events.
pub trait StoreLogSink: Send + Sync {
    /// Record a log event.
    fn record(&self, event: &StoreLogEvent);
}

/// Sink that drops every event.
pub struct NoopLogSink;

impl StoreLogSink for NoopLogSink {
    fn record(&self, _event: &StoreLogEvent) {}
}

/// Sink that logs JSON lines to stderr.
pub struct StderrLogSink {
    /// Events below this level are dropped.
    min_level: StoreLogLevel,
}

impl StderrLogSink {
    /// Creates a stderr sink with a minimum level.
    #[must_use]
    pub const fn new(min_level: StoreLogLevel) -> Self {
        Self {
            min_level,
        }
    }
}

impl StoreLogSink for StderrLogSink {
    fn record(&self, event: &StoreLogEvent) {
        if event.level < self.min_level {
            return;
        }
        if let Ok(payload) = serde_json::to_string(event) {
            let _ = writeln!(std::io::stderr(), "{payload}");
        }
    }
}

/// Sink that logs JSON lines to a file.
pub struct FileLogSink {
    /// File handle used for append-only logging.
    file: Mutex<std::fs::File>,
    /// Events below this level are dropped.
    min_level: StoreLogLevel,
}

impl FileLogSink {
    /// Opens the log file in append mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn new(path: &Path, min_level: StoreLogLevel) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
            min_level,
        })
    }
}

impl StoreLogSink for FileLogSink {
    fn record(&self, event: &StoreLogEvent) {
        if event.level < self.min_level {
            return;
        }
        if let Ok(payload) = serde_json::to_string(event)
            && let Ok(mut file) = self.file.lock()
        {
            let _ = writeln!(file, "{payload}");
            let _ = file.flush();
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        reason = "Test fixtures use explicit asserts and unwraps for clarity."
    )]

    use tempfile::TempDir;

    use super::FileLogSink;
    use super::StoreLogEvent;
    use super::StoreLogLevel;
    use super::StoreLogSink;

    #[test]
    fn file_sink_writes_json_lines_above_min_level() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("store.log");
        let sink = FileLogSink::new(&path, StoreLogLevel::Info).unwrap();
        sink.record(&StoreLogEvent::new(StoreLogLevel::Debug, "noise", "dropped"));
        sink.record(
            &StoreLogEvent::new(StoreLogLevel::Warning, "table_out_of_sync", "stale")
                .with_table("Type1")
                .with_detail("duplicate column"),
        );
        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 1);
        let parsed: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed["event"], "table_out_of_sync");
        assert_eq!(parsed["level"], "warning");
        assert_eq!(parsed["table"], "Type1");
    }

    #[test]
    fn optional_fields_are_omitted_when_absent() {
        let event = StoreLogEvent::new(StoreLogLevel::Info, "commit", "committed");
        let payload = serde_json::to_value(&event).unwrap();
        assert!(payload.get("table").is_none());
        assert!(payload.get("detail").is_none());
    }
}
