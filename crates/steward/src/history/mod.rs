//! Interaction history.
//!
//! Every routed task is recorded by the transport as an append-only
//! `(handler, input, output, timestamp)` row. The built-in `history` command
//! reads the most recent rows back.
//!
//! Recording is best effort: callers log a failed write and carry on.

mod sqlite;

use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use sqlite::SqliteHistoryStore;

/// Format used for record timestamps.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Errors from a history store.
#[derive(Debug, Error)]
pub enum HistoryError {
    /// SQLite failure.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// I/O failure while preparing the store.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The store's lock was poisoned by a panicking writer.
    #[error("history store lock poisoned")]
    Lock,
}

/// One recorded interaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    /// Name of the handler that produced the output.
    pub handler: String,
    /// The input as received.
    pub input_text: String,
    /// The output as returned.
    pub output_text: String,
    /// When the interaction was recorded (UTC, `YYYY-MM-DD HH:MM:SS`).
    pub timestamp: String,
}

/// Append-only interaction log.
///
/// Implementations must be thread-safe; the server records from blocking
/// tasks while requests read concurrently.
pub trait HistoryStore: Send + Sync {
    /// Append a record stamped with the current time.
    fn record(&self, handler: &str, input: &str, output: &str) -> Result<(), HistoryError>;

    /// Fetch up to `limit` records, newest first, optionally for one handler.
    fn fetch(&self, handler: Option<&str>, limit: usize)
    -> Result<Vec<HistoryRecord>, HistoryError>;
}

/// Current UTC time in [`TIMESTAMP_FORMAT`].
pub fn now_timestamp() -> String {
    chrono::Utc::now().format(TIMESTAMP_FORMAT).to_string()
}

/// In-memory history store, for tests and one-shot CLI use.
#[derive(Debug, Default)]
pub struct MemoryHistoryStore {
    records: Mutex<Vec<HistoryRecord>>,
}

impl MemoryHistoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    /// Returns true if nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl HistoryStore for MemoryHistoryStore {
    fn record(&self, handler: &str, input: &str, output: &str) -> Result<(), HistoryError> {
        let mut records = self.records.lock().map_err(|_| HistoryError::Lock)?;
        records.push(HistoryRecord {
            handler: handler.to_string(),
            input_text: input.to_string(),
            output_text: output.to_string(),
            timestamp: now_timestamp(),
        });
        Ok(())
    }

    fn fetch(
        &self,
        handler: Option<&str>,
        limit: usize,
    ) -> Result<Vec<HistoryRecord>, HistoryError> {
        let records = self.records.lock().map_err(|_| HistoryError::Lock)?;
        Ok(records
            .iter()
            .rev()
            .filter(|r| handler.is_none_or(|h| r.handler == h))
            .take(limit)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_newest_first() {
        let store = MemoryHistoryStore::new();
        store.record("MainAgent", "first", "1").unwrap();
        store.record("MainAgent", "second", "2").unwrap();
        store.record("MainAgent", "third", "3").unwrap();

        let records = store.fetch(None, 10).unwrap();
        let inputs: Vec<_> = records.iter().map(|r| r.input_text.as_str()).collect();
        assert_eq!(inputs, vec!["third", "second", "first"]);
    }

    #[test]
    fn test_memory_store_filters_and_limits() {
        let store = MemoryHistoryStore::new();
        for i in 0..8 {
            store.record("MainAgent", &format!("cmd {i}"), "ok").unwrap();
        }
        store.record("GoogleExplainer", "text", "explained").unwrap();

        let main = store.fetch(Some("MainAgent"), 5).unwrap();
        assert_eq!(main.len(), 5);
        assert_eq!(main[0].input_text, "cmd 7");
        assert!(main.iter().all(|r| r.handler == "MainAgent"));

        let explainer = store.fetch(Some("GoogleExplainer"), 5).unwrap();
        assert_eq!(explainer.len(), 1);
        assert_eq!(store.len(), 9);
    }

    #[test]
    fn test_timestamp_format() {
        let ts = now_timestamp();
        assert!(chrono::NaiveDateTime::parse_from_str(&ts, TIMESTAMP_FORMAT).is_ok());
    }
}
