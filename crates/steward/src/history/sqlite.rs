//! SQLite-backed history store.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use rusqlite::{Connection, Row, params};

use super::{HistoryError, HistoryRecord, HistoryStore, now_timestamp};

const HISTORY_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS history (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        agent_type TEXT NOT NULL,
        input_text TEXT NOT NULL,
        output_text TEXT NOT NULL,
        timestamp TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
    )
";

/// History persisted to a SQLite database file.
#[derive(Debug)]
pub struct SqliteHistoryStore {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl SqliteHistoryStore {
    /// Open (creating if needed) the database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, HistoryError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.query_row("PRAGMA journal_mode=WAL;", [], |_| Ok(()))?;
        Self::init(conn, Some(path.to_path_buf()))
    }

    /// Open a private in-memory database.
    pub fn in_memory() -> Result<Self, HistoryError> {
        Self::init(Connection::open_in_memory()?, None)
    }

    fn init(conn: Connection, path: Option<PathBuf>) -> Result<Self, HistoryError> {
        conn.execute(HISTORY_SCHEMA, [])?;
        tracing::info!(path = ?path, "history database initialized");
        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    /// The database file, if not in-memory.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<HistoryRecord> {
    Ok(HistoryRecord {
        handler: row.get(0)?,
        input_text: row.get(1)?,
        output_text: row.get(2)?,
        timestamp: row.get(3)?,
    })
}

impl HistoryStore for SqliteHistoryStore {
    fn record(&self, handler: &str, input: &str, output: &str) -> Result<(), HistoryError> {
        let conn = self.conn.lock().map_err(|_| HistoryError::Lock)?;
        conn.execute(
            "INSERT INTO history (agent_type, input_text, output_text, timestamp)
             VALUES (?1, ?2, ?3, ?4)",
            params![handler, input, output, now_timestamp()],
        )?;
        Ok(())
    }

    fn fetch(
        &self,
        handler: Option<&str>,
        limit: usize,
    ) -> Result<Vec<HistoryRecord>, HistoryError> {
        let conn = self.conn.lock().map_err(|_| HistoryError::Lock)?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let records = match handler {
            Some(handler) => {
                let mut stmt = conn.prepare(
                    "SELECT agent_type, input_text, output_text, timestamp FROM history
                     WHERE agent_type = ?1
                     ORDER BY timestamp DESC, id DESC
                     LIMIT ?2",
                )?;
                let rows = stmt
                    .query_map(params![handler, limit], row_to_record)?
                    .collect::<Result<Vec<_>, _>>()?;
                rows
            }
            None => {
                let mut stmt = conn.prepare(
                    "SELECT agent_type, input_text, output_text, timestamp FROM history
                     ORDER BY timestamp DESC, id DESC
                     LIMIT ?1",
                )?;
                let rows = stmt
                    .query_map(params![limit], row_to_record)?
                    .collect::<Result<Vec<_>, _>>()?;
                rows
            }
        };
        Ok(records)
    }
}
