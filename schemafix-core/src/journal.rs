use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum JournalError {
    #[error("failed to open journal '{path}': {source}")]
    Open {
        path: String,
        #[source]
        source: rusqlite::Error,
    },
    #[error("journal database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("journal entry {id} is unreadable: {detail}")]
    Corrupt { id: i64, detail: String },
    #[error("journal lock poisoned")]
    Poisoned,
}

/// Lifecycle of one live migration attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryState {
    /// Written before the delete is issued. Left in this state if the
    /// process dies or loses the store between delete and recreate.
    Deleting,
    Recreated,
    /// The store refused the delete; the legacy collection is still there.
    DeleteRejected,
    RecreationFailed,
    /// Marked by the operator after manual recovery.
    Resolved,
}

impl EntryState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deleting => "deleting",
            Self::Recreated => "recreated",
            Self::DeleteRejected => "delete_rejected",
            Self::RecreationFailed => "recreation_failed",
            Self::Resolved => "resolved",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "deleting" => Self::Deleting,
            "recreated" => Self::Recreated,
            "delete_rejected" => Self::DeleteRejected,
            "recreation_failed" => Self::RecreationFailed,
            "resolved" => Self::Resolved,
            _ => return None,
        })
    }

    /// States in which the collection may be missing from the store.
    pub fn needs_attention(&self) -> bool {
        matches!(self, Self::Deleting | Self::RecreationFailed)
    }
}

impl std::fmt::Display for EntryState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub id: i64,
    pub run_id: String,
    pub collection: String,
    pub legacy_definition: Value,
    pub state: EntryState,
    pub detail: Option<String>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// SQLite-backed record of live migration attempts.
///
/// Wraps a `Connection` in a `Mutex` so it is `Send + Sync`.
pub struct Journal {
    conn: Mutex<Connection>,
}

impl Journal {
    /// Open (or create) the journal at `path` and run migrations.
    pub fn open(path: &Path) -> Result<Self, JournalError> {
        let conn = Connection::open(path).map_err(|source| JournalError::Open {
            path: path.display().to_string(),
            source,
        })?;
        let journal = Self {
            conn: Mutex::new(conn),
        };
        journal.migrate()?;
        Ok(journal)
    }

    /// Open an in-memory journal. Nothing survives the process.
    pub fn open_in_memory() -> Result<Self, JournalError> {
        let conn = Connection::open_in_memory().map_err(|source| JournalError::Open {
            path: ":memory:".into(),
            source,
        })?;
        let journal = Self {
            conn: Mutex::new(conn),
        };
        journal.migrate()?;
        Ok(journal)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, JournalError> {
        self.conn.lock().map_err(|_| JournalError::Poisoned)
    }

    fn migrate(&self) -> Result<(), JournalError> {
        let conn = self.lock()?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;

            CREATE TABLE IF NOT EXISTS migration_attempts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                run_id TEXT NOT NULL,
                collection TEXT NOT NULL,
                legacy_definition TEXT NOT NULL,
                state TEXT NOT NULL,
                detail TEXT,
                started_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_attempts_state
                ON migration_attempts(state);
            ",
        )?;
        Ok(())
    }

    /// Record an attempt in state `deleting` and return its id. Must succeed
    /// before the delete is issued.
    pub fn begin(
        &self,
        run_id: &str,
        collection: &str,
        legacy_definition: &Value,
    ) -> Result<i64, JournalError> {
        let now = Utc::now().to_rfc3339();
        let definition = serde_json::to_string(legacy_definition).map_err(|e| {
            JournalError::Corrupt {
                id: 0,
                detail: format!("definition of '{collection}' does not serialize: {e}"),
            }
        })?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO migration_attempts
                (run_id, collection, legacy_definition, state, detail, started_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, NULL, ?5, ?5)",
            params![
                run_id,
                collection,
                definition,
                EntryState::Deleting.as_str(),
                now
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Move an attempt to a new state.
    pub fn finish(
        &self,
        id: i64,
        state: EntryState,
        detail: Option<&str>,
    ) -> Result<(), JournalError> {
        let conn = self.lock()?;
        let rows = conn.execute(
            "UPDATE migration_attempts SET state = ?1, detail = ?2, updated_at = ?3 WHERE id = ?4",
            params![state.as_str(), detail, Utc::now().to_rfc3339(), id],
        )?;
        if rows == 0 {
            return Err(JournalError::Corrupt {
                id,
                detail: "no such entry".into(),
            });
        }
        Ok(())
    }

    /// Attempts whose collection may be missing from the store, oldest first.
    pub fn needs_attention(&self) -> Result<Vec<JournalEntry>, JournalError> {
        self.query(
            "SELECT id, run_id, collection, legacy_definition, state, detail, started_at, updated_at
             FROM migration_attempts
             WHERE state IN ('deleting', 'recreation_failed')
             ORDER BY id ASC",
        )
    }

    /// Every recorded attempt, oldest first.
    pub fn entries(&self) -> Result<Vec<JournalEntry>, JournalError> {
        self.query(
            "SELECT id, run_id, collection, legacy_definition, state, detail, started_at, updated_at
             FROM migration_attempts
             ORDER BY id ASC",
        )
    }

    /// Mark an attempt as handled by the operator. Returns `false` if there
    /// is no such entry.
    pub fn resolve(&self, id: i64) -> Result<bool, JournalError> {
        let conn = self.lock()?;
        let rows = conn.execute(
            "UPDATE migration_attempts SET state = ?1, updated_at = ?2 WHERE id = ?3",
            params![EntryState::Resolved.as_str(), Utc::now().to_rfc3339(), id],
        )?;
        Ok(rows > 0)
    }

    fn query(&self, sql: &str) -> Result<Vec<JournalEntry>, JournalError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map([], |row| {
            Ok(RawEntry {
                id: row.get(0)?,
                run_id: row.get(1)?,
                collection: row.get(2)?,
                legacy_definition: row.get(3)?,
                state: row.get(4)?,
                detail: row.get(5)?,
                started_at: row.get(6)?,
                updated_at: row.get(7)?,
            })
        })?;

        let mut result = Vec::new();
        for row in rows {
            result.push(row?.into_entry()?);
        }
        Ok(result)
    }
}

struct RawEntry {
    id: i64,
    run_id: String,
    collection: String,
    legacy_definition: String,
    state: String,
    detail: Option<String>,
    started_at: String,
    updated_at: String,
}

impl RawEntry {
    fn into_entry(self) -> Result<JournalEntry, JournalError> {
        let id = self.id;
        let state = EntryState::parse(&self.state).ok_or_else(|| JournalError::Corrupt {
            id,
            detail: format!("unknown state '{}'", self.state),
        })?;
        let legacy_definition =
            serde_json::from_str(&self.legacy_definition).map_err(|e| JournalError::Corrupt {
                id,
                detail: format!("saved definition is not JSON: {e}"),
            })?;
        Ok(JournalEntry {
            id,
            run_id: self.run_id,
            collection: self.collection,
            legacy_definition,
            state,
            detail: self.detail,
            started_at: parse_datetime(&self.started_at),
            updated_at: parse_datetime(&self.updated_at),
        })
    }
}

/// Parse an RFC 3339 datetime string, falling back to epoch on failure.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_default()
}
