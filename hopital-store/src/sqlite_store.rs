//! SQLite-backed application store
//!
//! Schema:
//!   - credentials: sign-in identity (email, argon2 hash)
//!   - profiles: application user records
//!   - departments / department_assignments: many-to-many membership
//!   - sessions: issued session tokens, revocable
//!   - password_resets: one-time reset tokens
//!   - records: medical and financial rows, JSON body keyed by (kind, id)

use crate::error::{Result, StoreError};
use rusqlite::{Connection, Transaction};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS credentials (
    user_id TEXT PRIMARY KEY,
    email TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS profiles (
    user_id TEXT PRIMARY KEY REFERENCES credentials(user_id),
    full_name TEXT NOT NULL,
    email TEXT NOT NULL UNIQUE,
    phone_number TEXT,
    role TEXT NOT NULL,
    branch TEXT,
    is_active INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS departments (
    department_id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS department_assignments (
    assignment_id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL REFERENCES profiles(user_id),
    department_id INTEGER NOT NULL REFERENCES departments(department_id),
    created_at TEXT NOT NULL,
    created_by TEXT,
    UNIQUE (user_id, department_id)
);

CREATE TABLE IF NOT EXISTS sessions (
    session_id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    expires_at INTEGER NOT NULL,
    revoked INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS password_resets (
    token_id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    secret_hash TEXT NOT NULL,
    expires_at INTEGER NOT NULL,
    used INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS records (
    kind TEXT NOT NULL,
    id TEXT NOT NULL,
    created_by TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    record_date TEXT NOT NULL,
    value TEXT NOT NULL,
    PRIMARY KEY (kind, id)
);

CREATE INDEX IF NOT EXISTS idx_assignments_user ON department_assignments(user_id);
CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id);
CREATE INDEX IF NOT EXISTS idx_records_owner ON records(kind, created_by);
CREATE INDEX IF NOT EXISTS idx_records_date ON records(kind, record_date);
"#;

/// SQLite-based application store
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

#[allow(clippy::result_large_err)]
impl SqliteStore {
    /// Open the store (create if not exists)
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;

        // Enable WAL mode for read-write concurrency
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        conn.execute_batch(SCHEMA)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub(crate) fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Other("Connexion à la base indisponible".to_string()))
    }

    /// Execute multiple operations atomically within an SQLite transaction.
    ///
    /// The transaction rolls back when `f` returns an error.
    pub fn in_transaction<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T>,
    {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let result = f(&tx)?;
        tx.commit()?;
        Ok(result)
    }
}

pub(crate) fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Map a UNIQUE constraint failure to a conflict with a readable message
pub(crate) fn conflict_on_unique(err: rusqlite::Error, message: &str) -> StoreError {
    match err {
        rusqlite::Error::SqliteFailure(ref e, _)
            if e.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            StoreError::Conflict(message.to_string())
        }
        other => StoreError::Sqlite(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::params;

    #[test]
    fn test_open_creates_schema() {
        let store = SqliteStore::open(":memory:").unwrap();
        let conn = store.conn().unwrap();
        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN
                 ('credentials', 'profiles', 'departments', 'department_assignments',
                  'sessions', 'password_resets', 'records')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 7);
    }

    #[test]
    fn test_in_transaction_rollback() {
        let store = SqliteStore::open(":memory:").unwrap();

        let result: Result<()> = store.in_transaction(|tx| {
            tx.execute("INSERT INTO departments (name) VALUES (?1)", params!["Urgences"])?;
            Err(StoreError::Other("forced error".into()))
        });
        assert!(result.is_err());

        let conn = store.conn().unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM departments", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_conflict_on_unique() {
        let store = SqliteStore::open(":memory:").unwrap();
        let conn = store.conn().unwrap();
        conn.execute("INSERT INTO departments (name) VALUES ('Caisse')", [])
            .unwrap();
        let err = conn
            .execute("INSERT INTO departments (name) VALUES ('Caisse')", [])
            .unwrap_err();
        assert!(matches!(
            conflict_on_unique(err, "doublon"),
            StoreError::Conflict(ref m) if m == "doublon"
        ));
    }
}
