//! SQLite-based audit log
//!
//! Separate file for easy management and rotation.

use crate::error::Result;
use rusqlite::{params, Connection};
use serde::Serialize;
use std::path::Path;

/// Audited action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    SignIn,
    SignUp,
    SignOut,
    PasswordResetRequest,
    PasswordReset,
    PasswordChange,
    Create,
    Update,
    Delete,
    Export,
    Activate,
    Deactivate,
    Assign,
    Unassign,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::SignIn => "sign-in",
            Operation::SignUp => "sign-up",
            Operation::SignOut => "sign-out",
            Operation::PasswordResetRequest => "password-reset-request",
            Operation::PasswordReset => "password-reset",
            Operation::PasswordChange => "password-change",
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
            Operation::Export => "export",
            Operation::Activate => "activate",
            Operation::Deactivate => "deactivate",
            Operation::Assign => "assign",
            Operation::Unassign => "unassign",
        }
    }
}

/// One line of the audit log
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub operation: Operation,
    pub target_type: Option<String>,
    pub target_id: Option<String>,
    pub user_id: Option<String>,
    pub client_ip: Option<String>,
    pub success: bool,
    pub detail: Option<String>,
}

impl AuditEntry {
    pub fn success(operation: Operation) -> Self {
        Self {
            operation,
            target_type: None,
            target_id: None,
            user_id: None,
            client_ip: None,
            success: true,
            detail: None,
        }
    }

    pub fn failure(operation: Operation, detail: impl Into<String>) -> Self {
        Self {
            success: false,
            detail: Some(detail.into()),
            ..Self::success(operation)
        }
    }

    pub fn target(mut self, target_type: &str, target_id: impl Into<String>) -> Self {
        self.target_type = Some(target_type.to_string());
        self.target_id = Some(target_id.into());
        self
    }

    pub fn target_type(mut self, target_type: &str) -> Self {
        self.target_type = Some(target_type.to_string());
        self
    }

    pub fn user(mut self, user_id: Option<&str>) -> Self {
        self.user_id = user_id.map(str::to_string);
        self
    }

    pub fn client_ip(mut self, client_ip: Option<&str>) -> Self {
        self.client_ip = client_ip.map(str::to_string);
        self
    }

    pub fn detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Audit log row as shown on the admin dashboard
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    pub timestamp: String,
    pub operation: String,
    pub target_type: Option<String>,
    pub target_id: Option<String>,
    pub user_id: Option<String>,
    pub result: String,
}

/// Audit log
pub struct AuditLog {
    conn: Connection,
}

#[allow(clippy::result_large_err)]
impl AuditLog {
    /// Open the audit log (create if not exists)
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        let audit = Self { conn };
        audit.initialize()?;
        Ok(audit)
    }

    fn initialize(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS audit_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL DEFAULT (datetime('now')),
                operation TEXT NOT NULL,
                target_type TEXT,
                target_id TEXT,
                user_id TEXT,
                client_ip TEXT,
                result TEXT NOT NULL,
                detail TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_audit_timestamp ON audit_log(timestamp);
            CREATE INDEX IF NOT EXISTS idx_audit_target ON audit_log(target_type, target_id);
            CREATE INDEX IF NOT EXISTS idx_audit_user ON audit_log(user_id);
            "#,
        )?;
        Ok(())
    }

    pub fn log(&self, entry: &AuditEntry) -> Result<()> {
        let result = if entry.success { "success" } else { "error" };

        self.conn.execute(
            r#"
            INSERT INTO audit_log
            (operation, target_type, target_id, user_id, client_ip, result, detail)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                entry.operation.as_str(),
                entry.target_type,
                entry.target_id,
                entry.user_id,
                entry.client_ip,
                result,
                entry.detail,
            ],
        )?;

        Ok(())
    }

    /// Most recent entries first
    pub fn recent_entries(&self, limit: usize) -> Result<Vec<AuditRecord>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT timestamp, operation, target_type, target_id, user_id, result
            FROM audit_log
            ORDER BY id DESC
            LIMIT ?1
            "#,
        )?;

        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok(AuditRecord {
                timestamp: row.get(0)?,
                operation: row.get(1)?,
                target_type: row.get(2)?,
                target_id: row.get(3)?,
                user_id: row.get(4)?,
                result: row.get(5)?,
            })
        })?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }

        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audit_log() {
        let audit = AuditLog::open(":memory:").unwrap();

        audit
            .log(
                &AuditEntry::success(Operation::Create)
                    .target("consultations", "123")
                    .user(Some("admin"))
                    .client_ip(Some("127.0.0.1")),
            )
            .unwrap();

        audit
            .log(
                &AuditEntry::failure(Operation::SignIn, "Identifiants invalides")
                    .client_ip(Some("192.168.1.1")),
            )
            .unwrap();

        let count: i32 = audit
            .conn
            .query_row("SELECT COUNT(*) FROM audit_log", [], |row| row.get(0))
            .unwrap();

        assert_eq!(count, 2);

        audit
            .log(
                &AuditEntry::success(Operation::PasswordChange)
                    .target("Profile", "u1")
                    .detail("2 other session(s) revoked"),
            )
            .unwrap();
        let detail: Option<String> = audit
            .conn
            .query_row(
                "SELECT detail FROM audit_log WHERE operation = 'password-change'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(detail.as_deref(), Some("2 other session(s) revoked"));
    }

    #[test]
    fn test_recent_entries() {
        let audit = AuditLog::open(":memory:").unwrap();

        audit
            .log(&AuditEntry::success(Operation::Create).target("users", "u1"))
            .unwrap();
        audit
            .log(&AuditEntry::success(Operation::Assign).target("users", "u1"))
            .unwrap();
        audit
            .log(&AuditEntry::failure(Operation::Delete, "introuvable").target("transactions", "t9"))
            .unwrap();

        let entries = audit.recent_entries(10).unwrap();
        assert_eq!(entries.len(), 3);
        // Most recent first
        assert_eq!(entries[0].operation, "delete");
        assert_eq!(entries[0].result, "error");
        assert_eq!(entries[2].target_id.as_deref(), Some("u1"));

        assert_eq!(audit.recent_entries(1).unwrap().len(), 1);
    }
}
