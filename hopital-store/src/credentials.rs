//! Accounts, sessions and password reset tokens

use hopital_core::{NewProfile, Profile};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::departments::{insert_assignment, resolve_department};
use crate::error::{Result, StoreError};
use crate::profiles::fetch_profile;
use crate::sqlite_store::{conflict_on_unique, now_rfc3339, SqliteStore};

const DUPLICATE_EMAIL: &str = "Un compte existe déjà avec cette adresse e-mail";

/// Everything needed to create a user in one step
#[derive(Debug, Clone)]
pub struct NewAccount {
    /// Already normalized
    pub profile: NewProfile,
    pub password_hash: String,
    /// Department names, matched case and accent insensitively
    pub departments: Vec<String>,
    pub created_by: Option<String>,
}

/// A password reset token as stored
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordReset {
    pub token_id: String,
    pub user_id: String,
    pub secret_hash: String,
    pub expires_at: i64,
    pub used: bool,
}

#[allow(clippy::result_large_err)]
impl SqliteStore {
    /// Create credential, profile and department assignments atomically.
    ///
    /// Nothing is written when any step fails.
    pub fn create_account(&self, account: NewAccount) -> Result<Profile> {
        let user_id = Uuid::new_v4().to_string();
        let now = now_rfc3339();
        let NewAccount {
            profile,
            password_hash,
            departments,
            created_by,
        } = account;

        self.in_transaction(|tx| {
            tx.execute(
                "INSERT INTO credentials (user_id, email, password_hash, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![user_id, profile.email, password_hash, now],
            )
            .map_err(|e| conflict_on_unique(e, DUPLICATE_EMAIL))?;

            tx.execute(
                r#"
                INSERT INTO profiles
                (user_id, full_name, email, phone_number, role, branch, is_active, created_at, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)
                "#,
                params![
                    user_id,
                    profile.full_name,
                    profile.email,
                    profile.phone_number,
                    profile.role.as_str(),
                    profile.branch,
                    profile.is_active as i64,
                    now,
                ],
            )
            .map_err(|e| conflict_on_unique(e, DUPLICATE_EMAIL))?;

            for name in &departments {
                let department = resolve_department(tx, name)?;
                insert_assignment(tx, &user_id, &department, created_by.as_deref())?;
            }

            fetch_profile(tx, &user_id)?
                .ok_or_else(|| StoreError::not_found("Utilisateur", user_id.clone()))
        })
    }

    /// Credential lookup for sign-in: (user_id, password_hash)
    pub fn credential_by_email(&self, email: &str) -> Result<Option<(String, String)>> {
        let conn = self.conn()?;
        let credential = conn
            .query_row(
                "SELECT user_id, password_hash FROM credentials WHERE email = ?1",
                params![email.trim().to_lowercase()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        Ok(credential)
    }

    pub fn password_hash(&self, user_id: &str) -> Result<Option<String>> {
        let conn = self.conn()?;
        let hash = conn
            .query_row(
                "SELECT password_hash FROM credentials WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(hash)
    }

    pub fn set_password_hash(&self, user_id: &str, password_hash: &str) -> Result<()> {
        let conn = self.conn()?;
        update_password(&conn, user_id, password_hash)
    }

    pub fn create_session(&self, user_id: &str, created_at: i64, expires_at: i64) -> Result<String> {
        let session_id = Uuid::new_v4().to_string();
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO sessions (session_id, user_id, created_at, expires_at) VALUES (?1, ?2, ?3, ?4)",
            params![session_id, user_id, created_at, expires_at],
        )?;
        Ok(session_id)
    }

    /// True if the session exists, belongs to the user, is not revoked and not expired
    pub fn session_is_active(&self, session_id: &str, user_id: &str, now: i64) -> Result<bool> {
        let conn = self.conn()?;
        let found = conn
            .query_row(
                "SELECT 1 FROM sessions
                 WHERE session_id = ?1 AND user_id = ?2 AND revoked = 0 AND expires_at > ?3",
                params![session_id, user_id, now],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    pub fn revoke_session(&self, session_id: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE sessions SET revoked = 1 WHERE session_id = ?1",
            params![session_id],
        )?;
        Ok(())
    }

    /// Revoke every session of a user, returns how many were active
    pub fn revoke_user_sessions(&self, user_id: &str) -> Result<usize> {
        let conn = self.conn()?;
        revoke_sessions(&conn, user_id, None)
    }

    /// Revoke every session of a user except the one making the request
    pub fn revoke_other_sessions(&self, user_id: &str, keep_session_id: &str) -> Result<usize> {
        let conn = self.conn()?;
        revoke_sessions(&conn, user_id, Some(keep_session_id))
    }

    pub fn create_password_reset(
        &self,
        user_id: &str,
        secret_hash: &str,
        expires_at: i64,
    ) -> Result<String> {
        let token_id = Uuid::new_v4().to_string();
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO password_resets (token_id, user_id, secret_hash, expires_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![token_id, user_id, secret_hash, expires_at],
        )?;
        Ok(token_id)
    }

    pub fn find_password_reset(&self, token_id: &str) -> Result<Option<PasswordReset>> {
        let conn = self.conn()?;
        let reset = conn
            .query_row(
                "SELECT token_id, user_id, secret_hash, expires_at, used
                 FROM password_resets WHERE token_id = ?1",
                params![token_id],
                |row| {
                    Ok(PasswordReset {
                        token_id: row.get(0)?,
                        user_id: row.get(1)?,
                        secret_hash: row.get(2)?,
                        expires_at: row.get(3)?,
                        used: row.get::<_, i64>(4)? != 0,
                    })
                },
            )
            .optional()?;
        Ok(reset)
    }

    /// Consume a reset token, store the new hash and sign the user out everywhere.
    ///
    /// Fails with a conflict if the token was consumed in the meantime.
    pub fn complete_password_reset(&self, token_id: &str, password_hash: &str) -> Result<String> {
        self.in_transaction(|tx| {
            let user_id: Option<String> = tx
                .query_row(
                    "SELECT user_id FROM password_resets WHERE token_id = ?1 AND used = 0",
                    params![token_id],
                    |row| row.get(0),
                )
                .optional()?;
            let user_id = user_id.ok_or_else(|| {
                StoreError::Conflict("Ce lien de réinitialisation a déjà été utilisé".to_string())
            })?;

            tx.execute(
                "UPDATE password_resets SET used = 1 WHERE user_id = ?1",
                params![user_id],
            )?;
            update_password(tx, &user_id, password_hash)?;
            revoke_sessions(tx, &user_id, None)?;
            Ok(user_id)
        })
    }
}

fn update_password(conn: &Connection, user_id: &str, password_hash: &str) -> Result<()> {
    let changed = conn.execute(
        "UPDATE credentials SET password_hash = ?2 WHERE user_id = ?1",
        params![user_id, password_hash],
    )?;
    if changed == 0 {
        return Err(StoreError::not_found("Utilisateur", user_id));
    }
    Ok(())
}

pub(crate) fn revoke_sessions(conn: &Connection, user_id: &str, keep: Option<&str>) -> Result<usize> {
    let changed = conn.execute(
        "UPDATE sessions SET revoked = 1
         WHERE user_id = ?1 AND revoked = 0 AND session_id IS NOT ?2",
        params![user_id, keep],
    )?;
    Ok(changed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hopital_core::Role;

    fn new_account(email: &str, departments: &[&str]) -> NewAccount {
        NewAccount {
            profile: NewProfile {
                full_name: "Aminata Ndiaye".to_string(),
                email: email.to_string(),
                phone_number: Some("+221 77 000 00 00".to_string()),
                role: Role::Midwife,
                branch: None,
                is_active: true,
            },
            password_hash: "argon2-hash".to_string(),
            departments: departments.iter().map(|d| d.to_string()).collect(),
            created_by: Some("admin-1".to_string()),
        }
    }

    fn store_with_departments() -> SqliteStore {
        let store = SqliteStore::open(":memory:").unwrap();
        store
            .seed_departments(&["Maternité".to_string(), "Urgences".to_string()])
            .unwrap();
        store
    }

    #[test]
    fn test_create_account_with_departments() {
        let store = store_with_departments();
        let profile = store
            .create_account(new_account("aminata@hopital.test", &["maternite"]))
            .unwrap();
        assert_eq!(profile.role, Role::Midwife);

        let names = store.department_names_for_user(&profile.user_id).unwrap();
        assert_eq!(names, vec!["Maternité".to_string()]);

        let (user_id, hash) = store
            .credential_by_email("aminata@hopital.test")
            .unwrap()
            .unwrap();
        assert_eq!(user_id, profile.user_id);
        assert_eq!(hash, "argon2-hash");
    }

    #[test]
    fn test_create_account_is_atomic() {
        let store = store_with_departments();
        let err = store
            .create_account(new_account("aminata@hopital.test", &["Maternité", "Radiologie"]))
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));

        // Neither credential nor profile survived the failed assignment
        assert!(store.credential_by_email("aminata@hopital.test").unwrap().is_none());
        assert!(store.find_profile_by_email("aminata@hopital.test").unwrap().is_none());
    }

    #[test]
    fn test_duplicate_email_conflict() {
        let store = store_with_departments();
        store.create_account(new_account("dup@hopital.test", &[])).unwrap();
        let err = store
            .create_account(new_account("dup@hopital.test", &[]))
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(ref m) if m == DUPLICATE_EMAIL));
    }

    #[test]
    fn test_sessions_lifecycle() {
        let store = store_with_departments();
        let profile = store.create_account(new_account("s@hopital.test", &[])).unwrap();
        let uid = profile.user_id.as_str();

        let first = store.create_session(uid, 100, 1_000).unwrap();
        let second = store.create_session(uid, 100, 1_000).unwrap();
        assert!(store.session_is_active(&first, uid, 500).unwrap());
        assert!(!store.session_is_active(&first, uid, 1_000).unwrap());
        assert!(!store.session_is_active(&first, "someone-else", 500).unwrap());

        assert_eq!(store.revoke_other_sessions(uid, &first).unwrap(), 1);
        assert!(store.session_is_active(&first, uid, 500).unwrap());
        assert!(!store.session_is_active(&second, uid, 500).unwrap());

        store.revoke_session(&first).unwrap();
        assert!(!store.session_is_active(&first, uid, 500).unwrap());
    }

    #[test]
    fn test_password_reset_single_use() {
        let store = store_with_departments();
        let profile = store.create_account(new_account("r@hopital.test", &[])).unwrap();
        let uid = profile.user_id.as_str();
        let session = store.create_session(uid, 0, i64::MAX).unwrap();

        let token_id = store.create_password_reset(uid, "secret-hash", 9_999).unwrap();
        let reset = store.find_password_reset(&token_id).unwrap().unwrap();
        assert_eq!(reset.user_id, uid);
        assert!(!reset.used);

        assert_eq!(store.complete_password_reset(&token_id, "new-hash").unwrap(), uid);
        assert_eq!(store.password_hash(uid).unwrap().as_deref(), Some("new-hash"));
        assert!(!store.session_is_active(&session, uid, 1).unwrap());
        assert!(store.find_password_reset(&token_id).unwrap().unwrap().used);

        let err = store.complete_password_reset(&token_id, "again").unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }
}
