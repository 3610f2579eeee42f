//! Profile rows

use hopital_core::{Profile, ProfileUpdate, Role, SettingsUpdate};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

use crate::credentials::revoke_sessions;
use crate::error::{Result, StoreError};
use crate::sqlite_store::{now_rfc3339, SqliteStore};

const PROFILE_COLUMNS: &str =
    "user_id, full_name, email, phone_number, role, branch, is_active, created_at";

/// Filter for the user management list
#[derive(Debug, Clone, Default)]
pub struct ProfileFilter {
    /// Case-insensitive match on name, email or phone
    pub query: Option<String>,
    pub role: Option<Role>,
    pub is_active: Option<bool>,
}

/// Headcount shown on the dashboard
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileCounts {
    pub total: i64,
    pub active: i64,
    pub by_role: Vec<(String, i64)>,
}

fn row_to_profile(row: &Row<'_>) -> rusqlite::Result<Profile> {
    Ok(Profile {
        user_id: row.get(0)?,
        full_name: row.get(1)?,
        email: row.get(2)?,
        phone_number: row.get(3)?,
        role: Role::parse(&row.get::<_, String>(4)?),
        branch: row.get(5)?,
        is_active: row.get::<_, i64>(6)? != 0,
        created_at: row.get(7)?,
    })
}

pub(crate) fn fetch_profile(conn: &Connection, user_id: &str) -> Result<Option<Profile>> {
    let sql = format!("SELECT {} FROM profiles WHERE user_id = ?1", PROFILE_COLUMNS);
    let profile = conn
        .query_row(&sql, params![user_id], row_to_profile)
        .optional()?;
    Ok(profile)
}

fn write_profile(conn: &Connection, profile: &Profile) -> Result<()> {
    let changed = conn.execute(
        r#"
        UPDATE profiles
        SET full_name = ?2, phone_number = ?3, role = ?4, branch = ?5,
            is_active = ?6, updated_at = ?7
        WHERE user_id = ?1
        "#,
        params![
            profile.user_id,
            profile.full_name,
            profile.phone_number,
            profile.role.as_str(),
            profile.branch,
            profile.is_active as i64,
            now_rfc3339(),
        ],
    )?;
    if changed == 0 {
        return Err(StoreError::not_found("Utilisateur", profile.user_id.clone()));
    }
    Ok(())
}

pub(crate) fn count_active_admins(conn: &Connection) -> Result<i64> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM profiles WHERE role = 'admin' AND is_active = 1",
        [],
        |row| row.get(0),
    )?;
    Ok(count)
}

fn escape_like(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('%');
    for c in value.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('%');
    out
}

#[allow(clippy::result_large_err)]
impl SqliteStore {
    pub fn get_profile(&self, user_id: &str) -> Result<Option<Profile>> {
        let conn = self.conn()?;
        fetch_profile(&conn, user_id)
    }

    pub fn find_profile_by_email(&self, email: &str) -> Result<Option<Profile>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {} FROM profiles WHERE email = ?1", PROFILE_COLUMNS);
        let profile = conn
            .query_row(&sql, params![email.trim().to_lowercase()], row_to_profile)
            .optional()?;
        Ok(profile)
    }

    /// Profiles ordered by name
    pub fn list_profiles(&self, filter: &ProfileFilter) -> Result<Vec<Profile>> {
        let mut clauses = Vec::new();
        let mut values: Vec<String> = Vec::new();

        if let Some(query) = filter.query.as_deref().map(str::trim)
            && !query.is_empty()
        {
            values.push(escape_like(&query.to_lowercase()));
            let idx = values.len();
            clauses.push(format!(
                "(lower(full_name) LIKE ?{idx} ESCAPE '\\' OR email LIKE ?{idx} ESCAPE '\\' \
                 OR COALESCE(phone_number, '') LIKE ?{idx} ESCAPE '\\')"
            ));
        }
        if let Some(ref role) = filter.role {
            values.push(role.as_str().to_string());
            clauses.push(format!("role = ?{}", values.len()));
        }
        if let Some(active) = filter.is_active {
            clauses.push(format!("is_active = {}", active as i64));
        }

        let where_clause = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };
        let sql = format!(
            "SELECT {} FROM profiles {} ORDER BY lower(full_name), email",
            PROFILE_COLUMNS, where_clause
        );

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values.iter()), row_to_profile)?;

        let mut profiles = Vec::new();
        for row in rows {
            profiles.push(row?);
        }
        Ok(profiles)
    }

    /// Apply an administrator edit.
    ///
    /// The last-admin check and the write share one transaction, so two
    /// concurrent edits cannot both remove the last active administrator.
    /// Deactivation revokes every session of the user.
    pub fn update_profile(&self, user_id: &str, update: &ProfileUpdate) -> Result<Profile> {
        self.in_transaction(|tx| {
            let current = fetch_profile(tx, user_id)?
                .ok_or_else(|| StoreError::not_found("Utilisateur", user_id))?;
            let mut profile = current.clone();
            update.apply(&mut profile)?;

            if update.revokes_admin(&current) && count_active_admins(tx)? <= 1 {
                return Err(StoreError::Conflict(
                    "Impossible de retirer le dernier administrateur actif".to_string(),
                ));
            }
            write_profile(tx, &profile)?;
            if current.is_active && !profile.is_active {
                revoke_sessions(tx, user_id, None)?;
            }
            Ok(profile)
        })
    }

    pub fn set_active(&self, user_id: &str, is_active: bool) -> Result<Profile> {
        self.update_profile(
            user_id,
            &ProfileUpdate {
                is_active: Some(is_active),
                ..Default::default()
            },
        )
    }

    /// Self-service edit from the settings page
    pub fn apply_settings(&self, user_id: &str, update: &SettingsUpdate) -> Result<Profile> {
        self.in_transaction(|tx| {
            let mut profile = fetch_profile(tx, user_id)?
                .ok_or_else(|| StoreError::not_found("Utilisateur", user_id))?;
            update.apply(&mut profile)?;
            write_profile(tx, &profile)?;
            Ok(profile)
        })
    }

    pub fn count_profiles(&self) -> Result<ProfileCounts> {
        let conn = self.conn()?;
        let (total, active) = conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(is_active), 0) FROM profiles",
            [],
            |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)),
        )?;

        let mut stmt =
            conn.prepare("SELECT role, COUNT(*) FROM profiles GROUP BY role ORDER BY role")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;
        let mut by_role = Vec::new();
        for row in rows {
            by_role.push(row?);
        }

        Ok(ProfileCounts {
            total,
            active,
            by_role,
        })
    }

    pub fn active_admin_count(&self) -> Result<i64> {
        let conn = self.conn()?;
        count_active_admins(&conn)
    }
}
