//! Departments and user assignments

use hopital_core::department::same_department;
use hopital_core::{Department, DepartmentAssignment};
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::error::{Result, StoreError};
use crate::profiles::fetch_profile;
use crate::sqlite_store::{conflict_on_unique, now_rfc3339, SqliteStore};

const ASSIGNMENT_SELECT: &str = r#"
    SELECT a.assignment_id, a.user_id, a.department_id, d.name, a.created_at, a.created_by
    FROM department_assignments a
    JOIN departments d ON d.department_id = a.department_id
"#;

fn row_to_assignment(row: &Row<'_>) -> rusqlite::Result<DepartmentAssignment> {
    Ok(DepartmentAssignment {
        assignment_id: row.get(0)?,
        user_id: row.get(1)?,
        department_id: row.get(2)?,
        department_name: row.get(3)?,
        created_at: row.get(4)?,
        created_by: row.get(5)?,
    })
}

fn all_departments(conn: &Connection) -> Result<Vec<Department>> {
    let mut stmt = conn.prepare("SELECT department_id, name FROM departments ORDER BY name")?;
    let rows = stmt.query_map([], |row| {
        Ok(Department {
            department_id: row.get(0)?,
            name: row.get(1)?,
        })
    })?;
    let mut departments = Vec::new();
    for row in rows {
        departments.push(row?);
    }
    Ok(departments)
}

/// Find a department by name, ignoring case and accents
pub(crate) fn resolve_department(conn: &Connection, name: &str) -> Result<Department> {
    all_departments(conn)?
        .into_iter()
        .find(|d| same_department(&d.name, name))
        .ok_or_else(|| StoreError::not_found("Département", name.trim()))
}

pub(crate) fn insert_assignment(
    conn: &Connection,
    user_id: &str,
    department: &Department,
    created_by: Option<&str>,
) -> Result<DepartmentAssignment> {
    let assignment = DepartmentAssignment {
        assignment_id: Uuid::new_v4().to_string(),
        user_id: user_id.to_string(),
        department_id: department.department_id,
        department_name: department.name.clone(),
        created_at: now_rfc3339(),
        created_by: created_by.map(str::to_string),
    };
    conn.execute(
        "INSERT INTO department_assignments
         (assignment_id, user_id, department_id, created_at, created_by)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            assignment.assignment_id,
            assignment.user_id,
            assignment.department_id,
            assignment.created_at,
            assignment.created_by,
        ],
    )
    .map_err(|e| {
        conflict_on_unique(
            e,
            &format!("L'utilisateur est déjà affecté au département {}", department.name),
        )
    })?;
    Ok(assignment)
}

fn query_assignments(
    conn: &Connection,
    user_id: Option<&str>,
) -> Result<Vec<DepartmentAssignment>> {
    let sql = match user_id {
        Some(_) => format!("{} WHERE a.user_id = ?1 ORDER BY d.name", ASSIGNMENT_SELECT),
        None => format!("{} ORDER BY a.user_id, d.name", ASSIGNMENT_SELECT),
    };
    let mut stmt = conn.prepare(&sql)?;
    let rows = match user_id {
        Some(uid) => stmt.query_map(params![uid], row_to_assignment)?,
        None => stmt.query_map([], row_to_assignment)?,
    };
    let mut assignments = Vec::new();
    for row in rows {
        assignments.push(row?);
    }
    Ok(assignments)
}

#[allow(clippy::result_large_err)]
impl SqliteStore {
    /// Insert missing departments, returns how many were added
    pub fn seed_departments(&self, names: &[String]) -> Result<usize> {
        self.in_transaction(|tx| {
            let existing = all_departments(tx)?;
            let mut added = 0;
            for name in names {
                let name = name.trim();
                if name.is_empty() || existing.iter().any(|d| same_department(&d.name, name)) {
                    continue;
                }
                added += tx.execute(
                    "INSERT OR IGNORE INTO departments (name) VALUES (?1)",
                    params![name],
                )?;
            }
            Ok(added)
        })
    }

    pub fn list_departments(&self) -> Result<Vec<Department>> {
        let conn = self.conn()?;
        all_departments(&conn)
    }

    pub fn get_department(&self, department_id: i64) -> Result<Option<Department>> {
        let conn = self.conn()?;
        let department = conn
            .query_row(
                "SELECT department_id, name FROM departments WHERE department_id = ?1",
                params![department_id],
                |row| {
                    Ok(Department {
                        department_id: row.get(0)?,
                        name: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(department)
    }

    pub fn assignments_for_user(&self, user_id: &str) -> Result<Vec<DepartmentAssignment>> {
        let conn = self.conn()?;
        query_assignments(&conn, Some(user_id))
    }

    pub fn department_names_for_user(&self, user_id: &str) -> Result<Vec<String>> {
        Ok(self
            .assignments_for_user(user_id)?
            .into_iter()
            .map(|a| a.department_name)
            .collect())
    }

    pub fn list_assignments(&self) -> Result<Vec<DepartmentAssignment>> {
        let conn = self.conn()?;
        query_assignments(&conn, None)
    }

    /// Assign a user to a department by id
    pub fn assign_department(
        &self,
        user_id: &str,
        department_id: i64,
        created_by: Option<&str>,
    ) -> Result<DepartmentAssignment> {
        self.in_transaction(|tx| {
            fetch_profile(tx, user_id)?
                .ok_or_else(|| StoreError::not_found("Utilisateur", user_id))?;
            let department = all_departments(tx)?
                .into_iter()
                .find(|d| d.department_id == department_id)
                .ok_or_else(|| StoreError::not_found("Département", department_id.to_string()))?;
            insert_assignment(tx, user_id, &department, created_by)
        })
    }

    /// Delete an assignment, returning it
    pub fn remove_assignment(&self, assignment_id: &str) -> Result<DepartmentAssignment> {
        self.in_transaction(|tx| {
            let sql = format!("{} WHERE a.assignment_id = ?1", ASSIGNMENT_SELECT);
            let assignment = tx
                .query_row(&sql, params![assignment_id], row_to_assignment)
                .optional()?
                .ok_or_else(|| StoreError::not_found("Affectation", assignment_id))?;
            tx.execute(
                "DELETE FROM department_assignments WHERE assignment_id = ?1",
                params![assignment_id],
            )?;
            Ok(assignment)
        })
    }

    /// Replace the whole department set of a user.
    ///
    /// Assignments that survive keep their id and creation stamp.
    pub fn replace_assignments(
        &self,
        user_id: &str,
        names: &[String],
        created_by: Option<&str>,
    ) -> Result<Vec<DepartmentAssignment>> {
        self.in_transaction(|tx| {
            fetch_profile(tx, user_id)?
                .ok_or_else(|| StoreError::not_found("Utilisateur", user_id))?;

            let mut wanted: Vec<Department> = Vec::new();
            for name in names {
                let department = resolve_department(tx, name)?;
                if !wanted.iter().any(|d| d.department_id == department.department_id) {
                    wanted.push(department);
                }
            }

            let current = query_assignments(tx, Some(user_id))?;
            for assignment in &current {
                if !wanted.iter().any(|d| d.department_id == assignment.department_id) {
                    tx.execute(
                        "DELETE FROM department_assignments WHERE assignment_id = ?1",
                        params![assignment.assignment_id],
                    )?;
                }
            }
            for department in &wanted {
                if !current.iter().any(|a| a.department_id == department.department_id) {
                    insert_assignment(tx, user_id, department, created_by)?;
                }
            }

            query_assignments(tx, Some(user_id))
        })
    }
}
