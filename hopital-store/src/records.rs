//! Record rows
//!
//! Bodies are stored as JSON text. Only the owner, the business date and
//! timestamps live in dedicated columns; search and totals read the body
//! through `json_extract`.

use chrono::NaiveDate;
use hopital_core::{NormalizedRecord, RecordKind, TransactionKind};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, OptionalExtension, Row};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::error::{Result, StoreError};
use crate::sqlite_store::{now_rfc3339, SqliteStore};

const RECORD_COLUMNS: &str = "id, created_by, created_at, updated_at, record_date, value";

/// A record as returned by the API: metadata plus the flattened body
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredRecord {
    pub id: String,
    #[serde(rename = "recordType")]
    pub kind: RecordKind,
    pub created_by: String,
    pub created_at: String,
    pub updated_at: String,
    pub record_date: NaiveDate,
    #[serde(flatten)]
    pub value: Value,
}

#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    /// Restrict to rows created by this user
    pub created_by: Option<String>,
    /// Case-insensitive match on the patient name or transaction label
    pub query: Option<String>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub limit: Option<usize>,
    pub offset: usize,
}

/// One page of records and the number of rows matching the filter
#[derive(Debug, Clone, PartialEq)]
pub struct RecordPage {
    pub records: Vec<StoredRecord>,
    pub total: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionTotals {
    pub income: i64,
    pub expense: i64,
    pub balance: i64,
    pub count: i64,
}

/// JSON path searched by the text filter of each kind
fn search_path(kind: RecordKind) -> &'static str {
    match kind {
        RecordKind::Transaction => "$.label",
        _ => "$.patientName",
    }
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<StoredRecordRow> {
    Ok(StoredRecordRow {
        id: row.get(0)?,
        created_by: row.get(1)?,
        created_at: row.get(2)?,
        updated_at: row.get(3)?,
        record_date: row.get(4)?,
        value: row.get(5)?,
    })
}

struct StoredRecordRow {
    id: String,
    created_by: String,
    created_at: String,
    updated_at: String,
    record_date: String,
    value: String,
}

impl StoredRecordRow {
    fn into_record(self, kind: RecordKind) -> Result<StoredRecord> {
        let record_date = NaiveDate::parse_from_str(&self.record_date, "%Y-%m-%d")
            .map_err(|e| StoreError::Other(format!("Date invalide en base : {}", e)))?;
        Ok(StoredRecord {
            id: self.id,
            kind,
            created_by: self.created_by,
            created_at: self.created_at,
            updated_at: self.updated_at,
            record_date,
            value: serde_json::from_str(&self.value)?,
        })
    }
}

/// WHERE clause and its bound values for a kind and filter
fn build_where(kind: RecordKind, filter: &RecordFilter) -> (String, Vec<SqlValue>) {
    let mut clauses = vec!["kind = ?1".to_string()];
    let mut values = vec![SqlValue::Text(kind.as_str().to_string())];

    if let Some(ref owner) = filter.created_by {
        values.push(SqlValue::Text(owner.clone()));
        clauses.push(format!("created_by = ?{}", values.len()));
    }
    if let Some(query) = filter.query.as_deref().map(str::trim)
        && !query.is_empty()
    {
        values.push(SqlValue::Text(like_pattern(&query.to_lowercase())));
        clauses.push(format!(
            "lower(COALESCE(json_extract(value, '{}'), '')) LIKE ?{} ESCAPE '\\'",
            search_path(kind),
            values.len()
        ));
    }
    if let Some(from) = filter.from {
        values.push(SqlValue::Text(from.to_string()));
        clauses.push(format!("record_date >= ?{}", values.len()));
    }
    if let Some(to) = filter.to {
        values.push(SqlValue::Text(to.to_string()));
        clauses.push(format!("record_date <= ?{}", values.len()));
    }

    (clauses.join(" AND "), values)
}

fn like_pattern(value: &str) -> String {
    let escaped: String = value
        .chars()
        .flat_map(|c| match c {
            '%' | '_' | '\\' => vec!['\\', c],
            other => vec![other],
        })
        .collect();
    format!("%{}%", escaped)
}

#[allow(clippy::result_large_err)]
impl SqliteStore {
    pub fn insert_record(
        &self,
        kind: RecordKind,
        record: &NormalizedRecord,
        created_by: &str,
    ) -> Result<StoredRecord> {
        let id = Uuid::new_v4().to_string();
        let now = now_rfc3339();
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO records (kind, id, created_by, created_at, updated_at, record_date, value)
            VALUES (?1, ?2, ?3, ?4, ?4, ?5, ?6)
            "#,
            params![
                kind.as_str(),
                id,
                created_by,
                now,
                record.record_date.to_string(),
                serde_json::to_string(&record.value)?,
            ],
        )?;

        Ok(StoredRecord {
            id,
            kind,
            created_by: created_by.to_string(),
            created_at: now.clone(),
            updated_at: now,
            record_date: record.record_date,
            value: record.value.clone(),
        })
    }

    pub fn get_record(&self, kind: RecordKind, id: &str) -> Result<Option<StoredRecord>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM records WHERE kind = ?1 AND id = ?2",
            RECORD_COLUMNS
        );
        let row = conn
            .query_row(&sql, params![kind.as_str(), id], row_to_record)
            .optional()?;
        row.map(|row| row.into_record(kind)).transpose()
    }

    /// Replace the body of a record, keeping owner and creation stamp
    pub fn update_record(
        &self,
        kind: RecordKind,
        id: &str,
        record: &NormalizedRecord,
    ) -> Result<StoredRecord> {
        {
            let conn = self.conn()?;
            let changed = conn.execute(
                r#"
                UPDATE records SET value = ?3, record_date = ?4, updated_at = ?5
                WHERE kind = ?1 AND id = ?2
                "#,
                params![
                    kind.as_str(),
                    id,
                    serde_json::to_string(&record.value)?,
                    record.record_date.to_string(),
                    now_rfc3339(),
                ],
            )?;
            if changed == 0 {
                return Err(StoreError::not_found(kind.label(), id));
            }
        }
        self.get_record(kind, id)?
            .ok_or_else(|| StoreError::not_found(kind.label(), id))
    }

    pub fn delete_record(&self, kind: RecordKind, id: &str) -> Result<()> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "DELETE FROM records WHERE kind = ?1 AND id = ?2",
            params![kind.as_str(), id],
        )?;
        if changed == 0 {
            return Err(StoreError::not_found(kind.label(), id));
        }
        Ok(())
    }

    /// Records of a kind, newest business date first
    pub fn list_records(&self, kind: RecordKind, filter: &RecordFilter) -> Result<RecordPage> {
        let (where_clause, mut values) = build_where(kind, filter);
        let conn = self.conn()?;

        let total: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM records WHERE {}", where_clause),
            params_from_iter(values.iter()),
            |row| row.get(0),
        )?;

        // LIMIT -1 means no limit in SQLite
        let limit = filter.limit.map(|l| l as i64).unwrap_or(-1);
        values.push(SqlValue::Integer(limit));
        values.push(SqlValue::Integer(
            i64::try_from(filter.offset).unwrap_or(i64::MAX),
        ));
        let sql = format!(
            "SELECT {} FROM records WHERE {} ORDER BY record_date DESC, created_at DESC LIMIT ?{} OFFSET ?{}",
            RECORD_COLUMNS,
            where_clause,
            values.len() - 1,
            values.len()
        );

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values.iter()), row_to_record)?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row?.into_record(kind)?);
        }

        Ok(RecordPage { records, total })
    }

    pub fn count_records(&self, kind: RecordKind, created_by: Option<&str>) -> Result<i64> {
        let conn = self.conn()?;
        let count = conn.query_row(
            "SELECT COUNT(*) FROM records WHERE kind = ?1 AND (?2 IS NULL OR created_by = ?2)",
            params![kind.as_str(), created_by],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Income and expense sums over transactions, optionally for one user
    pub fn transaction_totals(&self, created_by: Option<&str>) -> Result<TransactionTotals> {
        let conn = self.conn()?;
        let (income, expense, count) = conn.query_row(
            r#"
            SELECT
                COALESCE(SUM(CASE WHEN json_extract(value, '$.kind') = ?3
                             THEN json_extract(value, '$.amount') ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN json_extract(value, '$.kind') = ?4
                             THEN json_extract(value, '$.amount') ELSE 0 END), 0),
                COUNT(*)
            FROM records
            WHERE kind = ?1 AND (?2 IS NULL OR created_by = ?2)
            "#,
            params![
                RecordKind::Transaction.as_str(),
                created_by,
                TransactionKind::Income.as_str(),
                TransactionKind::Expense.as_str(),
            ],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            },
        )?;

        Ok(TransactionTotals {
            income,
            expense,
            balance: income.saturating_sub(expense),
            count,
        })
    }
}
