//! Dashboard figures
//!
//! GET /dashboard returns record counts and transaction totals. Admins see
//! global figures plus user statistics and recent audit activity, everyone
//! else sees figures for the records they created.

use axum::{extract::State, response::Json};
use hopital_core::{RecordKind, Section};
use hopital_store::{AuditRecord, TransactionTotals};
use serde::Serialize;
use std::sync::Arc;

use crate::{auth::CurrentUser, error::ApiError, guard::require_section, AppState};

const RECENT_ACTIVITY: usize = 20;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordCount {
    pub kind: RecordKind,
    pub label: &'static str,
    pub count: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleCount {
    pub role: String,
    pub count: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStats {
    pub total: i64,
    pub active: i64,
    pub inactive: i64,
    pub by_role: Vec<RoleCount>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    /// `global` for administrators, `personal` otherwise
    pub scope: &'static str,
    pub records: Vec<RecordCount>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transactions: Option<TransactionTotals>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub users: Option<UserStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recent_activity: Option<Vec<AuditRecord>>,
}

/// GET /dashboard
pub async fn dashboard(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
) -> Result<Json<Dashboard>, ApiError> {
    require_section(&state, &user, Section::Dashboard)?;

    let admin = user.is_admin();
    let created_by = (!admin).then(|| user.user_id());
    let subject = user.subject();

    // Only kinds the caller can open are counted
    let mut records = Vec::new();
    for kind in RecordKind::ALL {
        if !state.policy.evaluate(Some(&subject), kind.section()).is_granted() {
            continue;
        }
        records.push(RecordCount {
            kind,
            label: kind.title(),
            count: state.store.count_records(kind, created_by)?,
        });
    }

    let transactions = if records.iter().any(|r| r.kind == RecordKind::Transaction) {
        Some(state.store.transaction_totals(created_by)?)
    } else {
        None
    };

    let (users, recent_activity) = if admin {
        let counts = state.store.count_profiles()?;
        let stats = UserStats {
            total: counts.total,
            active: counts.active,
            inactive: counts.total - counts.active,
            by_role: counts
                .by_role
                .into_iter()
                .map(|(role, count)| RoleCount { role, count })
                .collect(),
        };

        let audit = state.audit.lock().await;
        let recent = audit.recent_entries(RECENT_ACTIVITY).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Failed to read recent audit entries");
            Vec::new()
        });
        drop(audit);

        (Some(stats), Some(recent))
    } else {
        (None, None)
    };

    Ok(Json(Dashboard {
        scope: if admin { "global" } else { "personal" },
        records,
        transactions,
        users,
        recent_activity,
    }))
}
