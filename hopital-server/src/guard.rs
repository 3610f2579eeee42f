//! Section guards
//!
//! Handlers call [`require_section`] right after extracting the caller.
//! `/access` exposes the same decisions so the front-end can build its
//! navigation and redirect before hitting a protected page.

use axum::{
    extract::{Path, State},
    response::Json,
};
use hopital_core::{Decision, Section};
use serde::Serialize;
use std::sync::Arc;

use crate::{auth::CurrentUser, error::ApiError, AppState};

/// Fail with 401/403 unless the policy grants `section` to the caller
#[allow(clippy::result_large_err)]
pub fn require_section(
    state: &AppState,
    user: &CurrentUser,
    section: Section,
) -> Result<(), ApiError> {
    match state.policy.evaluate(Some(&user.subject()), section) {
        Decision::Granted => Ok(()),
        Decision::Denied(reason) => {
            tracing::info!(
                user_id = %user.user_id(),
                section = %section,
                reason = ?reason,
                "Access denied"
            );
            Err(ApiError::denied(&reason))
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionAccess {
    pub section: Section,
    pub label: &'static str,
    pub path: String,
    pub granted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

fn section_access(state: &AppState, user: &CurrentUser, section: Section) -> SectionAccess {
    let decision = state.policy.evaluate(Some(&user.subject()), section);
    let (redirect, message) = match &decision {
        Decision::Granted => (None, None),
        Decision::Denied(reason) => (Some(reason.redirect()), Some(reason.message())),
    };
    SectionAccess {
        section,
        label: section.label(),
        path: section.path(),
        granted: decision.is_granted(),
        redirect,
        message,
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessOverview {
    /// Where to land after sign-in
    pub home: String,
    pub sections: Vec<SectionAccess>,
}

/// GET /access
pub async fn access_overview(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
) -> Json<AccessOverview> {
    let sections: Vec<SectionAccess> = Section::ALL
        .into_iter()
        .map(|s| section_access(&state, &user, s))
        .collect();
    let home = sections
        .iter()
        .find(|s| s.granted)
        .map(|s| s.path.clone())
        .unwrap_or_else(|| "/unauthorized".to_string());
    Json(AccessOverview { home, sections })
}

/// GET /access/{section}
pub async fn access_section(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(section): Path<String>,
) -> Result<Json<SectionAccess>, ApiError> {
    let section =
        Section::parse(&section).ok_or_else(|| ApiError::not_found("Section", &section))?;
    Ok(Json(section_access(&state, &user, section)))
}
