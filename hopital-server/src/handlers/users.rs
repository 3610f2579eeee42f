//! User management (admin only)

use axum::{
    extract::{Path, Query, Request, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use hopital_core::{DepartmentAssignment, NewProfile, Profile, ProfileUpdate, Role, Section, Table};
use hopital_store::{NewAccount, Operation, ProfileFilter};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use super::{bool_param, check_password, download, export_format, param, QueryParams};
use crate::audit::{self, AuditContext};
use crate::auth::CurrentUser;
use crate::error::{read_json, ApiError};
use crate::guard::require_section;
use crate::password::hash_password_async;
use crate::AppState;

const SELF_LOCKOUT: &str =
    "Vous ne pouvez pas désactiver votre propre compte ni retirer vos droits d'administrateur";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    #[serde(flatten)]
    pub profile: Profile,
    pub departments: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDetail {
    #[serde(flatten)]
    pub profile: Profile,
    pub assignments: Vec<DepartmentAssignment>,
}

#[derive(Debug, Serialize)]
pub struct UserList {
    pub users: Vec<UserSummary>,
    pub total: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateUserRequest {
    email: String,
    password: String,
    full_name: String,
    #[serde(default)]
    phone_number: Option<String>,
    #[serde(default)]
    role: Role,
    #[serde(default)]
    branch: Option<String>,
    #[serde(default = "active_by_default")]
    is_active: bool,
    #[serde(default)]
    departments: Vec<String>,
}

fn active_by_default() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct DepartmentSet {
    departments: Vec<String>,
}

#[allow(clippy::result_large_err)]
fn filter_from_params(params: &QueryParams) -> Result<ProfileFilter, ApiError> {
    Ok(ProfileFilter {
        query: param(params, "q").map(str::to_string),
        role: param(params, "role").map(Role::parse),
        is_active: bool_param(params, "active")?,
    })
}

/// Profiles with their department names, one query for all assignments
#[allow(clippy::result_large_err)]
fn summaries(state: &AppState, filter: &ProfileFilter) -> Result<Vec<UserSummary>, ApiError> {
    let profiles = state.store.list_profiles(filter)?;
    let mut by_user: HashMap<String, Vec<String>> = HashMap::new();
    for assignment in state.store.list_assignments()? {
        by_user
            .entry(assignment.user_id)
            .or_default()
            .push(assignment.department_name);
    }

    Ok(profiles
        .into_iter()
        .map(|profile| {
            let departments = by_user.remove(&profile.user_id).unwrap_or_default();
            UserSummary {
                profile,
                departments,
            }
        })
        .collect())
}

#[allow(clippy::result_large_err)]
fn user_detail(state: &AppState, user_id: &str) -> Result<UserDetail, ApiError> {
    let profile = state
        .store
        .get_profile(user_id)?
        .ok_or_else(|| ApiError::not_found("Utilisateur", user_id))?;
    let assignments = state.store.assignments_for_user(user_id)?;
    Ok(UserDetail {
        profile,
        assignments,
    })
}

/// GET /users?q=&role=&active=
pub async fn list(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Query(params): Query<QueryParams>,
) -> Result<Json<UserList>, ApiError> {
    require_section(&state, &user, Section::Users)?;
    let filter = filter_from_params(&params)?;
    let users = summaries(&state, &filter)?;
    Ok(Json(UserList {
        total: users.len(),
        users,
    }))
}

/// POST /users
///
/// Credential, profile and department assignments are created together.
pub async fn create(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    ctx: AuditContext,
    request: Request,
) -> Result<Response, ApiError> {
    require_section(&state, &user, Section::Users)?;
    let body: CreateUserRequest = read_json(request).await?;
    check_password(&body.password, "password")?;

    let new_profile = NewProfile {
        full_name: body.full_name,
        email: body.email,
        phone_number: body.phone_number,
        role: body.role,
        branch: body.branch,
        is_active: body.is_active,
    }
    .normalize()?;

    let account = NewAccount {
        profile: new_profile,
        password_hash: hash_password_async(body.password.clone()).await?,
        departments: body.departments,
        created_by: Some(user.user_id().to_string()),
    };
    let created = match state.store.create_account(account) {
        Ok(created) => created,
        Err(e) => {
            audit::log_failure(&state.audit, &ctx, Operation::Create, "Profile", &e.to_string());
            return Err(e.into());
        }
    };
    audit::log_success(&state.audit, &ctx, Operation::Create, "Profile", &created.user_id);

    let detail = user_detail(&state, &created.user_id)?;
    Ok((StatusCode::CREATED, Json(detail)).into_response())
}

/// GET /users/{id}
pub async fn read(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(user_id): Path<String>,
) -> Result<Json<UserDetail>, ApiError> {
    require_section(&state, &user, Section::Users)?;
    Ok(Json(user_detail(&state, &user_id)?))
}

/// PATCH /users/{id}
pub async fn update(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    ctx: AuditContext,
    Path(user_id): Path<String>,
    request: Request,
) -> Result<Json<UserDetail>, ApiError> {
    require_section(&state, &user, Section::Users)?;
    let update: ProfileUpdate = read_json(request).await?;

    if user_id == user.user_id() && update.revokes_admin(&user.profile) {
        return Err(ApiError::conflict(SELF_LOCKOUT));
    }

    let updated = state.store.update_profile(&user_id, &update)?;
    audit::log_success(&state.audit, &ctx, Operation::Update, "Profile", &user_id);
    if update.is_active == Some(false) && !updated.is_active {
        tracing::info!(user_id = %user_id, "Profile deactivated, sessions revoked");
    }

    Ok(Json(user_detail(&state, &user_id)?))
}

/// POST /users/{id}/toggle-active
pub async fn toggle_active(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    ctx: AuditContext,
    Path(user_id): Path<String>,
) -> Result<Json<UserDetail>, ApiError> {
    require_section(&state, &user, Section::Users)?;
    if user_id == user.user_id() {
        return Err(ApiError::conflict(SELF_LOCKOUT));
    }

    let current = state
        .store
        .get_profile(&user_id)?
        .ok_or_else(|| ApiError::not_found("Utilisateur", &user_id))?;
    let updated = state.store.set_active(&user_id, !current.is_active)?;

    let operation = if updated.is_active {
        Operation::Activate
    } else {
        Operation::Deactivate
    };
    audit::log_success(&state.audit, &ctx, operation, "Profile", &user_id);

    Ok(Json(user_detail(&state, &user_id)?))
}

/// PUT /users/{id}/departments
pub async fn replace_departments(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    ctx: AuditContext,
    Path(user_id): Path<String>,
    request: Request,
) -> Result<Json<UserDetail>, ApiError> {
    require_section(&state, &user, Section::Users)?;
    let body: DepartmentSet = read_json(request).await?;

    state
        .store
        .replace_assignments(&user_id, &body.departments, Some(user.user_id()))?;
    audit::log_success(&state.audit, &ctx, Operation::Assign, "Profile", &user_id);

    Ok(Json(user_detail(&state, &user_id)?))
}

/// GET /users/export?format=csv|xlsx|html
pub async fn export(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    ctx: AuditContext,
    Query(params): Query<QueryParams>,
) -> Result<Response, ApiError> {
    require_section(&state, &user, Section::Users)?;
    let format = export_format(&params)?;
    let filter = filter_from_params(&params)?;

    let mut columns = Profile::COLUMNS.to_vec();
    columns.push("Départements");
    let mut table = Table::new("Utilisateurs", &columns);
    for summary in summaries(&state, &filter)? {
        let mut row = summary.profile.cells();
        row.push(summary.departments.join(", "));
        table.push_row(row);
    }

    let response = download(&table, format, "utilisateurs")?;
    audit::log_success(&state.audit, &ctx, Operation::Export, "Profile", format.extension());
    Ok(response)
}
