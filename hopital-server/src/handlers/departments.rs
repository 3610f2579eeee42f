use axum::{
    extract::{Path, Query, Request, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use hopital_core::{Department, DepartmentAssignment, Notice, Section};
use hopital_store::Operation;
use serde::Deserialize;
use std::sync::Arc;

use super::{param, QueryParams};
use crate::audit::{self, AuditContext};
use crate::auth::CurrentUser;
use crate::error::{read_json, ApiError};
use crate::guard::require_section;
use crate::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssignRequest {
    user_id: String,
    department_id: i64,
}

/// GET /departments
///
/// Any signed-in user may read the list, it feeds the profile forms.
pub async fn list(
    State(state): State<Arc<AppState>>,
    _user: CurrentUser,
) -> Result<Json<Vec<Department>>, ApiError> {
    Ok(Json(state.store.list_departments()?))
}

/// GET /departments/assignments?userId=
pub async fn list_assignments(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Query(params): Query<QueryParams>,
) -> Result<Json<Vec<DepartmentAssignment>>, ApiError> {
    require_section(&state, &user, Section::Departments)?;
    let assignments = match param(&params, "userId") {
        Some(user_id) => state.store.assignments_for_user(user_id)?,
        None => state.store.list_assignments()?,
    };
    Ok(Json(assignments))
}

/// POST /departments/assignments
pub async fn assign(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    ctx: AuditContext,
    request: Request,
) -> Result<Response, ApiError> {
    require_section(&state, &user, Section::Departments)?;
    let body: AssignRequest = read_json(request).await?;

    let assignment = match state.store.assign_department(
        &body.user_id,
        body.department_id,
        Some(user.user_id()),
    ) {
        Ok(assignment) => assignment,
        Err(e) => {
            audit::log_failure(&state.audit, &ctx, Operation::Assign, "Assignment", &e.to_string());
            return Err(e.into());
        }
    };
    audit::log_success(
        &state.audit,
        &ctx,
        Operation::Assign,
        "Assignment",
        &assignment.assignment_id,
    );

    Ok((StatusCode::CREATED, Json(assignment)).into_response())
}

/// DELETE /departments/assignments/{id}
pub async fn unassign(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    ctx: AuditContext,
    Path(assignment_id): Path<String>,
) -> Result<Json<Notice>, ApiError> {
    require_section(&state, &user, Section::Departments)?;
    let removed = state.store.remove_assignment(&assignment_id)?;
    audit::log_success(
        &state.audit,
        &ctx,
        Operation::Unassign,
        "Assignment",
        &assignment_id,
    );

    Ok(Json(Notice::success(format!(
        "Affectation au département {} supprimée",
        removed.department_name
    ))))
}
