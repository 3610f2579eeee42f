//! Medical and financial records (`/records/{kind}`)
//!
//! Non-admins only ever see their own rows. Mutations additionally require
//! the caller to be the creator or an administrator.

use axum::{
    extract::{Path, Query, Request, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use hopital_core::{can_modify_record, Notice, RecordKind, Table};
use hopital_store::{Operation, RecordFilter, StoredRecord};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

use super::{bool_param, date_param, download, export_format, param, Pagination, QueryParams};
use crate::audit::{self, AuditContext};
use crate::auth::CurrentUser;
use crate::error::{read_json, ApiError};
use crate::guard::require_section;
use crate::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordList {
    pub records: Vec<StoredRecord>,
    pub total: i64,
    pub page: usize,
    pub per_page: usize,
    pub total_pages: i64,
}

#[allow(clippy::result_large_err)]
fn parse_kind(kind: &str) -> Result<RecordKind, ApiError> {
    RecordKind::parse(kind).ok_or_else(|| ApiError::not_found("Type d'enregistrement", kind))
}

/// Section check for a record kind, returning the parsed kind
#[allow(clippy::result_large_err)]
fn guard_kind(state: &AppState, user: &CurrentUser, kind: &str) -> Result<RecordKind, ApiError> {
    let kind = parse_kind(kind)?;
    require_section(state, user, kind.section())?;
    Ok(kind)
}

/// Filter from the query string, scoped to the caller unless admin.
/// Admins may pass `mine=true` to see only their own rows.
#[allow(clippy::result_large_err)]
fn scoped_filter(user: &CurrentUser, params: &QueryParams) -> Result<RecordFilter, ApiError> {
    let mine = bool_param(params, "mine")?.unwrap_or(false);
    let from = date_param(params, "from")?;
    let to = date_param(params, "to")?;
    if let (Some(from), Some(to)) = (from, to)
        && from > to
    {
        return Err(ApiError::bad_request(
            "to",
            "La date de fin doit être postérieure à la date de début",
        ));
    }

    Ok(RecordFilter {
        created_by: (!user.is_admin() || mine).then(|| user.user_id().to_string()),
        query: param(params, "q").map(str::to_string),
        from,
        to,
        limit: None,
        offset: 0,
    })
}

/// Load a record the caller may see
#[allow(clippy::result_large_err)]
fn visible_record(
    state: &AppState,
    user: &CurrentUser,
    kind: RecordKind,
    id: &str,
) -> Result<StoredRecord, ApiError> {
    let record = state
        .store
        .get_record(kind, id)?
        .ok_or_else(|| ApiError::not_found(kind.label(), id))?;
    if !user.is_admin() && record.created_by != user.user_id() {
        return Err(ApiError::forbidden(
            "Vous ne pouvez consulter que vos propres enregistrements",
        ));
    }
    Ok(record)
}

/// Load a record the caller may change
#[allow(clippy::result_large_err)]
fn modifiable_record(
    state: &AppState,
    user: &CurrentUser,
    kind: RecordKind,
    id: &str,
) -> Result<StoredRecord, ApiError> {
    let record = state
        .store
        .get_record(kind, id)?
        .ok_or_else(|| ApiError::not_found(kind.label(), id))?;
    if !can_modify_record(&user.subject(), &record.created_by) {
        return Err(ApiError::forbidden(
            "Seul l'auteur de l'enregistrement ou un administrateur peut le modifier",
        ));
    }
    Ok(record)
}

/// GET /records/{kind}
pub async fn list(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(kind): Path<String>,
    Query(params): Query<QueryParams>,
) -> Result<Json<RecordList>, ApiError> {
    let kind = guard_kind(&state, &user, &kind)?;
    let pagination = Pagination::from_params(&params)?;

    let mut filter = scoped_filter(&user, &params)?;
    filter.limit = Some(pagination.per_page);
    filter.offset = pagination.offset();

    let page = state.store.list_records(kind, &filter)?;
    Ok(Json(RecordList {
        total_pages: pagination.total_pages(page.total),
        records: page.records,
        total: page.total,
        page: pagination.page,
        per_page: pagination.per_page,
    }))
}

/// POST /records/{kind}
pub async fn create(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    ctx: AuditContext,
    Path(kind): Path<String>,
    request: Request,
) -> Result<Response, ApiError> {
    let kind = guard_kind(&state, &user, &kind)?;
    let body: Value = read_json(request).await?;
    let normalized = kind.normalize(body)?;

    let record = state
        .store
        .insert_record(kind, &normalized, user.user_id())?;
    audit::log_success(&state.audit, &ctx, Operation::Create, kind.as_str(), &record.id);

    Ok((StatusCode::CREATED, Json(record)).into_response())
}

/// GET /records/{kind}/{id}
pub async fn read(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path((kind, id)): Path<(String, String)>,
) -> Result<Json<StoredRecord>, ApiError> {
    let kind = guard_kind(&state, &user, &kind)?;
    Ok(Json(visible_record(&state, &user, kind, &id)?))
}

/// PUT /records/{kind}/{id}
pub async fn update(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    ctx: AuditContext,
    Path((kind, id)): Path<(String, String)>,
    request: Request,
) -> Result<Json<StoredRecord>, ApiError> {
    let kind = guard_kind(&state, &user, &kind)?;
    modifiable_record(&state, &user, kind, &id)?;

    let body: Value = read_json(request).await?;
    let normalized = kind.normalize(body)?;
    let record = state.store.update_record(kind, &id, &normalized)?;
    audit::log_success(&state.audit, &ctx, Operation::Update, kind.as_str(), &id);

    Ok(Json(record))
}

/// DELETE /records/{kind}/{id}
pub async fn delete(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    ctx: AuditContext,
    Path((kind, id)): Path<(String, String)>,
) -> Result<Json<Notice>, ApiError> {
    let kind = guard_kind(&state, &user, &kind)?;
    modifiable_record(&state, &user, kind, &id)?;

    if let Err(e) = state.store.delete_record(kind, &id) {
        audit::log_failure(&state.audit, &ctx, Operation::Delete, kind.as_str(), &e.to_string());
        return Err(e.into());
    }
    audit::log_success(&state.audit, &ctx, Operation::Delete, kind.as_str(), &id);

    Ok(Json(Notice::success(format!("{} supprimée", kind.label()))))
}

/// GET /records/{kind}/export?format=csv|xlsx|html
pub async fn export(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    ctx: AuditContext,
    Path(kind): Path<String>,
    Query(params): Query<QueryParams>,
) -> Result<Response, ApiError> {
    let kind = guard_kind(&state, &user, &kind)?;
    let format = export_format(&params)?;
    let filter = scoped_filter(&user, &params)?;
    let page = state.store.list_records(kind, &filter)?;

    let mut table = Table::new(kind.title(), kind.columns());
    for record in &page.records {
        table.push_row(kind.cells(&record.value));
    }

    let response = download(&table, format, kind.as_str())?;
    audit::log_success(
        &state.audit,
        &ctx,
        Operation::Export,
        kind.as_str(),
        format.extension(),
    );
    Ok(response)
}
