//! Self-service profile settings

use axum::{
    extract::{Request, State},
    response::Json,
};
use hopital_core::{Notice, Section, SettingsUpdate};
use hopital_store::{AuditEntry, Operation};
use serde::Deserialize;
use std::sync::Arc;

use super::{check_password, session::SessionView};
use crate::audit::{self, AuditContext};
use crate::auth::CurrentUser;
use crate::error::{read_json, ApiError};
use crate::guard::require_section;
use crate::password::{hash_password_async, verify_password_async};
use crate::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PasswordChange {
    current_password: String,
    new_password: String,
}

/// GET /settings
pub async fn read(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
) -> Result<Json<SessionView>, ApiError> {
    require_section(&state, &user, Section::Settings)?;
    Ok(Json(SessionView::new(&state, user.profile, user.departments)))
}

/// PATCH /settings
pub async fn update(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    ctx: AuditContext,
    request: Request,
) -> Result<Json<SessionView>, ApiError> {
    require_section(&state, &user, Section::Settings)?;
    let update: SettingsUpdate = read_json(request).await?;

    let profile = state.store.apply_settings(user.user_id(), &update)?;
    audit::log_success(&state.audit, &ctx, Operation::Update, "Profile", user.user_id());

    Ok(Json(SessionView::new(&state, profile, user.departments)))
}

/// PUT /settings/password
///
/// Every other session of the user is revoked, the current one survives.
pub async fn change_password(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    ctx: AuditContext,
    request: Request,
) -> Result<Json<Notice>, ApiError> {
    require_section(&state, &user, Section::Settings)?;
    let body: PasswordChange = read_json(request).await?;

    let stored = state
        .store
        .password_hash(user.user_id())?
        .ok_or_else(|| ApiError::not_found("Compte", user.user_id()))?;
    if !verify_password_async(body.current_password.clone(), Some(stored)).await? {
        audit::log_failure(
            &state.audit,
            &ctx,
            Operation::PasswordChange,
            "Profile",
            "current password mismatch",
        );
        return Err(ApiError::bad_request(
            "currentPassword",
            "Le mot de passe actuel est incorrect",
        ));
    }
    check_password(&body.new_password, "newPassword")?;

    let password_hash = hash_password_async(body.new_password.clone()).await?;
    state
        .store
        .set_password_hash(user.user_id(), &password_hash)?;
    let revoked = state
        .store
        .revoke_other_sessions(user.user_id(), &user.session_id)?;
    tracing::info!(user_id = %user.user_id(), revoked, "Password changed");
    audit::record(
        &state.audit,
        &ctx,
        AuditEntry::success(Operation::PasswordChange)
            .target("Profile", user.user_id())
            .detail(format!("{} other session(s) revoked", revoked)),
    );

    Ok(Json(Notice::success("Mot de passe mis à jour")))
}
