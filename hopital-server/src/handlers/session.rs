//! Sign-up, sign-in, sign-out and password reset

use axum::{
    extract::{Request, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use hopital_core::{NewProfile, Notice, Profile, Role, Section, Subject};
use hopital_store::{AuditEntry, NewAccount, Operation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::check_password;
use crate::audit::{self, AuditContext};
use crate::auth::{start_session, CurrentUser};
use crate::error::{read_json, ApiError};
use crate::password::{
    format_reset_token, hash_password_async, random_secret, split_reset_token,
    verify_password_async,
};
use crate::AppState;

const BAD_CREDENTIALS: &str = "Email ou mot de passe incorrect";
const INVALID_RESET_LINK: &str = "Ce lien de réinitialisation est invalide ou a expiré";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignUpRequest {
    email: String,
    password: String,
    full_name: String,
    #[serde(default)]
    phone_number: Option<String>,
    #[serde(default)]
    role: Option<Role>,
    #[serde(default)]
    branch: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SignInRequest {
    email: String,
    password: String,
}

#[derive(Debug, Deserialize)]
struct ResetRequest {
    email: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResetPasswordRequest {
    token: String,
    new_password: String,
}

/// What the front-end needs to render its shell for a signed-in user
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub profile: Profile,
    pub departments: Vec<String>,
    pub sections: Vec<Section>,
    /// First accessible page, `/unauthorized` when there is none
    pub home: String,
}

impl SessionView {
    pub fn new(state: &AppState, profile: Profile, departments: Vec<String>) -> Self {
        let subject = Subject {
            user_id: profile.user_id.clone(),
            role: profile.role.clone(),
            is_active: profile.is_active,
            departments: departments.clone(),
        };
        let sections = state.policy.accessible_sections(&subject);
        let home = sections
            .first()
            .map(|s| s.path())
            .unwrap_or_else(|| "/unauthorized".to_string());
        Self {
            profile,
            departments,
            sections,
            home,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SignInResponse {
    token: String,
    expires_at: i64,
    #[serde(flatten)]
    session: SessionView,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SignUpResponse {
    profile: Profile,
    #[serde(flatten)]
    notice: Notice,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ResetRequested {
    #[serde(flatten)]
    notice: Notice,
    #[serde(skip_serializing_if = "Option::is_none")]
    reset_token: Option<String>,
}

/// POST /auth/sign-up
pub async fn sign_up(
    State(state): State<Arc<AppState>>,
    ctx: AuditContext,
    request: Request,
) -> Result<Response, ApiError> {
    if !state.config.auth.allow_sign_up {
        return Err(ApiError::forbidden(
            "Les inscriptions sont fermées. Contactez un administrateur.",
        ));
    }

    let body: SignUpRequest = read_json(request).await?;
    let role = body.role.unwrap_or_default();
    if role.is_admin() {
        return Err(ApiError::bad_request(
            "role",
            "Le rôle administrateur ne peut pas être choisi à l'inscription",
        ));
    }
    check_password(&body.password, "password")?;

    let new_profile = NewProfile {
        full_name: body.full_name,
        email: body.email,
        phone_number: body.phone_number,
        role,
        branch: body.branch,
        is_active: state.config.auth.auto_activate,
    }
    .normalize()?;

    let account = NewAccount {
        profile: new_profile,
        password_hash: hash_password_async(body.password.clone()).await?,
        departments: Vec::new(),
        created_by: None,
    };

    let created = match state.store.create_account(account) {
        Ok(created) => created,
        Err(e) => {
            audit::log_failure(&state.audit, &ctx, Operation::SignUp, "Profile", &e.to_string());
            return Err(e.into());
        }
    };
    audit::record(
        &state.audit,
        &ctx,
        AuditEntry::success(Operation::SignUp)
            .target("Profile", created.user_id.clone())
            .user(Some(&created.user_id)),
    );

    let message = if created.is_active {
        "Compte créé. Vous pouvez vous connecter."
    } else {
        "Compte créé. Un administrateur doit l'activer avant votre première connexion."
    };
    Ok((
        StatusCode::CREATED,
        Json(SignUpResponse {
            profile: created,
            notice: Notice::success(message),
        }),
    )
        .into_response())
}

/// POST /auth/sign-in
pub async fn sign_in(
    State(state): State<Arc<AppState>>,
    ctx: AuditContext,
    request: Request,
) -> Result<Response, ApiError> {
    let body: SignInRequest = read_json(request).await?;
    let email = body.email.trim().to_lowercase();

    let (user_id, hash) = match state.store.credential_by_email(&email)? {
        Some((user_id, hash)) => (Some(user_id), Some(hash)),
        None => (None, None),
    };
    let verified = verify_password_async(body.password.clone(), hash).await?;
    let user_id = match user_id {
        Some(user_id) if verified => user_id,
        _ => {
            audit::record(
                &state.audit,
                &ctx,
                AuditEntry::failure(Operation::SignIn, "invalid credentials")
                    .target_type("Session"),
            );
            return Err(ApiError::unauthorized(BAD_CREDENTIALS));
        }
    };

    // The credential alone is not enough: the profile must exist and be active
    let Some(profile) = state.store.get_profile(&user_id)? else {
        audit::record(
            &state.audit,
            &ctx,
            AuditEntry::failure(Operation::SignIn, "profile missing")
                .target_type("Session")
                .user(Some(&user_id)),
        );
        return Err(ApiError::unauthorized(
            "Aucun profil n'est associé à ce compte. Contactez un administrateur.",
        ));
    };
    if !profile.is_active {
        audit::record(
            &state.audit,
            &ctx,
            AuditEntry::failure(Operation::SignIn, "profile inactive")
                .target_type("Session")
                .user(Some(&user_id)),
        );
        return Err(ApiError::inactive());
    }

    let session = start_session(&state, &user_id)?;
    let departments = state.store.department_names_for_user(&user_id)?;
    audit::record(
        &state.audit,
        &ctx,
        AuditEntry::success(Operation::SignIn)
            .target("Session", session.session_id.clone())
            .user(Some(&user_id)),
    );

    Ok(Json(SignInResponse {
        token: session.token,
        expires_at: session.expires_at,
        session: SessionView::new(&state, profile, departments),
    })
    .into_response())
}

/// POST /auth/sign-out
pub async fn sign_out(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    ctx: AuditContext,
) -> Result<Json<Notice>, ApiError> {
    state.store.revoke_session(&user.session_id)?;
    audit::log_success(&state.audit, &ctx, Operation::SignOut, "Session", &user.session_id);
    Ok(Json(Notice::success("Vous êtes déconnecté")))
}

/// GET /auth/session
pub async fn session_info(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
) -> Json<SessionView> {
    Json(SessionView::new(&state, user.profile, user.departments))
}

/// POST /auth/password/reset-request
///
/// Answers 202 whether or not the address is known.
pub async fn request_password_reset(
    State(state): State<Arc<AppState>>,
    ctx: AuditContext,
    request: Request,
) -> Result<Response, ApiError> {
    let body: ResetRequest = read_json(request).await?;
    let email = body.email.trim().to_lowercase();

    let mut reset_token = None;
    if let Some((user_id, _)) = state.store.credential_by_email(&email)? {
        let secret = random_secret();
        let expires_at =
            chrono::Utc::now().timestamp() + state.config.auth.reset_token_ttl_minutes.max(1) * 60;
        let secret_hash = hash_password_async(secret.clone()).await?;
        let token_id = state
            .store
            .create_password_reset(&user_id, &secret_hash, expires_at)?;

        tracing::info!(user_id = %user_id, token_id = %token_id, "Password reset token issued");
        audit::record(
            &state.audit,
            &ctx,
            AuditEntry::success(Operation::PasswordResetRequest)
                .target("PasswordReset", token_id.clone())
                .user(Some(&user_id)),
        );
        if state.config.auth.expose_reset_tokens {
            reset_token = Some(format_reset_token(&token_id, &secret));
        }
    } else {
        hash_password_async(random_secret()).await?;
        tracing::debug!("Password reset requested for an unknown address");
    }

    Ok((
        StatusCode::ACCEPTED,
        Json(ResetRequested {
            notice: Notice::success(
                "Si un compte existe pour cette adresse, un lien de réinitialisation a été envoyé.",
            ),
            reset_token,
        }),
    )
        .into_response())
}

/// POST /auth/password/reset
pub async fn reset_password(
    State(state): State<Arc<AppState>>,
    ctx: AuditContext,
    request: Request,
) -> Result<Json<Notice>, ApiError> {
    let body: ResetPasswordRequest = read_json(request).await?;
    check_password(&body.new_password, "newPassword")?;

    let invalid = || ApiError::bad_request("token", INVALID_RESET_LINK);
    let (token_id, secret) = split_reset_token(&body.token).ok_or_else(invalid)?;
    let reset = state
        .store
        .find_password_reset(token_id)?
        .ok_or_else(invalid)?;

    let now = chrono::Utc::now().timestamp();
    let secret_ok =
        verify_password_async(secret.to_string(), Some(reset.secret_hash.clone())).await?;
    if reset.used || reset.expires_at <= now || !secret_ok {
        audit::record(
            &state.audit,
            &ctx,
            AuditEntry::failure(Operation::PasswordReset, "token rejected")
                .target("PasswordReset", token_id)
                .user(Some(&reset.user_id)),
        );
        return Err(invalid());
    }

    let password_hash = hash_password_async(body.new_password.clone()).await?;
    let user_id = state
        .store
        .complete_password_reset(token_id, &password_hash)
        .map_err(|e| match e {
            hopital_store::StoreError::Conflict(_) => invalid(),
            other => other.into(),
        })?;
    audit::record(
        &state.audit,
        &ctx,
        AuditEntry::success(Operation::PasswordReset)
            .target("PasswordReset", token_id)
            .user(Some(&user_id)),
    );

    Ok(Json(Notice::success(
        "Mot de passe mis à jour. Vous pouvez vous connecter.",
    )))
}
