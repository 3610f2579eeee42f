//! Session tokens and the authentication middleware
//!
//! A session is an HS256 JWT whose `sid` claim points at a row of the
//! `sessions` table. Both must be valid: the signature and expiry are
//! checked first, then the row must exist, belong to `sub` and not be
//! revoked. Sign-out and password changes revoke rows, so a stolen token
//! stops working without waiting for expiry.

use axum::{
    body::Body,
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, Method},
    middleware::Next,
    response::Response,
};
use hopital_core::{Profile, Subject};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::{audit, config::AuthSettings, error::ApiError, password, AppState};

/// Paths reachable without a session
const PUBLIC_PATHS: &[&str] = &[
    "/health",
    "/auth/sign-up",
    "/auth/sign-in",
    "/auth/password/reset-request",
    "/auth/password/reset",
];

const SIGN_IN_REQUIRED: &str = "Veuillez vous connecter";
const SESSION_EXPIRED: &str = "Votre session a expiré. Veuillez vous reconnecter.";

/// JWT claims structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: String,
    pub sid: String,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
}

/// Signing material for session tokens
pub struct SessionKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    ttl_seconds: i64,
}

impl SessionKeys {
    pub fn new(secret: &str, issuer: &str, ttl_minutes: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            issuer: issuer.to_string(),
            ttl_seconds: ttl_minutes.max(1) * 60,
        }
    }

    /// Keys from configuration, with a per-process random secret when none is set
    pub fn from_settings(settings: &AuthSettings) -> Self {
        let secret = match settings.jwt_secret.as_deref() {
            Some(secret) if !secret.is_empty() => secret.to_string(),
            _ => {
                tracing::warn!(
                    "No JWT secret configured, using a random one: sessions will not survive a restart"
                );
                password::random_secret()
            }
        };
        Self::new(&secret, &settings.issuer, settings.session_ttl_minutes)
    }

    pub fn ttl_seconds(&self) -> i64 {
        self.ttl_seconds
    }

    pub fn encode(&self, claims: &SessionClaims) -> Result<String, ApiError> {
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), claims, &self.encoding).map_err(|e| {
            tracing::error!(error = %e, "Failed to sign session token");
            ApiError::internal("Impossible d'ouvrir la session")
        })
    }

    pub fn decode(&self, token: &str) -> Result<SessionClaims, ApiError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);

        jsonwebtoken::decode::<SessionClaims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!(error = %e, "Rejected session token");
                ApiError::unauthorized(SESSION_EXPIRED)
            })
    }
}

/// A freshly opened session
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedSession {
    pub token: String,
    #[serde(skip)]
    pub session_id: String,
    pub expires_at: i64,
}

/// Create the session row and sign its token
pub fn start_session(state: &AppState, user_id: &str) -> Result<IssuedSession, ApiError> {
    let now = chrono::Utc::now().timestamp();
    let expires_at = now + state.keys.ttl_seconds();
    let session_id = state.store.create_session(user_id, now, expires_at)?;

    let token = state.keys.encode(&SessionClaims {
        sub: user_id.to_string(),
        sid: session_id.clone(),
        iss: state.config.auth.issuer.clone(),
        iat: now,
        exp: expires_at,
    })?;

    Ok(IssuedSession {
        token,
        session_id,
        expires_at,
    })
}

/// The signed-in caller, attached to the request by [`auth_middleware`]
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub profile: Profile,
    pub departments: Vec<String>,
    pub session_id: String,
}

impl CurrentUser {
    pub fn user_id(&self) -> &str {
        &self.profile.user_id
    }

    pub fn is_admin(&self) -> bool {
        self.profile.role.is_admin()
    }

    pub fn subject(&self) -> Subject {
        Subject {
            user_id: self.profile.user_id.clone(),
            role: self.profile.role.clone(),
            is_active: self.profile.is_active,
            departments: self.departments.clone(),
        }
    }
}

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentUser>()
            .cloned()
            .ok_or_else(|| ApiError::unauthorized(SIGN_IN_REQUIRED))
    }
}

pub fn is_public_path(path: &str) -> bool {
    PUBLIC_PATHS.contains(&path.trim_end_matches('/'))
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Resolve a session token to the caller.
///
/// token → live session row → profile exists → profile active → departments
#[allow(clippy::result_large_err)]
pub fn authenticate(state: &AppState, token: &str) -> Result<CurrentUser, ApiError> {
    let claims = state.keys.decode(token)?;

    let now = chrono::Utc::now().timestamp();
    if !state.store.session_is_active(&claims.sid, &claims.sub, now)? {
        return Err(ApiError::unauthorized(SESSION_EXPIRED));
    }

    let profile = state
        .store
        .get_profile(&claims.sub)?
        .ok_or_else(|| ApiError::unauthorized("Profil introuvable. Veuillez vous reconnecter."))?;
    if !profile.is_active {
        return Err(ApiError::inactive());
    }

    let departments = state.store.department_names_for_user(&profile.user_id)?;
    Ok(CurrentUser {
        profile,
        departments,
        session_id: claims.sid,
    })
}

/// Authentication middleware
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    if request.method() == Method::OPTIONS || is_public_path(request.uri().path()) {
        return Ok(next.run(request).await);
    }

    let client_ip = audit::client_ip(request.extensions());
    let Some(token) = bearer_token(request.headers()) else {
        audit::log_auth_attempt(&client_ip, None, false);
        return Err(ApiError::unauthorized(SIGN_IN_REQUIRED));
    };

    let current = match authenticate(&state, token) {
        Ok(current) => current,
        Err(err) => {
            audit::log_auth_attempt(&client_ip, None, false);
            return Err(err);
        }
    };
    audit::log_auth_attempt(&client_ip, Some(current.user_id()), true);

    request.extensions_mut().insert(current);
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn claims(exp: i64) -> SessionClaims {
        SessionClaims {
            sub: "u-1".to_string(),
            sid: "s-1".to_string(),
            iss: "hopital".to_string(),
            iat: 0,
            exp,
        }
    }

    #[test]
    fn test_token_round_trip() {
        let keys = SessionKeys::new("secret", "hopital", 60);
        let exp = chrono::Utc::now().timestamp() + 3600;
        let token = keys.encode(&claims(exp)).unwrap();
        assert_eq!(keys.decode(&token).unwrap(), claims(exp));
    }

    #[test]
    fn test_expired_token_rejected() {
        let keys = SessionKeys::new("secret", "hopital", 60);
        let token = keys.encode(&claims(1_000)).unwrap();
        let err = keys.decode(&token).unwrap_err();
        assert_eq!(err.status, axum::http::StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_wrong_secret_or_issuer_rejected() {
        let exp = chrono::Utc::now().timestamp() + 3600;
        let token = SessionKeys::new("secret", "hopital", 60)
            .encode(&claims(exp))
            .unwrap();
        assert!(SessionKeys::new("other", "hopital", 60).decode(&token).is_err());
        assert!(SessionKeys::new("secret", "ailleurs", 60).decode(&token).is_err());
    }

    #[test]
    fn test_ttl_floor() {
        assert_eq!(SessionKeys::new("s", "i", 0).ttl_seconds(), 60);
        assert_eq!(SessionKeys::new("s", "i", 480).ttl_seconds(), 480 * 60);
    }

    #[test]
    fn test_public_paths() {
        assert!(is_public_path("/health"));
        assert!(is_public_path("/auth/sign-in"));
        assert!(is_public_path("/auth/sign-in/"));
        assert!(!is_public_path("/auth/session"));
        assert!(!is_public_path("/records/consultations"));
    }

    #[test]
    fn test_bearer_token() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer  tok "));
        assert_eq!(bearer_token(&headers), Some("tok"));
    }
}
