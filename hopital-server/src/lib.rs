//! hopital - hospital management back-end
//!
//! JSON API for staff accounts, department-scoped access and the
//! consultation, maternity and cash desk registers.

pub mod audit;
pub mod auth;
pub mod bootstrap;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod guard;
pub mod handlers;
pub mod password;

use axum::{
    http::Method,
    routing::{delete, get, post, put},
    Router,
};
use hopital_core::{AccessPolicy, HopitalError};
use hopital_store::{AuditLog, SqliteStore};
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::TraceLayer,
};

use handlers::{departments, health, records, session, settings, users};

/// Request bodies are small JSON documents
const BODY_LIMIT: usize = 2 * 1024 * 1024;

/// Application state
pub struct AppState {
    pub store: SqliteStore,
    pub audit: Arc<Mutex<AuditLog>>,
    pub config: config::ServerConfig,
    pub policy: AccessPolicy,
    pub keys: auth::SessionKeys,
}

impl AppState {
    /// Build state from configuration. Fails on an invalid access override.
    pub fn new(
        config: config::ServerConfig,
        store: SqliteStore,
        audit: AuditLog,
    ) -> Result<Self, HopitalError> {
        let policy = config.access_policy()?;
        let keys = auth::SessionKeys::from_settings(&config.auth);
        Ok(Self {
            store,
            audit: Arc::new(Mutex::new(audit)),
            config,
            policy,
            keys,
        })
    }
}

/// Build the application router with all routes and middleware
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health::health_check))
        // Authentication
        .route("/auth/sign-up", post(session::sign_up))
        .route("/auth/sign-in", post(session::sign_in))
        .route("/auth/sign-out", post(session::sign_out))
        .route("/auth/session", get(session::session_info))
        .route(
            "/auth/password/reset-request",
            post(session::request_password_reset),
        )
        .route("/auth/password/reset", post(session::reset_password))
        // Navigation
        .route("/access", get(guard::access_overview))
        .route("/access/{section}", get(guard::access_section))
        .route("/dashboard", get(dashboard::dashboard))
        // Registers (export must be before /{id} to avoid matching as {id})
        .route("/records/{kind}/export", get(records::export))
        .route("/records/{kind}", get(records::list).post(records::create))
        .route(
            "/records/{kind}/{id}",
            get(records::read)
                .put(records::update)
                .delete(records::delete),
        )
        // User management
        .route("/users/export", get(users::export))
        .route("/users", get(users::list).post(users::create))
        .route("/users/{id}", get(users::read).patch(users::update))
        .route("/users/{id}/toggle-active", post(users::toggle_active))
        .route("/users/{id}/departments", put(users::replace_departments))
        // Departments
        .route("/departments", get(departments::list))
        .route(
            "/departments/assignments",
            get(departments::list_assignments).post(departments::assign),
        )
        .route(
            "/departments/assignments/{id}",
            delete(departments::unassign),
        )
        // Settings
        .route("/settings", get(settings::read).patch(settings::update))
        .route("/settings/password", put(settings::change_password))
        // Middleware
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth::auth_middleware,
        ))
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
    };
    use http_body_util::BodyExt;
    use serde_json::Value;
    use tower::ServiceExt;

    fn test_state() -> Arc<AppState> {
        let store = SqliteStore::open(":memory:").unwrap();
        let audit = AuditLog::open(":memory:").unwrap();
        let mut config = config::ServerConfig::default();
        config.auth.jwt_secret = Some("test-secret".to_string());
        Arc::new(AppState::new(config, store, audit).unwrap())
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_is_public() {
        let app = build_router(test_state());
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn test_protected_route_requires_session() {
        let app = build_router(test_state());
        let response = app
            .oneshot(Request::get("/dashboard").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = json_body(response).await;
        assert_eq!(body["redirect"], "/login");
        assert_eq!(body["code"], "login");
    }

    #[tokio::test]
    async fn test_garbage_token_rejected() {
        let app = build_router(test_state());
        let response = app
            .oneshot(
                Request::get("/auth/session")
                    .header(header::AUTHORIZATION, "Bearer not-a-jwt")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_invalid_access_override_rejected() {
        let mut config = config::ServerConfig::default();
        config
            .access
            .sections
            .insert("users".to_string(), vec!["Caisse".to_string()]);
        let result = AppState::new(
            config,
            SqliteStore::open(":memory:").unwrap(),
            AuditLog::open(":memory:").unwrap(),
        );
        assert!(result.is_err());
    }
}
