//! HTTP error type
//!
//! Every failure leaves the server as a status code and a [`Notice`] body.

use axum::{
    extract::Request,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use http_body_util::BodyExt;
use hopital_core::{DenyReason, HopitalError, Notice};
use hopital_store::StoreError;
use serde::de::DeserializeOwned;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub notice: Notice,
}

impl ApiError {
    pub fn new(status: StatusCode, notice: Notice) -> Self {
        Self { status, notice }
    }

    pub fn bad_request(field: &str, message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, Notice::validation(field, message))
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, Notice::unauthorized(message))
    }

    pub fn inactive() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, Notice::inactive())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, Notice::forbidden(message))
    }

    pub fn not_found(kind: &str, id: &str) -> Self {
        Self::new(StatusCode::NOT_FOUND, Notice::not_found(kind, id))
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, Notice::conflict(message))
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            Notice::storage_error(message),
        )
    }

    /// Map a policy denial to 401 or 403
    pub fn denied(reason: &DenyReason) -> Self {
        match reason {
            DenyReason::NotAuthenticated => Self::unauthorized(reason.message()),
            DenyReason::Inactive => Self::inactive(),
            DenyReason::AdminRequired | DenyReason::DepartmentRequired { .. } => {
                Self::forbidden(reason.message())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.notice)).into_response()
    }
}

impl From<HopitalError> for ApiError {
    fn from(err: HopitalError) -> Self {
        match err {
            HopitalError::Validation { field, message } => Self::bad_request(&field, message),
            HopitalError::InvalidJson(e) => {
                Self::bad_request("body", format!("JSON invalide : {}", e))
            }
            HopitalError::Export(message) => {
                tracing::error!(error = %message, "Export failed");
                Self::internal("La génération de l'export a échoué")
            }
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { kind, id } => Self::not_found(&kind, &id),
            StoreError::Conflict(message) => Self::conflict(message),
            StoreError::Domain(e) => e.into(),
            other => {
                tracing::error!(error = %other, "Storage error");
                Self::internal("Une erreur interne est survenue. Veuillez réessayer.")
            }
        }
    }
}

/// Read and deserialize a JSON request body
pub async fn read_json<T: DeserializeOwned>(request: Request) -> Result<T, ApiError> {
    let bytes = request
        .into_body()
        .collect()
        .await
        .map_err(|e| ApiError::bad_request("body", format!("Requête illisible : {}", e)))?
        .to_bytes();

    if bytes.is_empty() {
        return Err(ApiError::bad_request("body", "Le corps de la requête est vide"));
    }

    serde_json::from_slice(&bytes)
        .map_err(|e| ApiError::bad_request("body", format!("Données invalides : {}", e)))
}
