pub mod departments;
pub mod health;
pub mod records;
pub mod session;
pub mod settings;
pub mod users;

use axum::{
    http::header,
    response::{IntoResponse, Response},
};
use chrono::{NaiveDate, Utc};
use hopital_core::{profile, ExportFormat, HopitalError, Table};
use std::collections::HashMap;

use crate::error::ApiError;

pub const DEFAULT_PER_PAGE: usize = 50;
pub const MAX_PER_PAGE: usize = 500;

/// Query string parameters, parsed by the handlers themselves so that bad
/// values come back as notices
pub type QueryParams = HashMap<String, String>;

/// Non-empty, trimmed query parameter
pub fn param<'a>(params: &'a QueryParams, name: &str) -> Option<&'a str> {
    params
        .get(name)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
}

#[allow(clippy::result_large_err)]
pub fn bool_param(params: &QueryParams, name: &str) -> Result<Option<bool>, ApiError> {
    match param(params, name) {
        None => Ok(None),
        Some("true") | Some("1") => Ok(Some(true)),
        Some("false") | Some("0") => Ok(Some(false)),
        Some(other) => Err(ApiError::bad_request(
            name,
            format!("Valeur invalide : {} (attendu true ou false)", other),
        )),
    }
}

#[allow(clippy::result_large_err)]
pub fn date_param(params: &QueryParams, name: &str) -> Result<Option<NaiveDate>, ApiError> {
    param(params, name)
        .map(|v| {
            NaiveDate::parse_from_str(v, "%Y-%m-%d").map_err(|_| {
                ApiError::bad_request(name, format!("Date invalide : {} (format AAAA-MM-JJ)", v))
            })
        })
        .transpose()
}

/// Page window requested by a list endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: usize,
    pub per_page: usize,
}

impl Pagination {
    #[allow(clippy::result_large_err)]
    pub fn from_params(params: &QueryParams) -> Result<Self, ApiError> {
        let number = |name: &str, default: usize| -> Result<usize, ApiError> {
            match param(params, name) {
                None => Ok(default),
                Some(v) => v
                    .parse::<usize>()
                    .map_err(|_| ApiError::bad_request(name, format!("Nombre invalide : {}", v))),
            }
        };
        let page = number("page", 1)?.max(1);
        let per_page = number("perPage", DEFAULT_PER_PAGE)?.clamp(1, MAX_PER_PAGE);
        Ok(Self { page, per_page })
    }

    /// Rows to skip, saturating at what SQLite can bind
    pub fn offset(&self) -> usize {
        (self.page - 1)
            .saturating_mul(self.per_page)
            .min(i64::MAX as usize)
    }

    pub fn total_pages(&self, total: i64) -> i64 {
        let per_page = self.per_page as i64;
        (total.max(0) + per_page - 1) / per_page
    }
}

/// Password policy check, reported against the request field that carried it
#[allow(clippy::result_large_err)]
pub fn check_password(password: &str, field: &str) -> Result<(), ApiError> {
    profile::validate_password(password).map_err(|e| match e {
        HopitalError::Validation { message, .. } => ApiError::bad_request(field, message),
        other => other.into(),
    })
}

/// `?format=` of an export endpoint, CSV when absent
#[allow(clippy::result_large_err)]
pub fn export_format(params: &QueryParams) -> Result<ExportFormat, ApiError> {
    match param(params, "format") {
        None => Ok(ExportFormat::Csv),
        Some(v) => ExportFormat::parse(v).ok_or_else(|| {
            ApiError::bad_request(
                "format",
                format!("Format d'export inconnu : {} (csv, xlsx ou html)", v),
            )
        }),
    }
}

/// Render a table as a file download
#[allow(clippy::result_large_err)]
pub fn download(table: &Table, format: ExportFormat, slug: &str) -> Result<Response, ApiError> {
    let now = Utc::now();
    let body = table.render(format, &now.format("%d/%m/%Y %H:%M").to_string())?;
    let filename = format!(
        "{}-{}.{}",
        slug,
        now.format("%Y%m%d_%H%M%S"),
        format.extension()
    );

    Ok((
        [
            (header::CONTENT_TYPE, format.content_type().to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        body,
    )
        .into_response())
}
