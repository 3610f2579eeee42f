//! Password hashing and one-time reset tokens

use argon2::{
    password_hash::{PasswordHasher, SaltString},
    Argon2, PasswordHash, PasswordVerifier,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand_core::{OsRng, RngCore};
use std::sync::LazyLock;

use crate::error::ApiError;

const SECRET_BYTES: usize = 32;

/// Verified against when no account matches, so unknown addresses cost the
/// same argon2 work as known ones
static DECOY_HASH: LazyLock<Option<String>> =
    LazyLock::new(|| hash_password("decoy-password").ok());

pub fn hash_password(password: &str) -> Result<String, ApiError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| {
            tracing::error!(error = %e, "Password hashing failed");
            ApiError::internal("Impossible d'enregistrer le mot de passe")
        })
}

/// False for a wrong password and for an unreadable hash
pub fn verify_password(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            tracing::warn!(error = %e, "Stored password hash is unreadable");
            false
        }
    }
}

/// Verify against `hash`, or against the decoy hash when there is none
pub fn verify_or_decoy(password: &str, hash: Option<&str>) -> bool {
    match hash {
        Some(hash) => verify_password(password, hash),
        None => {
            if let Some(decoy) = DECOY_HASH.as_deref() {
                verify_password(password, decoy);
            }
            false
        }
    }
}

async fn off_runtime<T, F>(work: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    tokio::task::spawn_blocking(work).await.map_err(|e| {
        tracing::error!(error = %e, "Password task failed");
        ApiError::internal("Impossible de traiter le mot de passe")
    })
}

/// `hash_password` on the blocking pool
pub async fn hash_password_async(password: String) -> Result<String, ApiError> {
    off_runtime(move || hash_password(&password)).await?
}

/// `verify_or_decoy` on the blocking pool
pub async fn verify_password_async(password: String, hash: Option<String>) -> Result<bool, ApiError> {
    off_runtime(move || verify_or_decoy(&password, hash.as_deref())).await
}

/// Random URL-safe secret
pub fn random_secret() -> String {
    let mut bytes = [0u8; SECRET_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Reset tokens travel as `<token id>.<secret>`
pub fn format_reset_token(token_id: &str, secret: &str) -> String {
    format!("{}.{}", token_id, secret)
}

pub fn split_reset_token(token: &str) -> Option<(&str, &str)> {
    let (id, secret) = token.trim().split_once('.')?;
    (!id.is_empty() && !secret.is_empty()).then_some((id, secret))
}
