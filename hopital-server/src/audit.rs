use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::{request::Parts, Extensions};
use hopital_store::{AuditEntry, AuditLog, Operation};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::auth::CurrentUser;

/// Audit context extracted from HTTP request
#[derive(Debug, Clone)]
pub struct AuditContext {
    pub user_id: Option<String>,
    pub client_ip: String,
}

impl AuditContext {
    /// Create audit context without connection info (for testing)
    pub fn new(user_id: Option<String>, client_ip: String) -> Self {
        Self { user_id, client_ip }
    }

    pub fn from_extensions(extensions: &Extensions) -> Self {
        let user_id = extensions
            .get::<CurrentUser>()
            .map(|u| u.user_id().to_string());
        Self {
            user_id,
            client_ip: client_ip(extensions),
        }
    }
}

impl<S> FromRequestParts<S> for AuditContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::from_extensions(&parts.extensions))
    }
}

pub fn client_ip(extensions: &Extensions) -> String {
    extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Write an audit entry: a tracing event now, the database row in a spawned task
pub fn record(audit_log: &Arc<Mutex<AuditLog>>, context: &AuditContext, entry: AuditEntry) {
    let mut entry = entry.client_ip(Some(&context.client_ip));
    if entry.user_id.is_none() {
        entry.user_id = context.user_id.clone();
    }

    if entry.success {
        tracing::info!(
            user_id = entry.user_id.as_deref().unwrap_or("anonymous"),
            client_ip = %context.client_ip,
            operation = entry.operation.as_str(),
            target_type = entry.target_type.as_deref().unwrap_or("-"),
            target_id = entry.target_id.as_deref().unwrap_or("-"),
            status = "success",
            "Audit: {} {}",
            entry.operation.as_str(),
            entry.target_type.as_deref().unwrap_or("")
        );
    } else {
        tracing::warn!(
            user_id = entry.user_id.as_deref().unwrap_or("anonymous"),
            client_ip = %context.client_ip,
            operation = entry.operation.as_str(),
            target_type = entry.target_type.as_deref().unwrap_or("-"),
            target_id = entry.target_id.as_deref().unwrap_or("-"),
            status = "error",
            error = entry.detail.as_deref().unwrap_or(""),
            "Audit: {} failed",
            entry.operation.as_str()
        );
    }

    let audit_log = Arc::clone(audit_log);
    tokio::spawn(async move {
        let audit = audit_log.lock().await;
        if let Err(e) = audit.log(&entry) {
            tracing::error!("Failed to write audit log to database: {}", e);
        }
    });
}

/// Log a successful operation on a target
pub fn log_success(
    audit_log: &Arc<Mutex<AuditLog>>,
    context: &AuditContext,
    operation: Operation,
    target_type: &str,
    target_id: &str,
) {
    record(
        audit_log,
        context,
        AuditEntry::success(operation).target(target_type, target_id),
    );
}

/// Log a failed operation
pub fn log_failure(
    audit_log: &Arc<Mutex<AuditLog>>,
    context: &AuditContext,
    operation: Operation,
    target_type: &str,
    error: &str,
) {
    record(
        audit_log,
        context,
        AuditEntry::failure(operation, error).target_type(target_type),
    );
}

/// Log an authentication attempt
pub fn log_auth_attempt(client_ip: &str, user_id: Option<&str>, success: bool) {
    if success {
        tracing::debug!(
            user_id = user_id.unwrap_or("unknown"),
            client_ip = %client_ip,
            status = "success",
            "Audit: Authentication successful"
        );
    } else {
        tracing::warn!(
            client_ip = %client_ip,
            status = "failed",
            "Audit: Authentication failed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audit_context_creation() {
        let context = AuditContext::new(Some("user123".to_string()), "192.168.1.1".to_string());
        assert_eq!(context.user_id, Some("user123".to_string()));
        assert_eq!(context.client_ip, "192.168.1.1");
    }

    #[test]
    fn test_audit_context_from_empty_extensions() {
        let context = AuditContext::from_extensions(&Extensions::new());
        assert_eq!(context.user_id, None);
        assert_eq!(context.client_ip, "unknown");
    }

    #[test]
    fn test_client_ip_from_connect_info() {
        let mut extensions = Extensions::new();
        extensions.insert(ConnectInfo("10.0.0.7:5000".parse::<SocketAddr>().unwrap()));
        assert_eq!(client_ip(&extensions), "10.0.0.7");
    }

    #[tokio::test]
    async fn test_record_writes_row() {
        let audit_log = Arc::new(Mutex::new(AuditLog::open(":memory:").unwrap()));
        let context = AuditContext::new(Some("u-1".to_string()), "127.0.0.1".to_string());

        log_success(&audit_log, &context, Operation::Create, "consultations", "c-1");

        // The write happens in a spawned task
        let mut entries = Vec::new();
        for _ in 0..50 {
            entries = audit_log.lock().await.recent_entries(5).unwrap();
            if !entries.is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].user_id.as_deref(), Some("u-1"));
        assert_eq!(entries[0].target_id.as_deref(), Some("c-1"));
    }
}
