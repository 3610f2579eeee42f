use serde::{Deserialize, Serialize};

/// User-facing message returned with every error response.
///
/// Messages are written in French: they are shown verbatim in the
/// front-end toasts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notice {
    pub level: NoticeLevel,
    pub code: NoticeCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Error,
    Info,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum NoticeCode {
    Invalid,
    Login,
    Inactive,
    Forbidden,
    NotFound,
    Conflict,
    Exception,
    Informational,
}

impl Notice {
    pub fn new(level: NoticeLevel, code: NoticeCode, message: impl Into<String>) -> Self {
        Self {
            level,
            code,
            message: message.into(),
            field: None,
            redirect: None,
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Info, NoticeCode::Informational, message)
    }

    pub fn error(code: NoticeCode, message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Error, code, message)
    }

    /// Not found error for a named entity
    pub fn not_found(kind: &str, id: &str) -> Self {
        Self::error(NoticeCode::NotFound, format!("{} introuvable : {}", kind, id))
    }

    /// Missing or invalid session; the client goes back to the login page
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::error(NoticeCode::Login, message).with_redirect("/login")
    }

    /// Authenticated but the profile is deactivated
    pub fn inactive() -> Self {
        Self::error(
            NoticeCode::Inactive,
            "Votre compte est désactivé. Contactez un administrateur.",
        )
        .with_redirect("/login")
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::error(NoticeCode::Forbidden, message).with_redirect("/unauthorized")
    }

    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::error(NoticeCode::Invalid, message).with_field(field)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::error(NoticeCode::Conflict, message)
    }

    pub fn storage_error(message: impl Into<String>) -> Self {
        Self::error(NoticeCode::Exception, message)
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn with_redirect(mut self, path: impl Into<String>) -> Self {
        self.redirect = Some(path.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notice_serialization() {
        let notice = Notice::not_found("Consultation", "c-1");
        let json = serde_json::to_value(&notice).unwrap();
        assert_eq!(json["level"], "error");
        assert_eq!(json["code"], "not-found");
        assert_eq!(json["message"], "Consultation introuvable : c-1");
        assert!(json.get("field").is_none());
        assert!(json.get("redirect").is_none());
    }

    #[test]
    fn test_unauthorized_redirects_to_login() {
        let notice = Notice::unauthorized("Session expirée");
        assert_eq!(notice.code, NoticeCode::Login);
        assert_eq!(notice.redirect.as_deref(), Some("/login"));
    }

    #[test]
    fn test_forbidden_redirects_to_unauthorized() {
        let notice = Notice::forbidden("Accès refusé");
        assert_eq!(notice.code, NoticeCode::Forbidden);
        assert_eq!(notice.redirect.as_deref(), Some("/unauthorized"));
    }

    #[test]
    fn test_success_level() {
        let notice = Notice::success("Profil mis à jour");
        assert_eq!(notice.level, NoticeLevel::Info);
        assert_eq!(notice.code, NoticeCode::Informational);
    }
}
