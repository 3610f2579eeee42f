use hopital_core::{AccessPolicy, DEFAULT_DEPARTMENTS};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Server configuration loaded from YAML file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub server: ServerSettings,
    pub auth: AuthSettings,
    pub storage: StorageSettings,
    pub log: LogSettings,
    pub access: AccessSettings,
    /// Departments seeded at startup
    pub departments: Vec<String>,
    pub bootstrap: Option<BootstrapSettings>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    /// HS256 signing secret. A random one is generated per process when unset.
    pub jwt_secret: Option<String>,
    pub issuer: String,
    pub session_ttl_minutes: i64,
    pub reset_token_ttl_minutes: i64,
    pub allow_sign_up: bool,
    /// Profiles created by sign-up are active immediately
    pub auto_activate: bool,
    /// Return password reset tokens in the API response (no mailer configured)
    pub expose_reset_tokens: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub data_dir: PathBuf,
    pub database: String,
    pub audit_db: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessSettings {
    /// Department allow lists keyed by section name. An empty list opens the
    /// section to every active user.
    pub sections: HashMap<String, Vec<String>>,
}

/// Administrator account created at startup when none is active
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapSettings {
    pub email: String,
    pub password: String,
    #[serde(default = "default_admin_name")]
    pub full_name: String,
}

fn default_admin_name() -> String {
    "Administrateur".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            server: ServerSettings::default(),
            auth: AuthSettings::default(),
            storage: StorageSettings::default(),
            log: LogSettings::default(),
            access: AccessSettings::default(),
            departments: DEFAULT_DEPARTMENTS.iter().map(|d| d.to_string()).collect(),
            bootstrap: None,
        }
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            issuer: "hopital".to_string(),
            session_ttl_minutes: 480,
            reset_token_ttl_minutes: 60,
            allow_sign_up: true,
            auto_activate: false,
            expose_reset_tokens: false,
        }
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            database: "hopital.sqlite".to_string(),
            audit_db: "audit.sqlite".to_string(),
        }
    }
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

impl ServerConfig {
    /// Load configuration from a YAML file
    pub fn load_from_file(path: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        let config: ServerConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration with priority: env vars > config file > defaults
    pub fn load(config_path: Option<&str>) -> Result<Self, Box<dyn std::error::Error>> {
        let mut config = if let Some(path) = config_path {
            Self::load_from_file(path)?
        } else {
            Self::default()
        };
        config.apply_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// Apply `HOPITAL_*` overrides read through `lookup`
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(port) = lookup("HOPITAL_PORT")
            && let Ok(port_num) = port.parse()
        {
            self.server.port = port_num;
        }

        if let Some(host) = lookup("HOPITAL_HOST") {
            self.server.host = host;
        }

        if let Some(data_dir) = lookup("HOPITAL_DATA_DIR") {
            self.storage.data_dir = PathBuf::from(data_dir);
        }

        if let Some(secret) = lookup("HOPITAL_JWT_SECRET")
            && !secret.is_empty()
        {
            self.auth.jwt_secret = Some(secret);
        }

        if let Some(level) = lookup("HOPITAL_LOG_LEVEL") {
            self.log.level = level;
        }

        if let (Some(email), Some(password)) =
            (lookup("HOPITAL_ADMIN_EMAIL"), lookup("HOPITAL_ADMIN_PASSWORD"))
        {
            let full_name = self
                .bootstrap
                .as_ref()
                .map(|b| b.full_name.clone())
                .unwrap_or_else(default_admin_name);
            self.bootstrap = Some(BootstrapSettings {
                email,
                password,
                full_name,
            });
        }
    }

    /// Access policy with the configured department allow lists applied
    pub fn access_policy(&self) -> hopital_core::Result<AccessPolicy> {
        AccessPolicy::default().with_department_overrides(&self.access.sections)
    }

    /// Get the full path to the application database
    pub fn database_path(&self) -> PathBuf {
        self.storage.data_dir.join(&self.storage.database)
    }

    /// Get the full path to the audit database
    pub fn audit_db_path(&self) -> PathBuf {
        self.storage.data_dir.join(&self.storage.audit_db)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hopital_core::{Section, SectionRule};

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.auth.session_ttl_minutes, 480);
        assert!(config.auth.allow_sign_up);
        assert!(!config.auth.auto_activate);
        assert_eq!(config.departments.len(), DEFAULT_DEPARTMENTS.len());
        assert!(config.bootstrap.is_none());
    }

    #[test]
    fn test_db_paths() {
        let config = ServerConfig::default();
        assert_eq!(config.database_path(), PathBuf::from("data/hopital.sqlite"));
        assert_eq!(config.audit_db_path(), PathBuf::from("data/audit.sqlite"));
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = r#"
server:
  port: 9000
auth:
  auto_activate: true
log:
  format: json
access:
  sections:
    transactions: ["Caisse"]
    dashboard: []
"#;
        let config: ServerConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert!(config.auth.auto_activate);
        assert_eq!(config.auth.issuer, "hopital");
        assert_eq!(config.log.format, LogFormat::Json);

        let policy = config.access_policy().unwrap();
        assert_eq!(
            policy.rule(Section::Transactions),
            &SectionRule::Departments(vec!["Caisse".to_string()])
        );
        assert_eq!(policy.rule(Section::Dashboard), &SectionRule::AnyActive);
    }

    #[test]
    fn test_unknown_section_is_rejected() {
        let mut config = ServerConfig::default();
        config
            .access
            .sections
            .insert("pharmacie".to_string(), vec!["Pharmacie".to_string()]);
        assert!(config.access_policy().is_err());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("HOPITAL_PORT", "3000"),
            ("HOPITAL_DATA_DIR", "/tmp/hopital"),
            ("HOPITAL_JWT_SECRET", "s3cret"),
            ("HOPITAL_ADMIN_EMAIL", "admin@hopital.test"),
            ("HOPITAL_ADMIN_PASSWORD", "changez-moi"),
        ]
        .into_iter()
        .collect();

        let mut config = ServerConfig::default();
        config.apply_env(|name| env.get(name).map(|v| v.to_string()));

        assert_eq!(config.server.port, 3000);
        assert_eq!(config.storage.data_dir, PathBuf::from("/tmp/hopital"));
        assert_eq!(config.auth.jwt_secret.as_deref(), Some("s3cret"));
        let bootstrap = config.bootstrap.unwrap();
        assert_eq!(bootstrap.email, "admin@hopital.test");
        assert_eq!(bootstrap.full_name, "Administrateur");
    }

    #[test]
    fn test_invalid_port_env_ignored() {
        let mut config = ServerConfig::default();
        config.apply_env(|name| (name == "HOPITAL_PORT").then(|| "abc".to_string()));
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "server:\n  port: [unterminated\n").unwrap();
        assert!(ServerConfig::load(path.to_str()).is_err());

        let missing = dir.path().join("absent.yaml");
        assert!(ServerConfig::load(missing.to_str()).is_err());
    }
}
