//! Application-level user records
//!
//! A profile is distinct from the credential used to sign in: the
//! credential proves identity, the profile carries role, branch and the
//! active flag checked on every protected request.

use serde::{Deserialize, Serialize};

use crate::error::{HopitalError, Result};
use crate::role::Role;

pub const MIN_PASSWORD_LENGTH: usize = 8;
const MAX_NAME_LENGTH: usize = 120;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub user_id: String,
    pub full_name: String,
    pub email: String,
    pub phone_number: Option<String>,
    pub role: Role,
    pub branch: Option<String>,
    pub is_active: bool,
    pub created_at: String,
}

impl Profile {
    /// Column headers used by user exports
    pub const COLUMNS: &'static [&'static str] = &[
        "Nom complet",
        "Email",
        "Téléphone",
        "Rôle",
        "Antenne",
        "Statut",
        "Créé le",
    ];

    pub fn cells(&self) -> Vec<String> {
        vec![
            self.full_name.clone(),
            self.email.clone(),
            self.phone_number.clone().unwrap_or_default(),
            self.role.label().to_string(),
            self.branch.clone().unwrap_or_default(),
            if self.is_active { "Actif" } else { "Inactif" }.to_string(),
            self.created_at.clone(),
        ]
    }
}

/// Data needed to create a profile
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProfile {
    pub full_name: String,
    pub email: String,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub is_active: bool,
}

impl NewProfile {
    /// Validate and normalize in place
    pub fn normalize(mut self) -> Result<Self> {
        self.full_name = validate_full_name(&self.full_name)?;
        self.email = normalize_email(&self.email)?;
        self.phone_number = normalize_phone(self.phone_number.as_deref())?;
        self.branch = non_empty(self.branch.as_deref());
        if self.role.is_empty() {
            return Err(HopitalError::validation("role", "Le rôle est obligatoire"));
        }
        Ok(self)
    }
}

/// Fields an administrator may change on any profile
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    pub full_name: Option<String>,
    pub phone_number: Option<String>,
    pub role: Option<Role>,
    pub branch: Option<String>,
    pub is_active: Option<bool>,
}

impl ProfileUpdate {
    pub fn apply(&self, profile: &mut Profile) -> Result<()> {
        if let Some(ref name) = self.full_name {
            profile.full_name = validate_full_name(name)?;
        }
        if let Some(ref phone) = self.phone_number {
            profile.phone_number = normalize_phone(Some(phone))?;
        }
        if let Some(ref role) = self.role {
            if role.is_empty() {
                return Err(HopitalError::validation("role", "Le rôle est obligatoire"));
            }
            profile.role = role.clone();
        }
        if let Some(ref branch) = self.branch {
            profile.branch = non_empty(Some(branch));
        }
        if let Some(active) = self.is_active {
            profile.is_active = active;
        }
        Ok(())
    }

    /// True if applying this update would strip admin rights or deactivate
    pub fn revokes_admin(&self, profile: &Profile) -> bool {
        if !profile.role.is_admin() || !profile.is_active {
            return false;
        }
        self.is_active == Some(false) || self.role.as_ref().is_some_and(|r| !r.is_admin())
    }
}

/// Fields a user may change on their own profile from the settings page
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsUpdate {
    pub full_name: Option<String>,
    pub phone_number: Option<String>,
    pub branch: Option<String>,
}

impl SettingsUpdate {
    pub fn apply(&self, profile: &mut Profile) -> Result<()> {
        if let Some(ref name) = self.full_name {
            profile.full_name = validate_full_name(name)?;
        }
        if let Some(ref phone) = self.phone_number {
            profile.phone_number = normalize_phone(Some(phone))?;
        }
        if let Some(ref branch) = self.branch {
            profile.branch = non_empty(Some(branch));
        }
        Ok(())
    }
}

pub fn validate_full_name(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(HopitalError::validation(
            "fullName",
            "Le nom complet est obligatoire",
        ));
    }
    if name.chars().count() > MAX_NAME_LENGTH {
        return Err(HopitalError::validation(
            "fullName",
            format!("Le nom complet ne doit pas dépasser {} caractères", MAX_NAME_LENGTH),
        ));
    }
    Ok(name.to_string())
}

/// Trim, lower-case and check the shape of an email address
pub fn normalize_email(email: &str) -> Result<String> {
    let email = email.trim().to_lowercase();
    let invalid = || HopitalError::validation("email", "Adresse e-mail invalide");

    if email.is_empty() {
        return Err(HopitalError::validation("email", "L'adresse e-mail est obligatoire"));
    }
    if email.chars().any(char::is_whitespace) {
        return Err(invalid());
    }
    let (local, domain) = email.split_once('@').ok_or_else(invalid)?;
    if local.is_empty() || domain.contains('@') {
        return Err(invalid());
    }
    let dotted = domain
        .split('.')
        .collect::<Vec<_>>();
    if dotted.len() < 2 || dotted.iter().any(|part| part.is_empty()) {
        return Err(invalid());
    }
    Ok(email)
}

/// Validate an optional phone number. Empty input clears the value.
pub fn normalize_phone(phone: Option<&str>) -> Result<Option<String>> {
    let Some(phone) = non_empty(phone) else {
        return Ok(None);
    };
    let allowed = phone
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, ' ' | '+' | '-' | '(' | ')'));
    let digits = phone.chars().filter(char::is_ascii_digit).count();
    if !allowed || !(6..=15).contains(&digits) {
        return Err(HopitalError::validation(
            "phoneNumber",
            "Numéro de téléphone invalide",
        ));
    }
    Ok(Some(phone))
}

pub fn validate_password(password: &str) -> Result<()> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(HopitalError::validation(
            "password",
            format!(
                "Le mot de passe doit contenir au moins {} caractères",
                MIN_PASSWORD_LENGTH
            ),
        ));
    }
    Ok(())
}

pub(crate) fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
