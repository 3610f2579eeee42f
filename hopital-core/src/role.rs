use serde::{Deserialize, Serialize};
use std::fmt;

/// Staff role attached to a profile.
///
/// Stored as a plain string. Unknown values are kept (lower-cased) so that
/// rows written by other tools survive a round trip.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Role {
    Admin,
    Doctor,
    Nurse,
    Midwife,
    Pharmacist,
    Cashier,
    #[default]
    Receptionist,
    Other(String),
}

impl Role {
    /// Parse a role, accepting the French labels used by the front-end
    pub fn parse(value: &str) -> Self {
        let normalized = value.trim().to_lowercase();
        match normalized.as_str() {
            "admin" | "administrateur" | "administrator" => Role::Admin,
            "doctor" | "medecin" | "médecin" => Role::Doctor,
            "nurse" | "infirmier" | "infirmiere" | "infirmière" => Role::Nurse,
            "midwife" | "sage-femme" | "sage_femme" => Role::Midwife,
            "pharmacist" | "pharmacien" | "pharmacienne" => Role::Pharmacist,
            "cashier" | "caissier" | "caissiere" | "caissière" => Role::Cashier,
            "receptionist" | "receptionniste" | "réceptionniste" => Role::Receptionist,
            _ => Role::Other(normalized),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Role::Admin => "admin",
            Role::Doctor => "doctor",
            Role::Nurse => "nurse",
            Role::Midwife => "midwife",
            Role::Pharmacist => "pharmacist",
            Role::Cashier => "cashier",
            Role::Receptionist => "receptionist",
            Role::Other(s) => s,
        }
    }

    /// French display label
    pub fn label(&self) -> &str {
        match self {
            Role::Admin => "Administrateur",
            Role::Doctor => "Médecin",
            Role::Nurse => "Infirmier",
            Role::Midwife => "Sage-femme",
            Role::Pharmacist => "Pharmacien",
            Role::Cashier => "Caissier",
            Role::Receptionist => "Réceptionniste",
            Role::Other(s) => s,
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin)
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Role::Other(s) if s.is_empty())
    }
}

impl From<String> for Role {
    fn from(value: String) -> Self {
        Role::parse(&value)
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        role.as_str().to_string()
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_roles() {
        assert_eq!(Role::parse("admin"), Role::Admin);
        assert_eq!(Role::parse(" Doctor "), Role::Doctor);
        assert_eq!(Role::parse("Médecin"), Role::Doctor);
        assert_eq!(Role::parse("sage-femme"), Role::Midwife);
        assert_eq!(Role::parse("Infirmière"), Role::Nurse);
    }

    #[test]
    fn test_unknown_role_is_preserved() {
        let role = Role::parse("Laborantin");
        assert_eq!(role, Role::Other("laborantin".to_string()));
        assert_eq!(role.as_str(), "laborantin");
        assert!(!role.is_admin());
    }

    #[test]
    fn test_serde_as_string() {
        let json = serde_json::to_string(&Role::Pharmacist).unwrap();
        assert_eq!(json, "\"pharmacist\"");
        let role: Role = serde_json::from_str("\"caissier\"").unwrap();
        assert_eq!(role, Role::Cashier);
    }

    #[test]
    fn test_only_admin_is_admin() {
        assert!(Role::Admin.is_admin());
        assert!(!Role::Doctor.is_admin());
        assert!(!Role::Other("admin2".to_string()).is_admin());
    }

    #[test]
    fn test_empty_role() {
        assert!(Role::parse("  ").is_empty());
        assert!(!Role::Nurse.is_empty());
    }
}
