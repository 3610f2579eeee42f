//! Section access policy
//!
//! Every protected area of the application is a [`Section`]. Whether a
//! user may enter it depends on three things only: the user is signed in,
//! the profile is active, and either the role is `admin` or the section
//! rule accepts the user's departments.
//!
//! ```text
//!   no subject ──────────────► Denied(NotAuthenticated)  → /login
//!   inactive profile ────────► Denied(Inactive)          → /login
//!   admin ───────────────────► Granted
//!   rule AnyActive ──────────► Granted
//!   rule AdminOnly ──────────► Denied(AdminRequired)     → /unauthorized
//!   rule Departments(list) ──► Granted if one department matches,
//!                              else Denied(DepartmentRequired)
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::department::same_department;
use crate::error::{HopitalError, Result};
use crate::role::Role;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Section {
    Dashboard,
    Consultations,
    Medecine,
    Maternite,
    Transactions,
    Users,
    Departments,
    Settings,
}

impl Section {
    pub const ALL: [Section; 8] = [
        Section::Dashboard,
        Section::Consultations,
        Section::Medecine,
        Section::Maternite,
        Section::Transactions,
        Section::Users,
        Section::Departments,
        Section::Settings,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Section::Dashboard => "dashboard",
            Section::Consultations => "consultations",
            Section::Medecine => "medecine",
            Section::Maternite => "maternite",
            Section::Transactions => "transactions",
            Section::Users => "users",
            Section::Departments => "departments",
            Section::Settings => "settings",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|s| s.as_str().eq_ignore_ascii_case(value.trim()))
    }

    /// Front-end route of the section
    pub fn path(&self) -> String {
        format!("/{}", self.as_str())
    }

    pub fn label(&self) -> &'static str {
        match self {
            Section::Dashboard => "Tableau de bord",
            Section::Consultations => "Consultations",
            Section::Medecine => "Médecine",
            Section::Maternite => "Maternité",
            Section::Transactions => "Transactions",
            Section::Users => "Utilisateurs",
            Section::Departments => "Départements",
            Section::Settings => "Paramètres",
        }
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "departments", rename_all = "kebab-case")]
pub enum SectionRule {
    /// Any signed-in user with an active profile
    AnyActive,
    AdminOnly,
    /// Users assigned to at least one of these departments
    Departments(Vec<String>),
}

/// The caller as seen by the policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subject {
    pub user_id: String,
    pub role: Role,
    pub is_active: bool,
    pub departments: Vec<String>,
}

impl Subject {
    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }

    pub fn belongs_to(&self, department: &str) -> bool {
        self.departments.iter().any(|d| same_department(d, department))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Granted,
    Denied(DenyReason),
}

impl Decision {
    pub fn is_granted(&self) -> bool {
        matches!(self, Decision::Granted)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenyReason {
    NotAuthenticated,
    Inactive,
    AdminRequired,
    DepartmentRequired { allowed: Vec<String> },
}

impl DenyReason {
    /// Where the front-end should send the user
    pub fn redirect(&self) -> &'static str {
        match self {
            DenyReason::NotAuthenticated | DenyReason::Inactive => "/login",
            DenyReason::AdminRequired | DenyReason::DepartmentRequired { .. } => "/unauthorized",
        }
    }

    pub fn message(&self) -> String {
        match self {
            DenyReason::NotAuthenticated => "Veuillez vous connecter".to_string(),
            DenyReason::Inactive => {
                "Votre compte est désactivé. Contactez un administrateur.".to_string()
            }
            DenyReason::AdminRequired => "Accès réservé aux administrateurs".to_string(),
            DenyReason::DepartmentRequired { allowed } => format!(
                "Accès réservé aux départements : {}",
                allowed.join(", ")
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessPolicy {
    rules: BTreeMap<Section, SectionRule>,
}

impl Default for AccessPolicy {
    fn default() -> Self {
        let departments = |names: &[&str]| {
            SectionRule::Departments(names.iter().map(|n| n.to_string()).collect())
        };

        let mut rules = BTreeMap::new();
        rules.insert(Section::Dashboard, SectionRule::AnyActive);
        rules.insert(Section::Settings, SectionRule::AnyActive);
        rules.insert(Section::Users, SectionRule::AdminOnly);
        rules.insert(Section::Departments, SectionRule::AdminOnly);
        rules.insert(Section::Consultations, departments(&["Consultation", "Urgences"]));
        rules.insert(Section::Medecine, departments(&["Médecine"]));
        rules.insert(Section::Maternite, departments(&["Maternité"]));
        rules.insert(Section::Transactions, departments(&["Caisse", "Comptabilité"]));
        Self { rules }
    }
}

impl AccessPolicy {
    /// Replace department allow lists, keyed by section name.
    ///
    /// Admin-only sections cannot be opened to departments: `users` and
    /// `departments` are rejected, like unknown section names.
    pub fn with_department_overrides(
        mut self,
        overrides: &HashMap<String, Vec<String>>,
    ) -> Result<Self> {
        for (name, departments) in overrides {
            let section = Section::parse(name).ok_or_else(|| {
                HopitalError::validation("access.sections", format!("Section inconnue : {}", name))
            })?;
            if matches!(section, Section::Users | Section::Departments) {
                return Err(HopitalError::validation(
                    "access.sections",
                    format!("La section {} est réservée aux administrateurs", section),
                ));
            }
            let rule = if departments.is_empty() {
                SectionRule::AnyActive
            } else {
                SectionRule::Departments(departments.clone())
            };
            self.rules.insert(section, rule);
        }
        Ok(self)
    }

    pub fn rule(&self, section: Section) -> &SectionRule {
        static FALLBACK: SectionRule = SectionRule::AdminOnly;
        self.rules.get(&section).unwrap_or(&FALLBACK)
    }

    pub fn evaluate(&self, subject: Option<&Subject>, section: Section) -> Decision {
        let Some(subject) = subject else {
            return Decision::Denied(DenyReason::NotAuthenticated);
        };
        if !subject.is_active {
            return Decision::Denied(DenyReason::Inactive);
        }
        if subject.is_admin() {
            return Decision::Granted;
        }

        let decision = match self.rule(section) {
            SectionRule::AnyActive => Decision::Granted,
            SectionRule::AdminOnly => Decision::Denied(DenyReason::AdminRequired),
            SectionRule::Departments(allowed) => {
                if allowed.iter().any(|d| subject.belongs_to(d)) {
                    Decision::Granted
                } else {
                    Decision::Denied(DenyReason::DepartmentRequired {
                        allowed: allowed.clone(),
                    })
                }
            }
        };

        tracing::debug!(
            user_id = %subject.user_id,
            section = %section,
            granted = decision.is_granted(),
            "Access policy evaluated"
        );
        decision
    }

    /// Sections shown in the navigation menu of this user
    pub fn accessible_sections(&self, subject: &Subject) -> Vec<Section> {
        Section::ALL
            .into_iter()
            .filter(|s| self.evaluate(Some(subject), *s).is_granted())
            .collect()
    }
}

/// Records may be changed by their creator or by an administrator
pub fn can_modify_record(subject: &Subject, created_by: &str) -> bool {
    subject.is_active && (subject.is_admin() || subject.user_id == created_by)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subject(role: Role, departments: &[&str]) -> Subject {
        Subject {
            user_id: "u-1".to_string(),
            role,
            is_active: true,
            departments: departments.iter().map(|d| d.to_string()).collect(),
        }
    }

    #[test]
    fn test_anonymous_goes_to_login() {
        let policy = AccessPolicy::default();
        let decision = policy.evaluate(None, Section::Dashboard);
        assert_eq!(decision, Decision::Denied(DenyReason::NotAuthenticated));
        if let Decision::Denied(reason) = decision {
            assert_eq!(reason.redirect(), "/login");
        }
    }

    #[test]
    fn test_inactive_goes_to_login_even_for_admin() {
        let policy = AccessPolicy::default();
        let mut admin = subject(Role::Admin, &[]);
        admin.is_active = false;
        let decision = policy.evaluate(Some(&admin), Section::Dashboard);
        assert_eq!(decision, Decision::Denied(DenyReason::Inactive));
    }

    #[test]
    fn test_admin_is_granted_everywhere() {
        let policy = AccessPolicy::default();
        let admin = subject(Role::Admin, &[]);
        for section in Section::ALL {
            assert!(policy.evaluate(Some(&admin), section).is_granted(), "{section}");
        }
    }

    #[test]
    fn test_admin_only_sections() {
        let policy = AccessPolicy::default();
        let doctor = subject(Role::Doctor, &["Médecine"]);
        assert_eq!(
            policy.evaluate(Some(&doctor), Section::Users),
            Decision::Denied(DenyReason::AdminRequired)
        );
        assert_eq!(
            policy.evaluate(Some(&doctor), Section::Departments),
            Decision::Denied(DenyReason::AdminRequired)
        );
    }

    #[test]
    fn test_department_membership_matches_folded_names() {
        let policy = AccessPolicy::default();
        let midwife = subject(Role::Midwife, &["MATERNITE"]);
        assert!(policy.evaluate(Some(&midwife), Section::Maternite).is_granted());

        let decision = policy.evaluate(Some(&midwife), Section::Medecine);
        match decision {
            Decision::Denied(DenyReason::DepartmentRequired { allowed }) => {
                assert_eq!(allowed, vec!["Médecine".to_string()]);
            }
            other => panic!("unexpected decision: {other:?}"),
        }
    }

    #[test]
    fn test_any_active_sections() {
        let policy = AccessPolicy::default();
        let nurse = subject(Role::Nurse, &[]);
        assert!(policy.evaluate(Some(&nurse), Section::Dashboard).is_granted());
        assert!(policy.evaluate(Some(&nurse), Section::Settings).is_granted());
        assert!(!policy.evaluate(Some(&nurse), Section::Consultations).is_granted());
    }

    #[test]
    fn test_accessible_sections() {
        let policy = AccessPolicy::default();
        let cashier = subject(Role::Cashier, &["Caisse"]);
        assert_eq!(
            policy.accessible_sections(&cashier),
            vec![Section::Dashboard, Section::Transactions, Section::Settings]
        );
        let admin = subject(Role::Admin, &[]);
        assert_eq!(policy.accessible_sections(&admin).len(), Section::ALL.len());
    }

    #[test]
    fn test_overrides() {
        let mut overrides = HashMap::new();
        overrides.insert("transactions".to_string(), vec!["Pharmacie".to_string()]);
        overrides.insert("maternite".to_string(), Vec::new());
        let policy = AccessPolicy::default()
            .with_department_overrides(&overrides)
            .unwrap();

        let pharmacist = subject(Role::Pharmacist, &["Pharmacie"]);
        assert!(policy.evaluate(Some(&pharmacist), Section::Transactions).is_granted());
        assert!(policy.evaluate(Some(&pharmacist), Section::Maternite).is_granted());

        let cashier = subject(Role::Cashier, &["Caisse"]);
        assert!(!policy.evaluate(Some(&cashier), Section::Transactions).is_granted());
    }

    #[test]
    fn test_overrides_reject_unknown_and_admin_sections() {
        let mut unknown = HashMap::new();
        unknown.insert("pharmacy".to_string(), vec!["Pharmacie".to_string()]);
        assert!(AccessPolicy::default().with_department_overrides(&unknown).is_err());

        let mut users = HashMap::new();
        users.insert("users".to_string(), vec!["Caisse".to_string()]);
        assert!(AccessPolicy::default().with_department_overrides(&users).is_err());
    }

    #[test]
    fn test_can_modify_record() {
        let nurse = subject(Role::Nurse, &["Consultation"]);
        assert!(can_modify_record(&nurse, "u-1"));
        assert!(!can_modify_record(&nurse, "u-2"));

        let admin = subject(Role::Admin, &[]);
        assert!(can_modify_record(&admin, "u-2"));

        let mut inactive = nurse.clone();
        inactive.is_active = false;
        assert!(!can_modify_record(&inactive, "u-1"));
    }

    #[test]
    fn test_section_parse_and_path() {
        assert_eq!(Section::parse("Maternite"), Some(Section::Maternite));
        assert_eq!(Section::parse("unknown"), None);
        assert_eq!(Section::Users.path(), "/users");
    }
}
