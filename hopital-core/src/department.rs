use serde::{Deserialize, Serialize};

/// Departments seeded into an empty database
pub const DEFAULT_DEPARTMENTS: &[&str] = &[
    "Maternité",
    "Médecine",
    "Pharmacie",
    "Consultation",
    "Caisse",
    "Comptabilité",
    "Laboratoire",
    "Urgences",
];

/// Organizational unit used to scope section access
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Department {
    pub department_id: i64,
    pub name: String,
}

/// Membership of a user in a department
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepartmentAssignment {
    pub assignment_id: String,
    pub user_id: String,
    pub department_id: i64,
    pub department_name: String,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
}

/// Fold a department name for comparison.
///
/// Lower-cases, strips French diacritics and collapses whitespace, so that
/// "Maternité", "maternite" and " MATERNITE " compare equal.
pub fn fold_name(name: &str) -> String {
    let folded: String = name
        .chars()
        .flat_map(char::to_lowercase)
        .map(|c| match c {
            'à' | 'â' | 'ä' => 'a',
            'é' | 'è' | 'ê' | 'ë' => 'e',
            'î' | 'ï' => 'i',
            'ô' | 'ö' => 'o',
            'ù' | 'û' | 'ü' => 'u',
            'ç' => 'c',
            'ÿ' => 'y',
            other => other,
        })
        .collect();
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// True if both names designate the same department
pub fn same_department(a: &str, b: &str) -> bool {
    fold_name(a) == fold_name(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fold_name_strips_accents_and_case() {
        assert_eq!(fold_name("Maternité"), "maternite");
        assert_eq!(fold_name("  COMPTABILITÉ "), "comptabilite");
        assert_eq!(fold_name("Médecine   interne"), "medecine interne");
    }

    #[test]
    fn test_same_department() {
        assert!(same_department("Maternité", "maternite"));
        assert!(same_department("Médecine", "MEDECINE"));
        assert!(!same_department("Médecine", "Maternité"));
    }

    #[test]
    fn test_default_departments_are_distinct() {
        let mut folded: Vec<String> = DEFAULT_DEPARTMENTS.iter().map(|d| fold_name(d)).collect();
        folded.sort();
        folded.dedup();
        assert_eq!(folded.len(), DEFAULT_DEPARTMENTS.len());
    }
}
