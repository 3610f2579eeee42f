//! Medical and financial records
//!
//! Records travel as JSON objects. Each kind has a typed body used to
//! validate and normalize the payload before it is stored, and to render
//! table cells for exports.

use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::access::Section;
use crate::error::{HopitalError, Result};
use crate::profile::non_empty;

const MAX_AGE: u32 = 150;
const MAX_NEWBORNS: u8 = 10;
/// Upper bound on any amount, in the smallest currency unit
pub const MAX_AMOUNT: i64 = 1_000_000_000_000;

/// Serialized as its URL segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "&'static str")]
pub enum RecordKind {
    Consultation,
    MedecineConsultation,
    MaternityHospitalization,
    Transaction,
}

impl TryFrom<String> for RecordKind {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| format!("unknown record kind: {}", value))
    }
}

impl From<RecordKind> for &'static str {
    fn from(kind: RecordKind) -> Self {
        kind.as_str()
    }
}

/// A validated record body and the business date it is filed under
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRecord {
    pub value: Value,
    pub record_date: NaiveDate,
}

impl RecordKind {
    pub const ALL: [RecordKind; 4] = [
        RecordKind::Consultation,
        RecordKind::MedecineConsultation,
        RecordKind::MaternityHospitalization,
        RecordKind::Transaction,
    ];

    /// URL segment and storage key
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Consultation => "consultations",
            RecordKind::MedecineConsultation => "medecine-consultations",
            RecordKind::MaternityHospitalization => "maternity-hospitalizations",
            RecordKind::Transaction => "transactions",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == value)
    }

    pub fn section(&self) -> Section {
        match self {
            RecordKind::Consultation => Section::Consultations,
            RecordKind::MedecineConsultation => Section::Medecine,
            RecordKind::MaternityHospitalization => Section::Maternite,
            RecordKind::Transaction => Section::Transactions,
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            RecordKind::Consultation => "Consultations",
            RecordKind::MedecineConsultation => "Consultations de médecine",
            RecordKind::MaternityHospitalization => "Hospitalisations maternité",
            RecordKind::Transaction => "Transactions financières",
        }
    }

    /// Singular label used in messages
    pub fn label(&self) -> &'static str {
        match self {
            RecordKind::Consultation => "Consultation",
            RecordKind::MedecineConsultation => "Consultation de médecine",
            RecordKind::MaternityHospitalization => "Hospitalisation",
            RecordKind::Transaction => "Transaction",
        }
    }

    pub fn normalize(&self, body: Value) -> Result<NormalizedRecord> {
        match self {
            RecordKind::Consultation => normalize_as::<Consultation>(body),
            RecordKind::MedecineConsultation => normalize_as::<MedecineConsultation>(body),
            RecordKind::MaternityHospitalization => normalize_as::<MaternityHospitalization>(body),
            RecordKind::Transaction => normalize_as::<FinancialTransaction>(body),
        }
    }

    pub fn columns(&self) -> &'static [&'static str] {
        match self {
            RecordKind::Consultation => Consultation::COLUMNS,
            RecordKind::MedecineConsultation => MedecineConsultation::COLUMNS,
            RecordKind::MaternityHospitalization => MaternityHospitalization::COLUMNS,
            RecordKind::Transaction => FinancialTransaction::COLUMNS,
        }
    }

    /// Table cells for a stored body. Bodies that no longer parse yield
    /// empty cells rather than failing the whole export.
    pub fn cells(&self, value: &Value) -> Vec<String> {
        let cells = match self {
            RecordKind::Consultation => cells_as::<Consultation>(value),
            RecordKind::MedecineConsultation => cells_as::<MedecineConsultation>(value),
            RecordKind::MaternityHospitalization => cells_as::<MaternityHospitalization>(value),
            RecordKind::Transaction => cells_as::<FinancialTransaction>(value),
        };
        cells.unwrap_or_else(|| vec![String::new(); self.columns().len()])
    }
}

/// Behaviour shared by every typed record body
pub trait RecordBody: Serialize + DeserializeOwned {
    const COLUMNS: &'static [&'static str];

    /// Check business rules, trimming free text along the way
    fn validate(&mut self) -> Result<()>;

    fn record_date(&self) -> NaiveDate;

    fn cells(&self) -> Vec<String>;
}

fn normalize_as<T: RecordBody>(body: Value) -> Result<NormalizedRecord> {
    if !body.is_object() {
        return Err(HopitalError::validation("body", "Le contenu doit être un objet JSON"));
    }
    let mut record: T = serde_json::from_value(body)
        .map_err(|e| HopitalError::validation("body", format!("Données invalides : {}", e)))?;
    record.validate()?;
    Ok(NormalizedRecord {
        record_date: record.record_date(),
        value: serde_json::to_value(&record)?,
    })
}

fn cells_as<T: RecordBody>(value: &Value) -> Option<Vec<String>> {
    serde_json::from_value::<T>(value.clone())
        .ok()
        .map(|record| record.cells())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sex {
    Female,
    Male,
}

impl Sex {
    pub fn label(&self) -> &'static str {
        match self {
            Sex::Female => "Féminin",
            Sex::Male => "Masculin",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Income,
    Expense,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Income => "income",
            TransactionKind::Expense => "expense",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TransactionKind::Income => "Recette",
            TransactionKind::Expense => "Dépense",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PaymentMethod {
    Cash,
    MobileMoney,
    Card,
    Transfer,
    Insurance,
}

impl PaymentMethod {
    pub fn label(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "Espèces",
            PaymentMethod::MobileMoney => "Mobile money",
            PaymentMethod::Card => "Carte",
            PaymentMethod::Transfer => "Virement",
            PaymentMethod::Insurance => "Assurance",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Consultation {
    pub patient_name: String,
    #[serde(default)]
    pub patient_age: Option<u32>,
    #[serde(default)]
    pub patient_sex: Option<Sex>,
    pub reason: String,
    #[serde(default)]
    pub diagnosis: Option<String>,
    #[serde(default)]
    pub treatment: Option<String>,
    pub consultation_date: NaiveDate,
    #[serde(default)]
    pub fee: Option<i64>,
}

impl RecordBody for Consultation {
    const COLUMNS: &'static [&'static str] = &[
        "Date",
        "Patient",
        "Âge",
        "Sexe",
        "Motif",
        "Diagnostic",
        "Traitement",
        "Montant",
    ];

    fn validate(&mut self) -> Result<()> {
        self.patient_name = required_text("patientName", &self.patient_name, "Le nom du patient")?;
        self.reason = required_text("reason", &self.reason, "Le motif de consultation")?;
        self.diagnosis = non_empty(self.diagnosis.as_deref());
        self.treatment = non_empty(self.treatment.as_deref());
        check_age(self.patient_age)?;
        if self.fee.is_some_and(|fee| fee < 0) {
            return Err(HopitalError::validation("fee", "Le montant ne peut pas être négatif"));
        }
        check_amount_cap("fee", self.fee)?;
        Ok(())
    }

    fn record_date(&self) -> NaiveDate {
        self.consultation_date
    }

    fn cells(&self) -> Vec<String> {
        vec![
            self.consultation_date.to_string(),
            self.patient_name.clone(),
            display_opt(self.patient_age),
            self.patient_sex.map(|s| s.label().to_string()).unwrap_or_default(),
            self.reason.clone(),
            self.diagnosis.clone().unwrap_or_default(),
            self.treatment.clone().unwrap_or_default(),
            display_opt(self.fee),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MedecineConsultation {
    pub patient_name: String,
    #[serde(default)]
    pub patient_age: Option<u32>,
    #[serde(default)]
    pub patient_sex: Option<Sex>,
    pub symptoms: String,
    #[serde(default)]
    pub diagnosis: Option<String>,
    #[serde(default)]
    pub prescription: Option<String>,
    pub consultation_date: NaiveDate,
    #[serde(default)]
    pub ward: Option<String>,
}

impl RecordBody for MedecineConsultation {
    const COLUMNS: &'static [&'static str] = &[
        "Date",
        "Patient",
        "Âge",
        "Sexe",
        "Symptômes",
        "Diagnostic",
        "Prescription",
        "Salle",
    ];

    fn validate(&mut self) -> Result<()> {
        self.patient_name = required_text("patientName", &self.patient_name, "Le nom du patient")?;
        self.symptoms = required_text("symptoms", &self.symptoms, "Les symptômes")?;
        self.diagnosis = non_empty(self.diagnosis.as_deref());
        self.prescription = non_empty(self.prescription.as_deref());
        self.ward = non_empty(self.ward.as_deref());
        check_age(self.patient_age)
    }

    fn record_date(&self) -> NaiveDate {
        self.consultation_date
    }

    fn cells(&self) -> Vec<String> {
        vec![
            self.consultation_date.to_string(),
            self.patient_name.clone(),
            display_opt(self.patient_age),
            self.patient_sex.map(|s| s.label().to_string()).unwrap_or_default(),
            self.symptoms.clone(),
            self.diagnosis.clone().unwrap_or_default(),
            self.prescription.clone().unwrap_or_default(),
            self.ward.clone().unwrap_or_default(),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaternityHospitalization {
    pub patient_name: String,
    #[serde(default)]
    pub patient_age: Option<u32>,
    pub admission_date: NaiveDate,
    #[serde(default)]
    pub discharge_date: Option<NaiveDate>,
    #[serde(default)]
    pub room: Option<String>,
    #[serde(default)]
    pub delivery_type: Option<String>,
    #[serde(default)]
    pub newborn_count: Option<u8>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl RecordBody for MaternityHospitalization {
    const COLUMNS: &'static [&'static str] = &[
        "Admission",
        "Sortie",
        "Patiente",
        "Âge",
        "Chambre",
        "Type d'accouchement",
        "Nouveau-nés",
        "Notes",
    ];

    fn validate(&mut self) -> Result<()> {
        self.patient_name = required_text("patientName", &self.patient_name, "Le nom de la patiente")?;
        self.room = non_empty(self.room.as_deref());
        self.delivery_type = non_empty(self.delivery_type.as_deref());
        self.notes = non_empty(self.notes.as_deref());
        check_age(self.patient_age)?;
        if let Some(discharge) = self.discharge_date
            && discharge < self.admission_date
        {
            return Err(HopitalError::validation(
                "dischargeDate",
                "La date de sortie ne peut pas précéder la date d'admission",
            ));
        }
        if self.newborn_count.is_some_and(|n| n > MAX_NEWBORNS) {
            return Err(HopitalError::validation(
                "newbornCount",
                "Nombre de nouveau-nés invalide",
            ));
        }
        Ok(())
    }

    fn record_date(&self) -> NaiveDate {
        self.admission_date
    }

    fn cells(&self) -> Vec<String> {
        vec![
            self.admission_date.to_string(),
            display_opt(self.discharge_date),
            self.patient_name.clone(),
            display_opt(self.patient_age),
            self.room.clone().unwrap_or_default(),
            self.delivery_type.clone().unwrap_or_default(),
            display_opt(self.newborn_count),
            self.notes.clone().unwrap_or_default(),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinancialTransaction {
    pub kind: TransactionKind,
    /// Amount in the smallest currency unit
    pub amount: i64,
    pub label: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub payment_method: Option<PaymentMethod>,
    pub transaction_date: NaiveDate,
}

impl RecordBody for FinancialTransaction {
    const COLUMNS: &'static [&'static str] = &[
        "Date",
        "Type",
        "Libellé",
        "Catégorie",
        "Mode de paiement",
        "Montant",
    ];

    fn validate(&mut self) -> Result<()> {
        self.label = required_text("label", &self.label, "Le libellé")?;
        self.category = non_empty(self.category.as_deref());
        if self.amount <= 0 {
            return Err(HopitalError::validation(
                "amount",
                "Le montant doit être strictement positif",
            ));
        }
        check_amount_cap("amount", Some(self.amount))?;
        Ok(())
    }

    fn record_date(&self) -> NaiveDate {
        self.transaction_date
    }

    fn cells(&self) -> Vec<String> {
        vec![
            self.transaction_date.to_string(),
            self.kind.label().to_string(),
            self.label.clone(),
            self.category.clone().unwrap_or_default(),
            self.payment_method.map(|m| m.label().to_string()).unwrap_or_default(),
            self.amount.to_string(),
        ]
    }
}

fn required_text(field: &str, value: &str, what: &str) -> Result<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(HopitalError::validation(field, format!("{} est obligatoire", what)));
    }
    Ok(value.to_string())
}

fn check_amount_cap(field: &str, amount: Option<i64>) -> Result<()> {
    if amount.is_some_and(|a| a > MAX_AMOUNT) {
        return Err(HopitalError::validation(
            field,
            format!("Le montant ne peut pas dépasser {}", MAX_AMOUNT),
        ));
    }
    Ok(())
}

fn check_age(age: Option<u32>) -> Result<()> {
    if age.is_some_and(|a| a > MAX_AGE) {
        return Err(HopitalError::validation("patientAge", "Âge invalide"));
    }
    Ok(())
}

fn display_opt<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_kind_parse_and_section() {
        assert_eq!(RecordKind::parse("transactions"), Some(RecordKind::Transaction));
        assert_eq!(
            RecordKind::parse("maternity-hospitalizations").map(|k| k.section()),
            Some(Section::Maternite)
        );
        assert_eq!(RecordKind::parse("patients"), None);
    }

    #[test]
    fn test_consultation_normalize_trims_and_dates() {
        let normalized = RecordKind::Consultation
            .normalize(json!({
                "patientName": "  Fatou Sow ",
                "patientAge": 34,
                "patientSex": "female",
                "reason": "Fièvre",
                "diagnosis": "   ",
                "consultationDate": "2024-03-05",
                "fee": 5000
            }))
            .unwrap();
        assert_eq!(normalized.record_date, NaiveDate::from_ymd_opt(2024, 3, 5).unwrap());
        assert_eq!(normalized.value["patientName"], "Fatou Sow");
        assert!(normalized.value["diagnosis"].is_null());
    }

    #[test]
    fn test_consultation_requires_reason() {
        let err = RecordKind::Consultation
            .normalize(json!({
                "patientName": "Fatou Sow",
                "reason": "",
                "consultationDate": "2024-03-05"
            }))
            .unwrap_err();
        match err {
            HopitalError::Validation { field, .. } => assert_eq!(field, "reason"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_missing_field_is_validation_error() {
        let err = RecordKind::MedecineConsultation
            .normalize(json!({"patientName": "Moussa"}))
            .unwrap_err();
        assert!(matches!(err, HopitalError::Validation { .. }));
    }

    #[test]
    fn test_non_object_rejected() {
        assert!(RecordKind::Transaction.normalize(json!([1, 2])).is_err());
    }

    #[test]
    fn test_maternity_discharge_after_admission() {
        let body = json!({
            "patientName": "Aminata",
            "admissionDate": "2024-05-10",
            "dischargeDate": "2024-05-09"
        });
        let err = RecordKind::MaternityHospitalization.normalize(body).unwrap_err();
        match err {
            HopitalError::Validation { field, .. } => assert_eq!(field, "dischargeDate"),
            other => panic!("unexpected error: {other:?}"),
        }

        let ok = RecordKind::MaternityHospitalization
            .normalize(json!({
                "patientName": "Aminata",
                "admissionDate": "2024-05-10",
                "dischargeDate": "2024-05-12",
                "newbornCount": 2
            }))
            .unwrap();
        assert_eq!(ok.record_date, NaiveDate::from_ymd_opt(2024, 5, 10).unwrap());
    }

    #[test]
    fn test_transaction_amount_positive() {
        let body = json!({
            "kind": "expense",
            "amount": 0,
            "label": "Gants",
            "transactionDate": "2024-01-15"
        });
        assert!(RecordKind::Transaction.normalize(body).is_err());

        let ok = RecordKind::Transaction
            .normalize(json!({
                "kind": "income",
                "amount": 15000,
                "label": "Consultation",
                "paymentMethod": "mobile-money",
                "transactionDate": "2024-01-15"
            }))
            .unwrap();
        assert_eq!(ok.value["paymentMethod"], "mobile-money");
    }

    #[test]
    fn test_kind_serializes_as_segment() {
        for kind in RecordKind::ALL {
            let json = serde_json::to_value(kind).unwrap();
            assert_eq!(json, kind.as_str());
            let back: RecordKind = serde_json::from_value(json).unwrap();
            assert_eq!(back, kind);
        }
        assert!(serde_json::from_str::<RecordKind>("\"medecine-consultation\"").is_err());
    }

    #[test]
    fn test_amount_upper_bound() {
        let body = |amount: i64| {
            json!({
                "kind": "income",
                "amount": amount,
                "label": "Hospitalisation",
                "transactionDate": "2024-01-15"
            })
        };
        assert!(RecordKind::Transaction.normalize(body(MAX_AMOUNT)).is_ok());
        match RecordKind::Transaction.normalize(body(i64::MAX)) {
            Err(HopitalError::Validation { field, .. }) => assert_eq!(field, "amount"),
            other => panic!("expected amount validation error, got {:?}", other),
        }

        let consultation = json!({
            "patientName": "Awa",
            "reason": "Contrôle",
            "consultationDate": "2024-01-15",
            "fee": MAX_AMOUNT + 1
        });
        assert!(RecordKind::Consultation.normalize(consultation).is_err());
    }

    #[test]
    fn test_age_upper_bound() {
        let body = json!({
            "patientName": "Moussa",
            "patientAge": 200,
            "symptoms": "Toux",
            "consultationDate": "2024-02-01"
        });
        assert!(RecordKind::MedecineConsultation.normalize(body).is_err());
    }

    #[test]
    fn test_cells_match_columns() {
        let normalized = RecordKind::Transaction
            .normalize(json!({
                "kind": "expense",
                "amount": 2500,
                "label": "Compresses",
                "transactionDate": "2024-01-15"
            }))
            .unwrap();
        let cells = RecordKind::Transaction.cells(&normalized.value);
        assert_eq!(cells.len(), RecordKind::Transaction.columns().len());
        assert_eq!(cells[1], "Dépense");
        assert_eq!(cells[5], "2500");

        let broken = RecordKind::Consultation.cells(&json!({"nope": true}));
        assert_eq!(broken.len(), RecordKind::Consultation.columns().len());
        assert!(broken.iter().all(String::is_empty));
    }
}
