use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Clinical case record opened for inpatient and emergency admissions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseSheet {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub visit_id: Uuid,
    pub hospital_id: String,
    pub case_number: String,
    pub chief_complaint: String,
    pub allergies: Option<String>,
    pub created_at: NaiveDateTime,
}

/// Everything the admission knows when it asks for a case sheet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseSheetSeed {
    pub patient_id: Uuid,
    pub visit_id: Uuid,
    pub hospital_id: String,
    pub case_number: String,
    pub chief_complaint: String,
    pub seed_allergies: Option<String>,
}
