use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A tenant of the network. Each hospital owns its own MRN namespace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hospital {
    pub id: String,
    pub name: String,
    pub is_active: bool,
    pub created_at: NaiveDateTime,
}

/// Second level of the two-level key: binds a global patient to one
/// hospital's local MRN. `local_mrn` is unique only within `hospital_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HospitalPatientLink {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub hospital_id: String,
    pub local_mrn: String,
    pub first_visit_date: NaiveDate,
    pub last_visit_date: NaiveDate,
    pub total_visits: u32,
    pub is_active: bool,
    pub created_at: NaiveDateTime,
}
