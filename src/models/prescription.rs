use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prescription {
    pub id: Uuid,
    pub visit_id: Uuid,
    pub medication: String,
    pub dosage: String,
    pub frequency: String,
    pub duration_days: Option<u32>,
    pub instructions: Option<String>,
    pub prescribed_by: Option<String>,
    pub prescribed_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrescriptionOrder {
    pub medication: String,
    pub dosage: String,
    pub frequency: String,
    pub duration_days: Option<u32>,
    pub instructions: Option<String>,
    pub prescribed_by: Option<String>,
}
