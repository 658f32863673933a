use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::LabStatus;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabTest {
    pub id: Uuid,
    pub visit_id: Uuid,
    pub test_name: String,
    pub status: LabStatus,
    pub result_value: Option<String>,
    pub unit: Option<String>,
    pub reference_range: Option<String>,
    pub ordered_at: NaiveDateTime,
    pub completed_at: Option<NaiveDateTime>,
}

/// Result entered when a lab test completes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabResultEntry {
    pub result_value: String,
    pub unit: Option<String>,
    pub reference_range: Option<String>,
}

/// A test requested during a visit; it starts out `ordered`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabOrder {
    pub test_name: String,
    pub unit: Option<String>,
    pub reference_range: Option<String>,
}
