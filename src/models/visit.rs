use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{SyncStatus, VisitStatus, VisitType};

/// Per-visit progress of the merge into the global record store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncState {
    pub synced_to_global: bool,
    pub sync_status: SyncStatus,
    pub synced_at: Option<NaiveDateTime>,
    /// Reason captured from the last failed attempt.
    pub sync_error: Option<String>,
    pub sync_attempts: u32,
}

impl Default for SyncState {
    fn default() -> Self {
        Self {
            synced_to_global: false,
            sync_status: SyncStatus::Pending,
            synced_at: None,
            sync_error: None,
            sync_attempts: 0,
        }
    }
}

/// A hospital-scoped encounter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Visit {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub hospital_id: String,
    pub link_id: Uuid,
    pub visit_type: VisitType,
    /// Derived from `visit_type`; 1 is most urgent.
    pub priority: i32,
    pub status: VisitStatus,
    pub reason_for_visit: String,
    pub attending_doctor_id: Option<String>,
    pub admitted_by: String,
    pub admission_date: NaiveDateTime,
    pub discharge_date: Option<NaiveDateTime>,
    pub discharge_summary: Option<String>,
    pub diagnosis: Option<String>,
    pub sync: SyncState,
}

impl Visit {
    pub fn is_active(&self) -> bool {
        self.status == VisitStatus::Active
    }
}
