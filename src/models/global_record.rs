use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{LabStatus, RecordType, VisitType};

/// Append-only fact in the consolidated record, one per clinical artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalRecord {
    pub id: Uuid,
    pub dedup_key: String,
    pub patient_id: Uuid,
    pub visit_id: Uuid,
    pub source_hospital_id: String,
    pub payload: GlobalRecordPayload,
    pub created_at: NaiveDateTime,
}

impl GlobalRecord {
    pub fn record_type(&self) -> RecordType {
        self.payload.record_type()
    }
}

/// Typed body of a global record, tagged by record type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "record_type", rename_all = "snake_case")]
pub enum GlobalRecordPayload {
    VisitSummary(VisitSummary),
    Vitals(VitalsSnapshot),
    LabTest(LabResultRecord),
    Prescription(PrescriptionRecord),
}

impl GlobalRecordPayload {
    pub fn record_type(&self) -> RecordType {
        match self {
            GlobalRecordPayload::VisitSummary(_) => RecordType::VisitSummary,
            GlobalRecordPayload::Vitals(_) => RecordType::Vitals,
            GlobalRecordPayload::LabTest(_) => RecordType::LabTest,
            GlobalRecordPayload::Prescription(_) => RecordType::Prescription,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisitSummary {
    pub visit_type: VisitType,
    pub reason_for_visit: String,
    pub admission_date: NaiveDateTime,
    pub discharge_date: Option<NaiveDateTime>,
    pub diagnosis: Option<String>,
    pub discharge_summary: Option<String>,
    pub attending_doctor_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VitalsSnapshot {
    pub recorded_at: NaiveDateTime,
    pub temperature_c: Option<f64>,
    pub pulse_bpm: Option<u32>,
    pub systolic_mmhg: Option<u32>,
    pub diastolic_mmhg: Option<u32>,
    pub respiratory_rate: Option<u32>,
    pub oxygen_saturation: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabResultRecord {
    pub lab_test_id: Uuid,
    pub test_name: String,
    pub status: LabStatus,
    pub result_value: Option<String>,
    pub unit: Option<String>,
    pub reference_range: Option<String>,
    pub completed_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrescriptionRecord {
    pub prescription_id: Uuid,
    pub medication: String,
    pub dosage: String,
    pub frequency: String,
    pub duration_days: Option<u32>,
    pub instructions: Option<String>,
}
