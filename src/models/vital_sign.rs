use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One bedside vitals reading taken during a visit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VitalsReading {
    pub id: Uuid,
    pub visit_id: Uuid,
    pub recorded_at: NaiveDateTime,
    pub temperature_c: Option<f64>,
    pub pulse_bpm: Option<u32>,
    pub systolic_mmhg: Option<u32>,
    pub diastolic_mmhg: Option<u32>,
    pub respiratory_rate: Option<u32>,
    pub oxygen_saturation: Option<f64>,
    pub recorded_by: Option<String>,
}

impl VitalsReading {
    /// Blank reading stamped at `recorded_at`; fill the measured fields.
    pub fn new(visit_id: Uuid, recorded_at: NaiveDateTime) -> Self {
        Self {
            id: Uuid::new_v4(),
            visit_id,
            recorded_at,
            temperature_c: None,
            pulse_bpm: None,
            systolic_mmhg: None,
            diastolic_mmhg: None,
            respiratory_rate: None,
            oxygen_saturation: None,
            recorded_by: None,
        }
    }
}
