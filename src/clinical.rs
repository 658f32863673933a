//! Clinical artifacts recorded locally during an active visit. These are
//! what the merge later copies into the global store.

use chrono::Utc;
use rusqlite::Connection;
use uuid::Uuid;

use crate::db;
use crate::error::CoreError;
use crate::models::{
    LabOrder, LabResultEntry, LabStatus, LabTest, Prescription, PrescriptionOrder, Visit, VitalsReading,
};

fn require_active_visit(conn: &Connection, visit_id: &Uuid) -> Result<Visit, CoreError> {
    let visit = db::get_visit(conn, visit_id)?.ok_or_else(|| CoreError::not_found("visit", visit_id))?;
    if !visit.is_active() {
        return Err(CoreError::InvalidState(format!(
            "visit {visit_id} is discharged; clinical records are closed"
        )));
    }
    Ok(visit)
}

fn required(field: &str, value: &str) -> Result<String, CoreError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(CoreError::InvalidInput(format!("{field} is required")));
    }
    Ok(value.to_string())
}

pub fn record_vitals(conn: &Connection, visit_id: &Uuid, reading: &VitalsReading) -> Result<VitalsReading, CoreError> {
    require_active_visit(conn, visit_id)?;
    let measured = reading.temperature_c.is_some()
        || reading.pulse_bpm.is_some()
        || reading.systolic_mmhg.is_some()
        || reading.diastolic_mmhg.is_some()
        || reading.respiratory_rate.is_some()
        || reading.oxygen_saturation.is_some();
    if !measured {
        return Err(CoreError::InvalidInput("vitals reading has no measurements".into()));
    }

    let stored = VitalsReading {
        id: Uuid::new_v4(),
        visit_id: *visit_id,
        ..reading.clone()
    };
    db::insert_vitals(conn, &stored)?;
    tracing::debug!(visit_id = %visit_id, vitals_id = %stored.id, "Vitals recorded");
    Ok(stored)
}

pub fn record_lab_test(conn: &Connection, visit_id: &Uuid, order: &LabOrder) -> Result<LabTest, CoreError> {
    require_active_visit(conn, visit_id)?;
    let lab = LabTest {
        id: Uuid::new_v4(),
        visit_id: *visit_id,
        test_name: required("test name", &order.test_name)?,
        status: LabStatus::Ordered,
        result_value: None,
        unit: order.unit.clone(),
        reference_range: order.reference_range.clone(),
        ordered_at: Utc::now().naive_utc(),
        completed_at: None,
    };
    db::insert_lab_test(conn, &lab)?;
    tracing::debug!(visit_id = %visit_id, lab_test_id = %lab.id, "Lab test ordered");
    Ok(lab)
}

/// Only completed tests are merged at discharge.
pub fn complete_lab_test(conn: &Connection, lab_test_id: &Uuid, entry: &LabResultEntry) -> Result<LabTest, CoreError> {
    let lab = db::get_lab_test(conn, lab_test_id)?.ok_or_else(|| CoreError::not_found("lab_test", lab_test_id))?;
    require_active_visit(conn, &lab.visit_id)?;
    let entry = LabResultEntry {
        result_value: required("result value", &entry.result_value)?,
        ..entry.clone()
    };

    if !db::complete_lab_test(conn, lab_test_id, &entry, &Utc::now().naive_utc())? {
        return Err(CoreError::InvalidState(format!(
            "lab test {lab_test_id} is {}, not ordered",
            lab.status
        )));
    }
    db::get_lab_test(conn, lab_test_id)?.ok_or_else(|| CoreError::not_found("lab_test", lab_test_id))
}

pub fn record_prescription(
    conn: &Connection,
    visit_id: &Uuid,
    order: &PrescriptionOrder,
) -> Result<Prescription, CoreError> {
    require_active_visit(conn, visit_id)?;
    let rx = Prescription {
        id: Uuid::new_v4(),
        visit_id: *visit_id,
        medication: required("medication", &order.medication)?,
        dosage: required("dosage", &order.dosage)?,
        frequency: required("frequency", &order.frequency)?,
        duration_days: order.duration_days,
        instructions: order.instructions.clone(),
        prescribed_by: order.prescribed_by.clone(),
        prescribed_at: Utc::now().naive_utc(),
    };
    db::insert_prescription(conn, &rx)?;
    tracing::debug!(visit_id = %visit_id, prescription_id = %rx.id, "Prescription recorded");
    Ok(rx)
}
