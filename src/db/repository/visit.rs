use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::{col_datetime, col_enum, col_opt_datetime, col_uuid, fmt_datetime};
use crate::db::DatabaseError;
use crate::models::{SyncState, SyncStatus, Visit, VisitStatus};

const VISIT_COLUMNS: &str = "id, patient_id, hospital_id, link_id, visit_type, priority, status,
    reason_for_visit, attending_doctor_id, admitted_by, admission_date, discharge_date,
    discharge_summary, diagnosis, synced_to_global, sync_status, synced_at, sync_error,
    sync_attempts";

pub fn insert_visit(conn: &Connection, v: &Visit) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO visits (id, patient_id, hospital_id, link_id, visit_type, priority, status,
         reason_for_visit, attending_doctor_id, admitted_by, admission_date, discharge_date,
         discharge_summary, diagnosis, synced_to_global, sync_status, synced_at, sync_error,
         sync_attempts)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)",
        params![
            v.id.to_string(),
            v.patient_id.to_string(),
            v.hospital_id,
            v.link_id.to_string(),
            v.visit_type.as_str(),
            v.priority,
            v.status.as_str(),
            v.reason_for_visit,
            v.attending_doctor_id,
            v.admitted_by,
            fmt_datetime(&v.admission_date),
            v.discharge_date.as_ref().map(fmt_datetime),
            v.discharge_summary,
            v.diagnosis,
            v.sync.synced_to_global as i32,
            v.sync.sync_status.as_str(),
            v.sync.synced_at.as_ref().map(fmt_datetime),
            v.sync.sync_error,
            v.sync.sync_attempts,
        ],
    )?;
    Ok(())
}

pub fn get_visit(conn: &Connection, id: &Uuid) -> Result<Option<Visit>, DatabaseError> {
    let sql = format!("SELECT {VISIT_COLUMNS} FROM visits WHERE id = ?1");
    conn.query_row(&sql, params![id.to_string()], row_to_visit)
        .optional()
        .map_err(DatabaseError::from)
}

/// All visits of a global patient across hospitals, newest first.
pub fn get_visits_for_patient(conn: &Connection, patient_id: &Uuid) -> Result<Vec<Visit>, DatabaseError> {
    let sql = format!(
        "SELECT {VISIT_COLUMNS} FROM visits WHERE patient_id = ?1 ORDER BY admission_date DESC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![patient_id.to_string()], row_to_visit)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(DatabaseError::from)
}

/// Visits whose last merge attempt failed, optionally scoped to one hospital.
pub fn list_failed_syncs(conn: &Connection, hospital_id: Option<&str>) -> Result<Vec<Visit>, DatabaseError> {
    let sql = format!(
        "SELECT {VISIT_COLUMNS} FROM visits
         WHERE sync_status = 'failed' AND (?1 IS NULL OR hospital_id = ?1)
         ORDER BY discharge_date ASC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![hospital_id], row_to_visit)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(DatabaseError::from)
}

/// Move an active visit to discharged and reset its sync state to pending.
/// Returns `false` when the visit was not active (nothing written).
pub fn mark_discharged(
    conn: &Connection,
    id: &Uuid,
    now: &NaiveDateTime,
    summary: Option<&str>,
    diagnosis: Option<&str>,
) -> Result<bool, DatabaseError> {
    let affected = conn.execute(
        "UPDATE visits
         SET status = 'discharged', discharge_date = ?2,
             discharge_summary = COALESCE(?3, discharge_summary),
             diagnosis = COALESCE(?4, diagnosis),
             sync_status = 'pending', sync_error = NULL
         WHERE id = ?1 AND status = 'active'",
        params![id.to_string(), fmt_datetime(now), summary, diagnosis],
    )?;
    Ok(affected == 1)
}

pub fn mark_sync_succeeded(conn: &Connection, id: &Uuid, now: &NaiveDateTime) -> Result<(), DatabaseError> {
    let affected = conn.execute(
        "UPDATE visits
         SET synced_to_global = 1, sync_status = 'synced', synced_at = ?2, sync_error = NULL
         WHERE id = ?1",
        params![id.to_string(), fmt_datetime(now)],
    )?;
    ensure_visit_touched(affected, id)
}

/// Record a failed attempt. `synced_to_global` is left untouched. Returns
/// `false` when nothing was written: the visit is missing or already synced.
pub fn mark_sync_failed(conn: &Connection, id: &Uuid, reason: &str) -> Result<bool, DatabaseError> {
    let affected = conn.execute(
        "UPDATE visits
         SET sync_status = 'failed', sync_error = ?2, sync_attempts = sync_attempts + 1
         WHERE id = ?1 AND synced_to_global = 0",
        params![id.to_string(), reason],
    )?;
    Ok(affected == 1)
}

/// Clear the failure counter so a parked visit can be merged again.
pub fn reset_sync_state(conn: &Connection, id: &Uuid) -> Result<(), DatabaseError> {
    let affected = conn.execute(
        "UPDATE visits
         SET sync_status = 'pending', sync_error = NULL, sync_attempts = 0
         WHERE id = ?1 AND synced_to_global = 0",
        params![id.to_string()],
    )?;
    ensure_visit_touched(affected, id)
}

fn ensure_visit_touched(affected: usize, id: &Uuid) -> Result<(), DatabaseError> {
    if affected == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "visit".into(),
            id: id.to_string(),
        });
    }
    Ok(())
}

fn row_to_visit(row: &rusqlite::Row) -> Result<Visit, rusqlite::Error> {
    Ok(Visit {
        id: col_uuid(row, 0)?,
        patient_id: col_uuid(row, 1)?,
        hospital_id: row.get(2)?,
        link_id: col_uuid(row, 3)?,
        visit_type: col_enum(row, 4)?,
        priority: row.get(5)?,
        status: col_enum::<VisitStatus>(row, 6)?,
        reason_for_visit: row.get(7)?,
        attending_doctor_id: row.get(8)?,
        admitted_by: row.get(9)?,
        admission_date: col_datetime(row, 10)?,
        discharge_date: col_opt_datetime(row, 11)?,
        discharge_summary: row.get(12)?,
        diagnosis: row.get(13)?,
        sync: SyncState {
            synced_to_global: row.get::<_, i32>(14)? != 0,
            sync_status: col_enum::<SyncStatus>(row, 15)?,
            synced_at: col_opt_datetime(row, 16)?,
            sync_error: row.get(17)?,
            sync_attempts: row.get(18)?,
        },
    })
}
