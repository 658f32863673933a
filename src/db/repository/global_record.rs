use rusqlite::{params, Connection};
use uuid::Uuid;

use super::{col_datetime, col_uuid, fmt_datetime};
use crate::db::DatabaseError;
use crate::models::{GlobalRecord, GlobalRecordPayload};

/// Append one record. A repeated `dedup_key` surfaces as
/// `DatabaseError::UniqueViolation` naming `global_records.dedup_key`.
pub fn insert_global_record(conn: &Connection, record: &GlobalRecord) -> Result<(), DatabaseError> {
    let payload = serde_json::to_string(&record.payload)
        .map_err(|e| DatabaseError::ConstraintViolation(format!("JSON serialization: {e}")))?;
    conn.execute(
        "INSERT INTO global_records (id, dedup_key, record_type, patient_id, visit_id,
         source_hospital_id, payload, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            record.id.to_string(),
            record.dedup_key,
            record.record_type().as_str(),
            record.patient_id.to_string(),
            record.visit_id.to_string(),
            record.source_hospital_id,
            payload,
            fmt_datetime(&record.created_at),
        ],
    )?;
    Ok(())
}

pub fn global_record_exists(conn: &Connection, dedup_key: &str) -> Result<bool, DatabaseError> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM global_records WHERE dedup_key = ?1)",
        params![dedup_key],
        |row| row.get(0),
    )?;
    Ok(exists)
}

pub fn get_global_records_for_visit(
    conn: &Connection,
    visit_id: &Uuid,
) -> Result<Vec<GlobalRecord>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, dedup_key, patient_id, visit_id, source_hospital_id, payload, created_at
         FROM global_records WHERE visit_id = ?1
         ORDER BY created_at ASC, dedup_key ASC",
    )?;
    let rows = stmt.query_map(params![visit_id.to_string()], row_to_record)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(DatabaseError::from)
}

pub fn count_global_records_for_visit(conn: &Connection, visit_id: &Uuid) -> Result<u32, DatabaseError> {
    let count: u32 = conn.query_row(
        "SELECT COUNT(*) FROM global_records WHERE visit_id = ?1",
        params![visit_id.to_string()],
        |row| row.get(0),
    )?;
    Ok(count)
}

fn row_to_record(row: &rusqlite::Row) -> Result<GlobalRecord, rusqlite::Error> {
    let payload_json: String = row.get(5)?;
    let payload: GlobalRecordPayload = serde_json::from_str(&payload_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(GlobalRecord {
        id: col_uuid(row, 0)?,
        dedup_key: row.get(1)?,
        patient_id: col_uuid(row, 2)?,
        visit_id: col_uuid(row, 3)?,
        source_hospital_id: row.get(4)?,
        payload,
        created_at: col_datetime(row, 6)?,
    })
}
