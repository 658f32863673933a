use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::{col_date, col_datetime, col_uuid, fmt_date, fmt_datetime};
use crate::db::DatabaseError;
use crate::models::HospitalPatientLink;

const LINK_COLUMNS: &str = "id, patient_id, hospital_id, local_mrn, first_visit_date,
    last_visit_date, total_visits, is_active, created_at";

/// Insert a new link. A reused `(hospital_id, local_mrn)` or a second link for
/// the same `(patient_id, hospital_id)` surfaces as `DatabaseError::UniqueViolation`.
pub fn insert_link(conn: &Connection, link: &HospitalPatientLink) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO hospital_patient_links (id, patient_id, hospital_id, local_mrn,
         first_visit_date, last_visit_date, total_visits, is_active, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            link.id.to_string(),
            link.patient_id.to_string(),
            link.hospital_id,
            link.local_mrn,
            fmt_date(&link.first_visit_date),
            fmt_date(&link.last_visit_date),
            link.total_visits,
            link.is_active as i32,
            fmt_datetime(&link.created_at),
        ],
    )?;
    Ok(())
}

pub fn get_link_by_id(conn: &Connection, id: &Uuid) -> Result<Option<HospitalPatientLink>, DatabaseError> {
    let sql = format!("SELECT {LINK_COLUMNS} FROM hospital_patient_links WHERE id = ?1");
    conn.query_row(&sql, params![id.to_string()], row_to_link)
        .optional()
        .map_err(DatabaseError::from)
}

pub fn get_link(
    conn: &Connection,
    patient_id: &Uuid,
    hospital_id: &str,
) -> Result<Option<HospitalPatientLink>, DatabaseError> {
    let sql = format!(
        "SELECT {LINK_COLUMNS} FROM hospital_patient_links WHERE patient_id = ?1 AND hospital_id = ?2"
    );
    conn.query_row(&sql, params![patient_id.to_string(), hospital_id], row_to_link)
        .optional()
        .map_err(DatabaseError::from)
}

/// The link owning `mrn` inside one hospital's namespace, active or not.
pub fn get_link_by_mrn(
    conn: &Connection,
    hospital_id: &str,
    mrn: &str,
) -> Result<Option<HospitalPatientLink>, DatabaseError> {
    let sql = format!(
        "SELECT {LINK_COLUMNS} FROM hospital_patient_links WHERE hospital_id = ?1 AND local_mrn = ?2"
    );
    conn.query_row(&sql, params![hospital_id, mrn], row_to_link)
        .optional()
        .map_err(DatabaseError::from)
}

/// Every active link using `mrn`, across all hospitals, oldest first.
/// Different hospitals may legitimately reuse the same MRN string.
pub fn find_links_by_mrn(conn: &Connection, mrn: &str) -> Result<Vec<HospitalPatientLink>, DatabaseError> {
    let sql = format!(
        "SELECT {LINK_COLUMNS} FROM hospital_patient_links
         WHERE local_mrn = ?1 AND is_active = 1
         ORDER BY first_visit_date ASC, created_at ASC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![mrn], row_to_link)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(DatabaseError::from)
}

pub fn get_links_for_patient(
    conn: &Connection,
    patient_id: &Uuid,
) -> Result<Vec<HospitalPatientLink>, DatabaseError> {
    let sql = format!(
        "SELECT {LINK_COLUMNS} FROM hospital_patient_links
         WHERE patient_id = ?1
         ORDER BY first_visit_date ASC, created_at ASC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![patient_id.to_string()], row_to_link)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(DatabaseError::from)
}

/// Count one more visit on an existing link. `last_visit_date` never moves backwards.
pub fn record_link_visit(
    conn: &Connection,
    link_id: &Uuid,
    visit_date: &NaiveDate,
) -> Result<(), DatabaseError> {
    let affected = conn.execute(
        "UPDATE hospital_patient_links
         SET total_visits = total_visits + 1,
             last_visit_date = MAX(last_visit_date, ?2),
             is_active = 1
         WHERE id = ?1",
        params![link_id.to_string(), fmt_date(visit_date)],
    )?;
    if affected == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "hospital_patient_link".into(),
            id: link_id.to_string(),
        });
    }
    Ok(())
}

fn row_to_link(row: &rusqlite::Row) -> Result<HospitalPatientLink, rusqlite::Error> {
    Ok(HospitalPatientLink {
        id: col_uuid(row, 0)?,
        patient_id: col_uuid(row, 1)?,
        hospital_id: row.get(2)?,
        local_mrn: row.get(3)?,
        first_visit_date: col_date(row, 4)?,
        last_visit_date: col_date(row, 5)?,
        total_visits: row.get(6)?,
        is_active: row.get::<_, i32>(7)? != 0,
        created_at: col_datetime(row, 8)?,
    })
}
