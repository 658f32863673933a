use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::{col_datetime, col_uuid, fmt_datetime};
use crate::db::DatabaseError;
use crate::models::CaseSheet;

pub fn insert_case_sheet(conn: &Connection, sheet: &CaseSheet) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO case_sheets (id, patient_id, visit_id, hospital_id, case_number,
         chief_complaint, allergies, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            sheet.id.to_string(),
            sheet.patient_id.to_string(),
            sheet.visit_id.to_string(),
            sheet.hospital_id,
            sheet.case_number,
            sheet.chief_complaint,
            sheet.allergies,
            fmt_datetime(&sheet.created_at),
        ],
    )?;
    Ok(())
}

pub fn get_case_sheet_for_visit(conn: &Connection, visit_id: &Uuid) -> Result<Option<CaseSheet>, DatabaseError> {
    conn.query_row(
        "SELECT id, patient_id, visit_id, hospital_id, case_number, chief_complaint, allergies, created_at
         FROM case_sheets WHERE visit_id = ?1",
        params![visit_id.to_string()],
        |row| {
            Ok(CaseSheet {
                id: col_uuid(row, 0)?,
                patient_id: col_uuid(row, 1)?,
                visit_id: col_uuid(row, 2)?,
                hospital_id: row.get(3)?,
                case_number: row.get(4)?,
                chief_complaint: row.get(5)?,
                allergies: row.get(6)?,
                created_at: col_datetime(row, 7)?,
            })
        },
    )
    .optional()
    .map_err(DatabaseError::from)
}

/// Clinicians amend the allergy list on the case sheet during the stay.
pub fn update_case_sheet_allergies(
    conn: &Connection,
    visit_id: &Uuid,
    allergies: &str,
) -> Result<(), DatabaseError> {
    let affected = conn.execute(
        "UPDATE case_sheets SET allergies = ?2 WHERE visit_id = ?1",
        params![visit_id.to_string(), allergies],
    )?;
    if affected == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "case_sheet".into(),
            id: visit_id.to_string(),
        });
    }
    Ok(())
}
