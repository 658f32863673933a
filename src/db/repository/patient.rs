use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::{col_datetime, col_enum, col_opt_date, col_opt_datetime, col_uuid, fmt_date, fmt_datetime, like_escape};
use crate::db::DatabaseError;
use crate::models::{normalize_email, normalize_phone, Patient};

const PATIENT_COLUMNS: &str = "id, first_name, last_name, date_of_birth, gender, national_id,
    passport_number, phone, email, allergies, blood_group, is_global_record, is_active,
    created_by, created_at, updated_at, last_synced_at";

pub fn insert_patient(conn: &Connection, p: &Patient) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO patients (id, first_name, last_name, date_of_birth, gender, national_id,
         passport_number, phone, phone_normalized, email, email_normalized, allergies, blood_group,
         is_global_record, is_active, created_by, created_at, updated_at, last_synced_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)",
        params![
            p.id.to_string(),
            p.first_name,
            p.last_name,
            p.date_of_birth.as_ref().map(fmt_date),
            p.gender.as_str(),
            p.national_id,
            p.passport_number,
            p.phone,
            p.phone.as_deref().map(normalize_phone),
            p.email,
            p.email.as_deref().map(normalize_email),
            p.allergies,
            p.blood_group,
            p.is_global_record as i32,
            p.is_active as i32,
            p.created_by,
            fmt_datetime(&p.created_at),
            fmt_datetime(&p.updated_at),
            p.last_synced_at.as_ref().map(fmt_datetime),
        ],
    )?;
    Ok(())
}

pub fn get_patient(conn: &Connection, id: &Uuid) -> Result<Option<Patient>, DatabaseError> {
    let sql = format!("SELECT {PATIENT_COLUMNS} FROM patients WHERE id = ?1");
    conn.query_row(&sql, params![id.to_string()], row_to_patient)
        .optional()
        .map_err(DatabaseError::from)
}

/// Tier 1: exact match on national ID or passport number.
pub fn find_active_by_document_id(conn: &Connection, value: &str) -> Result<Option<Patient>, DatabaseError> {
    let sql = format!(
        "SELECT {PATIENT_COLUMNS} FROM patients
         WHERE is_active = 1 AND (national_id = ?1 OR passport_number = ?1)
         ORDER BY created_at ASC LIMIT 1"
    );
    conn.query_row(&sql, params![value], row_to_patient)
        .optional()
        .map_err(DatabaseError::from)
}

/// Tier 2: phone, compared on the normalized form. An exact hit wins; otherwise
/// a substring hit is accepted when `allow_substring` is set.
pub fn find_active_by_phone(
    conn: &Connection,
    normalized: &str,
    allow_substring: bool,
) -> Result<Option<Patient>, DatabaseError> {
    if normalized.is_empty() {
        return Ok(None);
    }
    let exact_sql = format!(
        "SELECT {PATIENT_COLUMNS} FROM patients
         WHERE is_active = 1 AND phone_normalized = ?1
         ORDER BY created_at ASC LIMIT 1"
    );
    if let Some(p) = conn.query_row(&exact_sql, params![normalized], row_to_patient).optional()? {
        return Ok(Some(p));
    }
    if !allow_substring {
        return Ok(None);
    }
    let partial_sql = format!(
        "SELECT {PATIENT_COLUMNS} FROM patients
         WHERE is_active = 1 AND phone_normalized LIKE ?1 ESCAPE '\\'
         ORDER BY created_at ASC LIMIT 1"
    );
    let pattern = format!("%{}%", like_escape(normalized));
    conn.query_row(&partial_sql, params![pattern], row_to_patient)
        .optional()
        .map_err(DatabaseError::from)
}

/// Tier 3: case-insensitive exact email, compared on the normalized form.
pub fn find_active_by_email(conn: &Connection, email: &str) -> Result<Option<Patient>, DatabaseError> {
    let sql = format!(
        "SELECT {PATIENT_COLUMNS} FROM patients
         WHERE is_active = 1 AND email_normalized = ?1
         ORDER BY created_at ASC LIMIT 1"
    );
    conn.query_row(&sql, params![normalize_email(email)], row_to_patient)
        .optional()
        .map_err(DatabaseError::from)
}

/// Tier 5: given-name prefix and family-name prefix, both case-insensitive.
pub fn find_active_by_name(
    conn: &Connection,
    given_prefix: &str,
    family_prefix: &str,
) -> Result<Option<Patient>, DatabaseError> {
    let sql = format!(
        "SELECT {PATIENT_COLUMNS} FROM patients
         WHERE is_active = 1
           AND LOWER(first_name) LIKE ?1 ESCAPE '\\'
           AND LOWER(last_name) LIKE ?2 ESCAPE '\\'
         ORDER BY created_at ASC LIMIT 1"
    );
    let given = format!("{}%", like_escape(&given_prefix.to_lowercase()));
    let family = format!("{}%", like_escape(&family_prefix.to_lowercase()));
    conn.query_row(&sql, params![given, family], row_to_patient)
        .optional()
        .map_err(DatabaseError::from)
}

/// Replace the allergy text. Callers compute the accreted value.
pub fn update_patient_allergies(
    conn: &Connection,
    id: &Uuid,
    allergies: &str,
    now: &NaiveDateTime,
) -> Result<(), DatabaseError> {
    let affected = conn.execute(
        "UPDATE patients SET allergies = ?2, updated_at = ?3 WHERE id = ?1",
        params![id.to_string(), allergies, fmt_datetime(now)],
    )?;
    ensure_patient_touched(affected, id)
}

pub fn mark_patient_synced(conn: &Connection, id: &Uuid, now: &NaiveDateTime) -> Result<(), DatabaseError> {
    let affected = conn.execute(
        "UPDATE patients SET last_synced_at = ?2, updated_at = ?2 WHERE id = ?1",
        params![id.to_string(), fmt_datetime(now)],
    )?;
    ensure_patient_touched(affected, id)
}

/// Soft (de)activation. Patients are never deleted.
pub fn set_patient_active(
    conn: &Connection,
    id: &Uuid,
    active: bool,
    now: &NaiveDateTime,
) -> Result<(), DatabaseError> {
    let affected = conn.execute(
        "UPDATE patients SET is_active = ?2, updated_at = ?3 WHERE id = ?1",
        params![id.to_string(), active as i32, fmt_datetime(now)],
    )?;
    ensure_patient_touched(affected, id)
}

fn ensure_patient_touched(affected: usize, id: &Uuid) -> Result<(), DatabaseError> {
    if affected == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "patient".into(),
            id: id.to_string(),
        });
    }
    Ok(())
}

fn row_to_patient(row: &rusqlite::Row) -> Result<Patient, rusqlite::Error> {
    Ok(Patient {
        id: col_uuid(row, 0)?,
        first_name: row.get(1)?,
        last_name: row.get(2)?,
        date_of_birth: col_opt_date(row, 3)?,
        gender: col_enum(row, 4)?,
        national_id: row.get(5)?,
        passport_number: row.get(6)?,
        phone: row.get(7)?,
        email: row.get(8)?,
        allergies: row.get(9)?,
        blood_group: row.get(10)?,
        is_global_record: row.get::<_, i32>(11)? != 0,
        is_active: row.get::<_, i32>(12)? != 0,
        created_by: row.get(13)?,
        created_at: col_datetime(row, 14)?,
        updated_at: col_datetime(row, 15)?,
        last_synced_at: col_opt_datetime(row, 16)?,
    })
}
