//! Repository layer: entity-scoped database operations.
//!
//! Free functions over `&Connection` so callers decide the transaction
//! boundary: a `rusqlite::Transaction` derefs to `Connection` and can be
//! passed straight through.

mod case_sheet;
mod clinical;
mod global_record;
mod hospital;
mod hospital_link;
mod patient;
mod visit;

use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::types::Type;
use uuid::Uuid;

use super::DatabaseError;

pub use case_sheet::*;
pub use clinical::*;
pub use global_record::*;
pub use hospital::*;
pub use hospital_link::*;
pub use patient::*;
pub use visit::*;

pub(crate) const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";
pub(crate) const DATE_FORMAT: &str = "%Y-%m-%d";

pub(crate) fn fmt_datetime(ts: &NaiveDateTime) -> String {
    ts.format(DATETIME_FORMAT).to_string()
}

pub(crate) fn fmt_date(d: &NaiveDate) -> String {
    d.format(DATE_FORMAT).to_string()
}

fn conversion_error<E>(idx: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

pub(crate) fn col_uuid(row: &rusqlite::Row, idx: usize) -> Result<Uuid, rusqlite::Error> {
    let s: String = row.get(idx)?;
    Uuid::parse_str(&s).map_err(|e| conversion_error(idx, e))
}

pub(crate) fn col_datetime(row: &rusqlite::Row, idx: usize) -> Result<NaiveDateTime, rusqlite::Error> {
    let s: String = row.get(idx)?;
    NaiveDateTime::parse_from_str(&s, DATETIME_FORMAT).map_err(|e| conversion_error(idx, e))
}

pub(crate) fn col_opt_datetime(
    row: &rusqlite::Row,
    idx: usize,
) -> Result<Option<NaiveDateTime>, rusqlite::Error> {
    let s: Option<String> = row.get(idx)?;
    s.map(|s| NaiveDateTime::parse_from_str(&s, DATETIME_FORMAT).map_err(|e| conversion_error(idx, e)))
        .transpose()
}

pub(crate) fn col_date(row: &rusqlite::Row, idx: usize) -> Result<NaiveDate, rusqlite::Error> {
    let s: String = row.get(idx)?;
    NaiveDate::parse_from_str(&s, DATE_FORMAT).map_err(|e| conversion_error(idx, e))
}

pub(crate) fn col_opt_date(row: &rusqlite::Row, idx: usize) -> Result<Option<NaiveDate>, rusqlite::Error> {
    let s: Option<String> = row.get(idx)?;
    s.map(|s| NaiveDate::parse_from_str(&s, DATE_FORMAT).map_err(|e| conversion_error(idx, e)))
        .transpose()
}

pub(crate) fn col_enum<T>(row: &rusqlite::Row, idx: usize) -> Result<T, rusqlite::Error>
where
    T: FromStr<Err = DatabaseError>,
{
    let s: String = row.get(idx)?;
    T::from_str(&s).map_err(|e| conversion_error(idx, e))
}

/// Escape `%`, `_` and `\` so user text is matched literally inside LIKE.
pub(crate) fn like_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Shared seed data for repository and service tests.
#[cfg(test)]
pub(crate) mod fixtures {
    use chrono::{NaiveDateTime, Utc};
    use rusqlite::Connection;
    use uuid::Uuid;

    use super::*;
    use crate::models::*;

    pub fn now() -> NaiveDateTime {
        Utc::now().naive_utc()
    }

    pub fn seed_hospital(conn: &Connection, id: &str) {
        insert_hospital(
            conn,
            &Hospital {
                id: id.into(),
                name: format!("{id} General"),
                is_active: true,
                created_at: now(),
            },
        )
        .unwrap();
    }

    pub fn make_patient(first: &str, last: &str) -> Patient {
        let ts = now();
        Patient {
            id: Uuid::new_v4(),
            first_name: first.into(),
            last_name: last.into(),
            date_of_birth: NaiveDate::from_ymd_opt(1980, 5, 17),
            gender: Gender::Female,
            national_id: None,
            passport_number: None,
            phone: None,
            email: None,
            allergies: None,
            blood_group: None,
            is_global_record: true,
            is_active: true,
            created_by: Some("manager-1".into()),
            created_at: ts,
            updated_at: ts,
            last_synced_at: None,
        }
    }

    pub fn seed_link(conn: &Connection, patient_id: Uuid, hospital_id: &str, mrn: &str) -> HospitalPatientLink {
        let link = HospitalPatientLink {
            id: Uuid::new_v4(),
            patient_id,
            hospital_id: hospital_id.into(),
            local_mrn: mrn.into(),
            first_visit_date: now().date(),
            last_visit_date: now().date(),
            total_visits: 1,
            is_active: true,
            created_at: now(),
        };
        insert_link(conn, &link).unwrap();
        link
    }

    /// Patient + hospital + link + active visit, ready for clinical artifacts.
    pub fn seed_visit(conn: &Connection, hospital_id: &str, mrn: &str) -> Visit {
        seed_hospital(conn, hospital_id);
        let patient = make_patient("Ada", "Okafor");
        insert_patient(conn, &patient).unwrap();
        let link = seed_link(conn, patient.id, hospital_id, mrn);
        let visit = Visit {
            id: Uuid::new_v4(),
            patient_id: patient.id,
            hospital_id: hospital_id.into(),
            link_id: link.id,
            visit_type: VisitType::Inpatient,
            priority: 2,
            status: VisitStatus::Active,
            reason_for_visit: "Chest pain".into(),
            attending_doctor_id: Some("dr-7".into()),
            admitted_by: "manager-1".into(),
            admission_date: now(),
            discharge_date: None,
            discharge_summary: None,
            diagnosis: None,
            sync: SyncState::default(),
        };
        insert_visit(conn, &visit).unwrap();
        visit
    }
}
