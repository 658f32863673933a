use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::{col_datetime, col_enum, col_opt_datetime, col_uuid, fmt_datetime};
use crate::db::DatabaseError;
use crate::models::{LabResultEntry, LabTest, Prescription, VitalsReading};

// ═══════════════════════════════════════════
// Vitals
// ═══════════════════════════════════════════

pub fn insert_vitals(conn: &Connection, v: &VitalsReading) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO visit_vitals (id, visit_id, recorded_at, temperature_c, pulse_bpm,
         systolic_mmhg, diastolic_mmhg, respiratory_rate, oxygen_saturation, recorded_by)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            v.id.to_string(),
            v.visit_id.to_string(),
            fmt_datetime(&v.recorded_at),
            v.temperature_c,
            v.pulse_bpm,
            v.systolic_mmhg,
            v.diastolic_mmhg,
            v.respiratory_rate,
            v.oxygen_saturation,
            v.recorded_by,
        ],
    )?;
    Ok(())
}

/// Most recent `limit` readings for a visit, newest first.
pub fn get_recent_vitals(
    conn: &Connection,
    visit_id: &Uuid,
    limit: u32,
) -> Result<Vec<VitalsReading>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, visit_id, recorded_at, temperature_c, pulse_bpm, systolic_mmhg,
                diastolic_mmhg, respiratory_rate, oxygen_saturation, recorded_by
         FROM visit_vitals
         WHERE visit_id = ?1
         ORDER BY recorded_at DESC
         LIMIT ?2",
    )?;
    let rows = stmt.query_map(params![visit_id.to_string(), limit], |row| {
        Ok(VitalsReading {
            id: col_uuid(row, 0)?,
            visit_id: col_uuid(row, 1)?,
            recorded_at: col_datetime(row, 2)?,
            temperature_c: row.get(3)?,
            pulse_bpm: row.get(4)?,
            systolic_mmhg: row.get(5)?,
            diastolic_mmhg: row.get(6)?,
            respiratory_rate: row.get(7)?,
            oxygen_saturation: row.get(8)?,
            recorded_by: row.get(9)?,
        })
    })?;
    rows.collect::<Result<Vec<_>, _>>().map_err(DatabaseError::from)
}

// ═══════════════════════════════════════════
// Lab tests
// ═══════════════════════════════════════════

const LAB_COLUMNS: &str = "id, visit_id, test_name, status, result_value, unit, reference_range,
    ordered_at, completed_at";

pub fn insert_lab_test(conn: &Connection, lab: &LabTest) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO visit_lab_tests (id, visit_id, test_name, status, result_value, unit,
         reference_range, ordered_at, completed_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            lab.id.to_string(),
            lab.visit_id.to_string(),
            lab.test_name,
            lab.status.as_str(),
            lab.result_value,
            lab.unit,
            lab.reference_range,
            fmt_datetime(&lab.ordered_at),
            lab.completed_at.as_ref().map(fmt_datetime),
        ],
    )?;
    Ok(())
}

pub fn get_lab_test(conn: &Connection, id: &Uuid) -> Result<Option<LabTest>, DatabaseError> {
    let sql = format!("SELECT {LAB_COLUMNS} FROM visit_lab_tests WHERE id = ?1");
    conn.query_row(&sql, params![id.to_string()], row_to_lab)
        .optional()
        .map_err(DatabaseError::from)
}

/// Store a result on an ordered test. Returns `false` if the test was not
/// in the `ordered` state.
pub fn complete_lab_test(
    conn: &Connection,
    id: &Uuid,
    entry: &LabResultEntry,
    now: &NaiveDateTime,
) -> Result<bool, DatabaseError> {
    let affected = conn.execute(
        "UPDATE visit_lab_tests
         SET status = 'completed', result_value = ?2,
             unit = COALESCE(?3, unit), reference_range = COALESCE(?4, reference_range),
             completed_at = ?5
         WHERE id = ?1 AND status = 'ordered'",
        params![
            id.to_string(),
            entry.result_value,
            entry.unit,
            entry.reference_range,
            fmt_datetime(now),
        ],
    )?;
    Ok(affected == 1)
}

pub fn get_completed_lab_tests(conn: &Connection, visit_id: &Uuid) -> Result<Vec<LabTest>, DatabaseError> {
    let sql = format!(
        "SELECT {LAB_COLUMNS} FROM visit_lab_tests
         WHERE visit_id = ?1 AND status = 'completed'
         ORDER BY completed_at ASC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![visit_id.to_string()], row_to_lab)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(DatabaseError::from)
}

fn row_to_lab(row: &rusqlite::Row) -> Result<LabTest, rusqlite::Error> {
    Ok(LabTest {
        id: col_uuid(row, 0)?,
        visit_id: col_uuid(row, 1)?,
        test_name: row.get(2)?,
        status: col_enum(row, 3)?,
        result_value: row.get(4)?,
        unit: row.get(5)?,
        reference_range: row.get(6)?,
        ordered_at: col_datetime(row, 7)?,
        completed_at: col_opt_datetime(row, 8)?,
    })
}

// ═══════════════════════════════════════════
// Prescriptions
// ═══════════════════════════════════════════

pub fn insert_prescription(conn: &Connection, rx: &Prescription) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO visit_prescriptions (id, visit_id, medication, dosage, frequency,
         duration_days, instructions, prescribed_by, prescribed_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            rx.id.to_string(),
            rx.visit_id.to_string(),
            rx.medication,
            rx.dosage,
            rx.frequency,
            rx.duration_days,
            rx.instructions,
            rx.prescribed_by,
            fmt_datetime(&rx.prescribed_at),
        ],
    )?;
    Ok(())
}

pub fn get_prescriptions_for_visit(
    conn: &Connection,
    visit_id: &Uuid,
) -> Result<Vec<Prescription>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, visit_id, medication, dosage, frequency, duration_days, instructions,
                prescribed_by, prescribed_at
         FROM visit_prescriptions
         WHERE visit_id = ?1
         ORDER BY prescribed_at ASC",
    )?;
    let rows = stmt.query_map(params![visit_id.to_string()], |row| {
        Ok(Prescription {
            id: col_uuid(row, 0)?,
            visit_id: col_uuid(row, 1)?,
            medication: row.get(2)?,
            dosage: row.get(3)?,
            frequency: row.get(4)?,
            duration_days: row.get(5)?,
            instructions: row.get(6)?,
            prescribed_by: row.get(7)?,
            prescribed_at: col_datetime(row, 8)?,
        })
    })?;
    rows.collect::<Result<Vec<_>, _>>().map_err(DatabaseError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::fixtures::{now, seed_visit};
    use crate::db::sqlite::open_memory_database;
    use crate::models::LabStatus;
    use chrono::Duration;

    #[test]
    fn recent_vitals_are_capped_and_newest_first() {
        let conn = open_memory_database().unwrap();
        let visit = seed_visit(&conn, "H1", "MRN-1");
        let base = now();
        for i in 0..15 {
            let mut v = VitalsReading::new(visit.id, base + Duration::minutes(i));
            v.pulse_bpm = Some(60 + i as u32);
            insert_vitals(&conn, &v).unwrap();
        }
        let recent = get_recent_vitals(&conn, &visit.id, 10).unwrap();
        assert_eq!(recent.len(), 10);
        assert_eq!(recent[0].pulse_bpm, Some(74));
        assert_eq!(recent[9].pulse_bpm, Some(65));
    }

    #[test]
    fn only_completed_labs_are_listed() {
        let conn = open_memory_database().unwrap();
        let visit = seed_visit(&conn, "H1", "MRN-1");
        let mut ids = Vec::new();
        for name in ["CBC", "Troponin"] {
            let lab = LabTest {
                id: Uuid::new_v4(),
                visit_id: visit.id,
                test_name: name.into(),
                status: LabStatus::Ordered,
                result_value: None,
                unit: None,
                reference_range: None,
                ordered_at: now(),
                completed_at: None,
            };
            insert_lab_test(&conn, &lab).unwrap();
            ids.push(lab.id);
        }
        let entry = LabResultEntry {
            result_value: "0.02".into(),
            unit: Some("ng/mL".into()),
            reference_range: Some("<0.04".into()),
        };
        assert!(complete_lab_test(&conn, &ids[1], &entry, &now()).unwrap());
        assert!(!complete_lab_test(&conn, &ids[1], &entry, &now()).unwrap());

        let done = get_completed_lab_tests(&conn, &visit.id).unwrap();
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].test_name, "Troponin");
        assert_eq!(done[0].status, LabStatus::Completed);
        assert_eq!(get_lab_test(&conn, &ids[0]).unwrap().unwrap().status, LabStatus::Ordered);
    }

    #[test]
    fn prescriptions_round_trip() {
        let conn = open_memory_database().unwrap();
        let visit = seed_visit(&conn, "H1", "MRN-1");
        let rx = Prescription {
            id: Uuid::new_v4(),
            visit_id: visit.id,
            medication: "Aspirin".into(),
            dosage: "75mg".into(),
            frequency: "daily".into(),
            duration_days: Some(30),
            instructions: Some("After food".into()),
            prescribed_by: Some("dr-7".into()),
            prescribed_at: now(),
        };
        insert_prescription(&conn, &rx).unwrap();
        assert_eq!(get_prescriptions_for_visit(&conn, &visit.id).unwrap(), vec![rx]);
    }
}
