use rusqlite::{params, Connection, OptionalExtension};

use super::{col_datetime, fmt_datetime};
use crate::db::DatabaseError;
use crate::models::Hospital;

pub fn insert_hospital(conn: &Connection, hospital: &Hospital) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO hospitals (id, name, is_active, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![
            hospital.id,
            hospital.name,
            hospital.is_active as i32,
            fmt_datetime(&hospital.created_at),
        ],
    )?;
    Ok(())
}

pub fn get_hospital(conn: &Connection, id: &str) -> Result<Option<Hospital>, DatabaseError> {
    conn.query_row(
        "SELECT id, name, is_active, created_at FROM hospitals WHERE id = ?1",
        params![id],
        |row| {
            Ok(Hospital {
                id: row.get(0)?,
                name: row.get(1)?,
                is_active: row.get::<_, i32>(2)? != 0,
                created_at: col_datetime(row, 3)?,
            })
        },
    )
    .optional()
    .map_err(DatabaseError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::fixtures::{now, seed_hospital};
    use crate::db::sqlite::open_memory_database;

    #[test]
    fn insert_and_get() {
        let conn = open_memory_database().unwrap();
        seed_hospital(&conn, "H1");
        let h = get_hospital(&conn, "H1").unwrap().unwrap();
        assert_eq!(h.name, "H1 General");
        assert!(h.is_active);
        assert!(get_hospital(&conn, "H9").unwrap().is_none());
    }

    #[test]
    fn duplicate_id_is_unique_violation() {
        let conn = open_memory_database().unwrap();
        seed_hospital(&conn, "H1");
        let err = insert_hospital(
            &conn,
            &Hospital { id: "H1".into(), name: "Again".into(), is_active: true, created_at: now() },
        )
        .unwrap_err();
        assert!(matches!(err, DatabaseError::UniqueViolation(_)));
    }
}
