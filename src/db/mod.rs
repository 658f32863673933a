pub mod sqlite;
pub mod repository;

pub use sqlite::*;
pub use repository::*;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(rusqlite::Error),

    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound { entity_type: String, id: String },

    #[error("Invalid enum value for {field}: {value}")]
    InvalidEnum { field: String, value: String },

    #[error("Migration failed at version {version}: {reason}")]
    MigrationFailed { version: i64, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Constraint violated: {0}")]
    ConstraintViolation(String),

    /// A UNIQUE index rejected the write. Carries SQLite's message, which
    /// names the offending columns (e.g. `global_records.dedup_key`).
    #[error("Unique constraint violated: {0}")]
    UniqueViolation(String),
}

impl From<rusqlite::Error> for DatabaseError {
    fn from(err: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(ffi_err, msg) = &err {
            if ffi_err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                || ffi_err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
            {
                return DatabaseError::UniqueViolation(
                    msg.clone().unwrap_or_else(|| ffi_err.to_string()),
                );
            }
        }
        DatabaseError::Sqlite(err)
    }
}

impl DatabaseError {
    /// True when a UNIQUE index touching `column` rejected the write.
    pub fn is_unique_violation_on(&self, column: &str) -> bool {
        matches!(self, DatabaseError::UniqueViolation(msg) if msg.contains(column))
    }
}
