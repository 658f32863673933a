//! Domain error taxonomy with structured, leak-free response bodies.

use serde::Serialize;

use crate::db::DatabaseError;

/// Coarse error category an outer API layer maps to a status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    NotFound,
    PermissionDenied,
    Conflict,
    InvalidState,
    InvalidInput,
    Internal,
}

impl ErrorKind {
    /// HTTP-equivalent status for callers that speak HTTP.
    pub fn status_code(&self) -> u16 {
        match self {
            ErrorKind::NotFound => 404,
            ErrorKind::PermissionDenied => 403,
            ErrorKind::Conflict => 409,
            ErrorKind::InvalidState => 409,
            ErrorKind::InvalidInput => 400,
            ErrorKind::Internal => 500,
        }
    }
}

/// Structured error body: kind plus a caller-safe message.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub code: ErrorKind,
    pub message: String,
}

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("{entity_type} not found: {id}")]
    NotFound { entity_type: &'static str, id: String },

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

impl From<rusqlite::Error> for CoreError {
    fn from(err: rusqlite::Error) -> Self {
        CoreError::Database(DatabaseError::from(err))
    }
}

impl CoreError {
    pub fn not_found(entity_type: &'static str, id: impl ToString) -> Self {
        CoreError::NotFound {
            entity_type,
            id: id.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::NotFound { .. } => ErrorKind::NotFound,
            CoreError::PermissionDenied(_) => ErrorKind::PermissionDenied,
            CoreError::Conflict(_) => ErrorKind::Conflict,
            CoreError::InvalidState(_) => ErrorKind::InvalidState,
            CoreError::InvalidInput(_) => ErrorKind::InvalidInput,
            CoreError::Database(DatabaseError::NotFound { .. }) => ErrorKind::NotFound,
            CoreError::Database(_) => ErrorKind::Internal,
        }
    }

    /// Body safe to hand to an outer layer. Storage detail is logged, not returned.
    pub fn to_body(&self) -> ErrorBody {
        let message = match self {
            CoreError::Database(e) => {
                tracing::error!(error = %e, "Storage failure");
                "An internal error occurred".to_string()
            }
            other => other.to_string(),
        };
        ErrorBody {
            code: self.kind(),
            message,
        }
    }
}
