//! Storage errors

use esign_core::ESignError;
use thiserror::Error;

/// Errors from the SQLite store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt row in {table}: {reason}")]
    Corrupt { table: &'static str, reason: String },

    #[error("Database lock poisoned")]
    Poisoned,
}

impl StoreError {
    pub fn corrupt(table: &'static str, reason: impl Into<String>) -> Self {
        StoreError::Corrupt {
            table,
            reason: reason.into(),
        }
    }

    /// UNIQUE / CHECK / trigger violations
    pub fn is_constraint_violation(&self) -> bool {
        matches!(
            self,
            StoreError::Database(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation
        )
    }
}

impl From<StoreError> for ESignError {
    fn from(err: StoreError) -> Self {
        if err.is_constraint_violation() {
            ESignError::Conflict(err.to_string())
        } else {
            ESignError::Storage(err.to_string())
        }
    }
}
