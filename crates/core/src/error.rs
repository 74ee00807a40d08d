//! E-signature errors
//!
//! One taxonomy is shared by every component so that callers can tell
//! "not allowed" from "already happened" from "out of turn".

use thiserror::Error;

/// Errors raised by the signing engine
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ESignError {
    /// Missing or malformed input
    #[error("Validation error: {0}")]
    Validation(String),

    /// Credential re-verification failed
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Acting identity is not the designated signer (or the module is disabled)
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// State is already terminal, or the action duplicates an existing one
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Sequential signing precondition violated
    #[error("Sequential signing required: {0}")]
    Order(String),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// Infrastructure failure (database, corrupt row)
    #[error("Storage error: {0}")]
    Storage(String),
}

impl ESignError {
    pub fn validation(msg: impl Into<String>) -> Self {
        ESignError::Validation(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        ESignError::Conflict(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        ESignError::Forbidden(msg.into())
    }

    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        ESignError::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            ESignError::Validation(_) => "VALIDATION",
            ESignError::Unauthorized(_) => "UNAUTHORIZED",
            ESignError::Forbidden(_) => "FORBIDDEN",
            ESignError::Conflict(_) => "CONFLICT",
            ESignError::Order(_) => "ORDER",
            ESignError::NotFound { .. } => "NOT_FOUND",
            ESignError::Storage(_) => "STORAGE",
        }
    }

    /// Suggested HTTP status for a controller layer
    pub fn status_code(&self) -> u16 {
        match self {
            ESignError::Validation(_) => 400,
            ESignError::Unauthorized(_) => 401,
            ESignError::Forbidden(_) => 403,
            ESignError::NotFound { .. } => 404,
            ESignError::Conflict(_) | ESignError::Order(_) => 409,
            ESignError::Storage(_) => 500,
        }
    }

    /// True for errors the caller can correct by changing the request
    pub fn is_client_error(&self) -> bool {
        self.status_code() < 500
    }
}

/// Result type for e-signature operations
pub type ESignResult<T> = Result<T, ESignError>;

/// Reject an empty (or whitespace-only) required field
pub fn require(field: &'static str, value: &str) -> ESignResult<()> {
    if value.trim().is_empty() {
        return Err(ESignError::Validation(format!("{} is required", field)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_distinct() {
        let errors = [
            ESignError::validation("x"),
            ESignError::Unauthorized("x".into()),
            ESignError::forbidden("x"),
            ESignError::conflict("x"),
            ESignError::Order("x".into()),
            ESignError::not_found("Signature", 1),
            ESignError::Storage("x".into()),
        ];
        let mut codes: Vec<_> = errors.iter().map(|e| e.code()).collect();
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(ESignError::validation("x").status_code(), 400);
        assert_eq!(ESignError::Unauthorized("x".into()).status_code(), 401);
        assert_eq!(ESignError::forbidden("x").status_code(), 403);
        assert_eq!(ESignError::not_found("Policy", 7).status_code(), 404);
        assert!(!ESignError::Storage("disk".into()).is_client_error());
    }

    #[test]
    fn test_not_found_message() {
        let err = ESignError::not_found("Signer slot", 42);
        assert_eq!(err.to_string(), "Signer slot not found: 42");
    }

    #[test]
    fn test_require() {
        assert!(require("title", "Closure").is_ok());
        assert!(matches!(require("title", "   "), Err(ESignError::Validation(_))));
    }
}
