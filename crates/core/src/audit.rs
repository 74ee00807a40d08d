//! Audit logger collaborator
//!
//! The engine emits events; storing them is somebody else's job. Sinks are
//! best-effort from the engine's point of view.

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use thiserror::Error;

use crate::signature::UserId;

/// Audit action names
pub mod actions {
    /// Signature applied
    pub const ESIGN_CREATE: &str = "ESIGN_CREATE";
    /// Credential re-verification failed (security event)
    pub const ESIGN_FAILED: &str = "ESIGN_FAILED";
    /// Approval request created
    pub const ESIGN_REQUEST_CREATE: &str = "ESIGN_REQUEST_CREATE";
    /// Approval request cancelled by its requester
    pub const ESIGN_REQUEST_CANCEL: &str = "ESIGN_REQUEST_CANCEL";
    /// Signer declined a slot
    pub const ESIGN_DECLINE: &str = "ESIGN_DECLINE";
    /// Signature revoked
    pub const ESIGN_INVALIDATE: &str = "ESIGN_INVALIDATE";
    /// Policy created
    pub const ESIGN_POLICY_CREATE: &str = "ESIGN_POLICY_CREATE";
    /// Policy updated
    pub const ESIGN_POLICY_UPDATE: &str = "ESIGN_POLICY_UPDATE";
}

/// Audit severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

/// One audit entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub actor_id: UserId,
    pub action: String,
    pub entity_type: String,
    pub entity_id: Option<i64>,
    pub description: String,
    pub metadata: serde_json::Value,
    pub severity: Severity,
}

impl AuditEvent {
    pub fn info(
        actor_id: UserId,
        action: &str,
        entity_type: &str,
        entity_id: Option<i64>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            actor_id,
            action: action.to_string(),
            entity_type: entity_type.to_string(),
            entity_id,
            description: description.into(),
            metadata: serde_json::Value::Object(Default::default()),
            severity: Severity::Info,
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    /// Failed-attempt events are security events, not normal entries
    pub fn is_failed_attempt(&self) -> bool {
        self.action == actions::ESIGN_FAILED
    }
}

/// Audit sink failure
#[derive(Debug, Error)]
#[error("Audit sink failed: {0}")]
pub struct AuditError(pub String);

/// External audit logger
pub trait AuditLogger: Send + Sync {
    fn record(&self, event: AuditEvent) -> Result<(), AuditError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_builder() {
        let event = AuditEvent::info(1, actions::ESIGN_FAILED, "esignature", None, "bad password")
            .with_metadata(json!({"reason": "invalid_password"}))
            .with_severity(Severity::Warning);
        assert!(event.is_failed_attempt());
        assert_eq!(event.severity, Severity::Warning);
        assert_eq!(event.metadata["reason"], "invalid_password");
    }

    #[test]
    fn test_default_metadata_is_object() {
        let event = AuditEvent::info(1, actions::ESIGN_CREATE, "esignature", Some(5), "signed");
        assert!(event.metadata.is_object());
        assert!(!event.is_failed_attempt());
    }
}
