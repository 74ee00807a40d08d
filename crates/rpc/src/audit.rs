//! Audit sinks
//!
//! `TracingAuditLogger` writes each event as a structured tracing record
//! for log shipping. `MemoryAuditLogger` keeps events in memory for
//! inspection.

use std::sync::{Mutex, PoisonError};

use esign_core::{AuditError, AuditEvent, AuditLogger, Severity};

/// Emits audit events through `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditLogger;

impl AuditLogger for TracingAuditLogger {
    fn record(&self, event: AuditEvent) -> Result<(), AuditError> {
        let metadata = event.metadata.to_string();
        match event.severity {
            Severity::Info => tracing::info!(
                target: "esign::audit",
                event_type = %event.action,
                actor_id = event.actor_id,
                entity_type = %event.entity_type,
                entity_id = event.entity_id,
                severity = %event.severity,
                metadata = %metadata,
                "{}",
                event.description
            ),
            Severity::Warning => tracing::warn!(
                target: "esign::audit",
                event_type = %event.action,
                actor_id = event.actor_id,
                entity_type = %event.entity_type,
                entity_id = event.entity_id,
                severity = %event.severity,
                metadata = %metadata,
                "{}",
                event.description
            ),
            Severity::Critical => tracing::error!(
                target: "esign::audit",
                event_type = %event.action,
                actor_id = event.actor_id,
                entity_type = %event.entity_type,
                entity_id = event.entity_id,
                severity = %event.severity,
                metadata = %metadata,
                "{}",
                event.description
            ),
        }
        Ok(())
    }
}

/// Keeps every recorded event in memory
#[derive(Debug, Default)]
pub struct MemoryAuditLogger {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Events recorded under one action name
    pub fn events_for(&self, action: &str) -> Vec<AuditEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.action == action)
            .collect()
    }

    pub fn failed_attempts(&self) -> Vec<AuditEvent> {
        self.events()
            .into_iter()
            .filter(AuditEvent::is_failed_attempt)
            .collect()
    }
}

impl AuditLogger for MemoryAuditLogger {
    fn record(&self, event: AuditEvent) -> Result<(), AuditError> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use esign_core::actions;

    #[test]
    fn test_memory_logger_collects() {
        let logger = MemoryAuditLogger::new();
        logger
            .record(AuditEvent::info(1, actions::ESIGN_CREATE, "esignature", Some(3), "signed"))
            .unwrap();
        logger
            .record(
                AuditEvent::info(1, actions::ESIGN_FAILED, "esignature", None, "bad password")
                    .with_severity(Severity::Warning),
            )
            .unwrap();

        assert_eq!(logger.events().len(), 2);
        assert_eq!(logger.events_for(actions::ESIGN_CREATE).len(), 1);
        assert_eq!(logger.failed_attempts().len(), 1);
    }

    #[test]
    fn test_tracing_logger_never_fails() {
        let logger = TracingAuditLogger;
        for severity in [Severity::Info, Severity::Warning, Severity::Critical] {
            let event = AuditEvent::info(1, actions::ESIGN_INVALIDATE, "esignature", Some(1), "x")
                .with_severity(severity);
            assert!(logger.record(event).is_ok());
        }
    }
}
