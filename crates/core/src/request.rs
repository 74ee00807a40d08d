//! Approval requests and signer slots

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use crate::signature::{SignatureId, UserId};

pub type RequestId = i64;
pub type SlotId = i64;

/// Status of an approval request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestStatus {
    /// No signatures yet
    Pending,
    /// At least one signature, fewer than required
    PartiallySigned,
    /// Required signatures collected
    Completed,
    /// Declines left too few signers to ever complete
    Declined,
    /// Passed `expires_at` before completion
    Expired,
    /// Withdrawn by the requester
    Cancelled,
}

impl RequestStatus {
    /// No further slot transitions are accepted
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RequestStatus::Completed
                | RequestStatus::Declined
                | RequestStatus::Expired
                | RequestStatus::Cancelled
        )
    }

    pub fn all() -> [RequestStatus; 6] {
        [
            RequestStatus::Pending,
            RequestStatus::PartiallySigned,
            RequestStatus::Completed,
            RequestStatus::Declined,
            RequestStatus::Expired,
            RequestStatus::Cancelled,
        ]
    }
}

/// Status of one signer's slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SlotStatus {
    Pending,
    Signed,
    Declined,
}

/// A regulated action awaiting N signatures
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub id: RequestId,

    /// Human-readable number, e.g. `SR-0007`
    pub request_number: String,

    pub entity_type: String,
    pub entity_id: i64,
    pub action: String,

    pub title: String,
    pub description: Option<String>,

    pub required_signatures: u32,
    pub current_signatures: u32,

    /// Signers must act in ordinal order
    pub sequential: bool,

    pub status: RequestStatus,
    pub requested_by: UserId,

    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,

    pub metadata: serde_json::Value,
}

/// One designated signer's position in a request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignerSlot {
    pub id: SlotId,
    pub request_id: RequestId,
    pub signer_id: UserId,

    /// Only relative order matters; values need not be contiguous
    pub ordinal: i64,

    pub status: SlotStatus,
    pub signature_id: Option<SignatureId>,
    pub decline_reason: Option<String>,
    pub signed_at: Option<DateTime<Utc>>,
    pub declined_at: Option<DateTime<Utc>>,
}

/// A request together with its slots, ordered by ordinal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestDetail {
    pub request: ApprovalRequest,
    pub slots: Vec<SignerSlot>,
}

impl RequestDetail {
    pub fn slot(&self, slot_id: SlotId) -> Option<&SignerSlot> {
        self.slots.iter().find(|s| s.id == slot_id)
    }

    pub fn slot_for(&self, signer_id: UserId) -> Option<&SignerSlot> {
        self.slots.iter().find(|s| s.signer_id == signer_id)
    }
}

/// A signer designated at request creation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignerAssignment {
    pub signer_id: UserId,
    /// Defaults to the 1-based position in the signer list
    #[serde(default)]
    pub ordinal: Option<i64>,
}

impl SignerAssignment {
    pub fn new(signer_id: UserId) -> Self {
        Self {
            signer_id,
            ordinal: None,
        }
    }

    pub fn at(signer_id: UserId, ordinal: i64) -> Self {
        Self {
            signer_id,
            ordinal: Some(ordinal),
        }
    }
}

/// Input for creating an approval request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRequest {
    pub entity_type: String,
    pub entity_id: i64,
    pub action: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub signers: Vec<SignerAssignment>,
    /// Falls back to the policy, then to the number of signers
    #[serde(default)]
    pub required_signatures: Option<u32>,
    /// Falls back to the policy's expiration window
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    /// Falls back to the policy's sequential flag
    #[serde(default)]
    pub sequential: Option<bool>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

impl NewRequest {
    pub fn new(
        entity_type: impl Into<String>,
        entity_id: i64,
        action: impl Into<String>,
        title: impl Into<String>,
        signers: Vec<SignerAssignment>,
    ) -> Self {
        Self {
            entity_type: entity_type.into(),
            entity_id,
            action: action.into(),
            title: title.into(),
            description: None,
            signers,
            required_signatures: None,
            expires_at: None,
            sequential: None,
            metadata: None,
        }
    }

    pub fn with_required(mut self, required: u32) -> Self {
        self.required_signatures = Some(required);
        self
    }

    pub fn with_sequential(mut self, sequential: bool) -> Self {
        self.sequential = Some(sequential);
        self
    }

    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Filters for listing requests
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestFilter {
    pub status: Option<RequestStatus>,
    pub entity_type: Option<String>,
    pub action: Option<String>,
    pub requested_by: Option<UserId>,
    /// Case-insensitive match on request number or title
    pub search: Option<String>,
    /// 1-based
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

/// One page of requests, newest first
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestPage {
    pub total: u64,
    pub page: u32,
    pub limit: u32,
    pub items: Vec<RequestDetail>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_terminal_statuses() {
        assert!(!RequestStatus::Pending.is_terminal());
        assert!(!RequestStatus::PartiallySigned.is_terminal());
        assert!(RequestStatus::Completed.is_terminal());
        assert!(RequestStatus::Declined.is_terminal());
        assert!(RequestStatus::Expired.is_terminal());
        assert!(RequestStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_status_text() {
        assert_eq!(RequestStatus::PartiallySigned.to_string(), "PARTIALLY_SIGNED");
        assert_eq!(
            RequestStatus::from_str("PARTIALLY_SIGNED").unwrap(),
            RequestStatus::PartiallySigned
        );
        assert_eq!(SlotStatus::from_str("DECLINED").unwrap(), SlotStatus::Declined);
    }

    #[test]
    fn test_new_request_from_partial_json() {
        let json = r#"{
            "entity_type": "NC",
            "entity_id": 42,
            "action": "APPROVE_CLOSURE",
            "title": "Close NC-42",
            "signers": [{"signer_id": 1}, {"signer_id": 2, "ordinal": 5}]
        }"#;
        let req: NewRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.signers[0], SignerAssignment::new(1));
        assert_eq!(req.signers[1], SignerAssignment::at(2, 5));
        assert!(req.required_signatures.is_none());
        assert!(req.sequential.is_none());
    }
}
