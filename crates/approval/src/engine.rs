//! Approval engine - multi-signer request lifecycle

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use esign_core::{
    require, signing_now, ApprovalRequest, ESignError, ESignResult, NewRequest, Policy,
    RequestDetail, RequestFilter, RequestId, RequestPage, RequestStatus, SignatureId, SignerSlot,
    SlotId, SlotStatus, UserId,
};
use esign_policy::PolicyResolver;
use esign_store::Database;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::request::RequestAggregate;
use crate::store;

/// Configuration for the approval engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalConfig {
    /// Prefix of human-readable request numbers
    #[serde(default = "default_prefix")]
    pub request_number_prefix: String,

    /// Minimum digits of the numeric part (zero padded)
    #[serde(default = "default_width")]
    pub request_number_width: usize,

    #[serde(default = "default_page_size")]
    pub default_page_size: u32,

    #[serde(default = "default_max_page_size")]
    pub max_page_size: u32,
}

fn default_prefix() -> String {
    "SR-".to_string()
}

fn default_width() -> usize {
    4
}

fn default_page_size() -> u32 {
    20
}

fn default_max_page_size() -> u32 {
    100
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self {
            request_number_prefix: default_prefix(),
            request_number_width: default_width(),
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
        }
    }
}

impl ApprovalConfig {
    pub fn format_number(&self, sequence_no: i64) -> String {
        format!(
            "{}{:0width$}",
            self.request_number_prefix,
            sequence_no,
            width = self.request_number_width
        )
    }
}

/// Statistics about approval requests
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalStats {
    pub pending: u64,
    pub partially_signed: u64,
    pub completed: u64,
    pub declined: u64,
    pub expired: u64,
    pub cancelled: u64,
}

impl ApprovalStats {
    /// Requests still accepting signatures
    pub fn open(&self) -> u64 {
        self.pending + self.partially_signed
    }
}

/// Multi-signer approval engine
pub struct ApprovalEngine {
    db: Arc<Database>,
    policies: Arc<PolicyResolver>,
    config: ApprovalConfig,
}

impl ApprovalEngine {
    pub fn new(db: Arc<Database>, policies: Arc<PolicyResolver>, config: ApprovalConfig) -> Self {
        Self {
            db,
            policies,
            config,
        }
    }

    /// Create an engine with default config
    pub fn with_database(db: Arc<Database>, policies: Arc<PolicyResolver>) -> Self {
        Self::new(db, policies, ApprovalConfig::default())
    }

    pub fn config(&self) -> &ApprovalConfig {
        &self.config
    }

    /// Open a request, resolving defaults from the active policy
    pub fn create_request(
        &self,
        new: NewRequest,
        requested_by: UserId,
    ) -> ESignResult<RequestDetail> {
        let policy = self.policies.resolve(&new.entity_type, &new.action)?;
        self.create_request_with_policy(new, requested_by, policy.as_ref())
    }

    /// Open a request against an already resolved policy
    ///
    /// Explicit values on `new` win over the policy; without either,
    /// every listed signer must sign and signing is parallel.
    pub fn create_request_with_policy(
        &self,
        new: NewRequest,
        requested_by: UserId,
        policy: Option<&Policy>,
    ) -> ESignResult<RequestDetail> {
        require("entity_type", &new.entity_type)?;
        require("action", &new.action)?;
        require("title", &new.title)?;
        validate_signers(&new)?;

        let signer_count = new.signers.len() as u32;
        let required = new
            .required_signatures
            .or(policy.map(|p| p.required_signatures))
            .unwrap_or(signer_count);
        if required == 0 || required > signer_count {
            return Err(ESignError::validation(format!(
                "required_signatures must be between 1 and {} (the number of signers), got {}",
                signer_count, required
            )));
        }

        let now = signing_now();
        let expires_at = match (new.expires_at, policy) {
            (Some(at), _) => Some(at),
            (None, Some(policy)) => policy.expiry_from(now)?,
            (None, None) => None,
        };
        if matches!(expires_at, Some(at) if at <= now) {
            return Err(ESignError::validation("expires_at must be in the future"));
        }

        let sequential = new
            .sequential
            .or(policy.map(|p| p.sequential))
            .unwrap_or(false);

        let detail = self.db.write(|tx| {
            let sequence_no = store::next_sequence(tx)?;
            let mut request = ApprovalRequest {
                id: 0,
                request_number: self.config.format_number(sequence_no),
                entity_type: new.entity_type.clone(),
                entity_id: new.entity_id,
                action: new.action.clone(),
                title: new.title.trim().to_string(),
                description: new.description.clone().filter(|d| !d.trim().is_empty()),
                required_signatures: required,
                current_signatures: 0,
                sequential,
                status: RequestStatus::Pending,
                requested_by,
                created_at: now,
                expires_at,
                completed_at: None,
                metadata: new
                    .metadata
                    .clone()
                    .unwrap_or_else(|| serde_json::json!({})),
            };
            request.id = store::insert_request(tx, &request, sequence_no)?;

            for (position, assignment) in new.signers.iter().enumerate() {
                let slot = SignerSlot {
                    id: 0,
                    request_id: request.id,
                    signer_id: assignment.signer_id,
                    ordinal: assignment.ordinal.unwrap_or(position as i64 + 1),
                    status: SlotStatus::Pending,
                    signature_id: None,
                    decline_reason: None,
                    signed_at: None,
                    declined_at: None,
                };
                store::insert_slot(tx, &slot)?;
            }

            Self::load(tx, request.id)
        })?;

        tracing::info!(
            request_id = detail.request.id,
            request_number = %detail.request.request_number,
            entity_type = %detail.request.entity_type,
            entity_id = detail.request.entity_id,
            action = %detail.request.action,
            required = detail.request.required_signatures,
            signers = detail.slots.len(),
            sequential = detail.request.sequential,
            policy_id = policy.map(|p| p.id),
            "Approval request created"
        );
        Ok(detail)
    }

    pub fn get_request(&self, id: RequestId) -> ESignResult<RequestDetail> {
        self.db.read(|conn| Self::load(conn, id))
    }

    fn load(conn: &Connection, id: RequestId) -> ESignResult<RequestDetail> {
        store::load(conn, id)?.ok_or_else(|| ESignError::not_found("Signature request", id))
    }

    /// The request owning a signer slot
    pub fn request_for_slot_in(
        &self,
        conn: &Connection,
        slot_id: SlotId,
    ) -> ESignResult<RequestDetail> {
        let request_id = store::request_id_for_slot(conn, slot_id)?
            .ok_or_else(|| ESignError::not_found("Signer slot", slot_id))?;
        Self::load(conn, request_id)
    }

    /// Record a signature against a slot in its own transaction
    pub fn record_sign(
        &self,
        slot_id: SlotId,
        signer_id: UserId,
        signature_id: SignatureId,
    ) -> ESignResult<RequestDetail> {
        self.db
            .write(|tx| self.record_sign_in(tx, slot_id, signer_id, signature_id, signing_now()))
    }

    /// Record a signature against a slot inside a caller-owned transaction
    pub fn record_sign_in(
        &self,
        conn: &Connection,
        slot_id: SlotId,
        signer_id: UserId,
        signature_id: SignatureId,
        now: DateTime<Utc>,
    ) -> ESignResult<RequestDetail> {
        let mut aggregate = RequestAggregate::from(self.request_for_slot_in(conn, slot_id)?);
        let idx = aggregate.sign(slot_id, signer_id, signature_id, now)?;
        Self::persist(conn, &aggregate, idx)?;

        tracing::info!(
            request_number = %aggregate.request.request_number,
            slot_id,
            signer_id,
            signature_id,
            signed = aggregate.request.current_signatures,
            required = aggregate.request.required_signatures,
            status = %aggregate.request.status,
            "Signer slot signed"
        );
        Ok(aggregate.into_detail())
    }

    /// Decline a slot; the request is declined once it can no longer complete
    pub fn decline(
        &self,
        slot_id: SlotId,
        signer_id: UserId,
        reason: Option<String>,
    ) -> ESignResult<RequestDetail> {
        self.db.write(|tx| {
            let now = signing_now();
            let mut aggregate = RequestAggregate::from(self.request_for_slot_in(tx, slot_id)?);
            let idx = aggregate.decline(slot_id, signer_id, reason, now)?;
            Self::persist(tx, &aggregate, idx)?;

            tracing::info!(
                request_number = %aggregate.request.request_number,
                slot_id,
                signer_id,
                status = %aggregate.request.status,
                "Signer slot declined"
            );
            Ok(aggregate.into_detail())
        })
    }

    /// Cancel an open request; only its requester may do so
    pub fn cancel_request(&self, id: RequestId, acting_user: UserId) -> ESignResult<RequestDetail> {
        self.db.write(|tx| {
            let mut aggregate = RequestAggregate::from(Self::load(tx, id)?);
            aggregate.cancel(acting_user)?;
            store::update_request(tx, &aggregate.request)?;

            tracing::info!(
                request_number = %aggregate.request.request_number,
                cancelled_by = acting_user,
                "Approval request cancelled"
            );
            Ok(aggregate.into_detail())
        })
    }

    fn persist(conn: &Connection, aggregate: &RequestAggregate, idx: usize) -> ESignResult<()> {
        let slot = &aggregate.slots[idx];
        if store::transition_slot(conn, slot)? == 0 {
            return Err(ESignError::conflict(format!(
                "Signer slot {} is no longer pending",
                slot.id
            )));
        }
        store::update_request(conn, &aggregate.request)?;
        Ok(())
    }

    /// List requests matching a filter, newest first
    pub fn list_requests(&self, filter: &RequestFilter) -> ESignResult<RequestPage> {
        let page = filter.page.unwrap_or(1).max(1);
        let limit = filter
            .limit
            .unwrap_or(self.config.default_page_size)
            .clamp(1, self.config.max_page_size);

        let (total, items) = self
            .db
            .read(|conn| store::list(conn, filter, page, limit).map_err(ESignError::from))?;

        Ok(RequestPage {
            total,
            page,
            limit,
            items,
        })
    }

    /// Persist EXPIRED on every open request whose expiry has passed
    pub fn expire_overdue(&self, now: DateTime<Utc>) -> ESignResult<Vec<ApprovalRequest>> {
        let expired = self.db.write(|tx| {
            let mut expired = Vec::new();
            for id in store::overdue_ids(tx, &now)? {
                let mut aggregate = RequestAggregate::from(Self::load(tx, id)?);
                if aggregate.expire(now) {
                    store::update_request(tx, &aggregate.request)?;
                    expired.push(aggregate.request);
                }
            }
            Ok::<_, ESignError>(expired)
        })?;

        if !expired.is_empty() {
            tracing::info!(count = expired.len(), "Expired overdue approval requests");
        }
        Ok(expired)
    }

    /// Get request counts by status
    pub fn stats(&self) -> ESignResult<ApprovalStats> {
        self.db.read(|conn| {
            Ok(ApprovalStats {
                pending: store::count_by_status(conn, RequestStatus::Pending)?,
                partially_signed: store::count_by_status(conn, RequestStatus::PartiallySigned)?,
                completed: store::count_by_status(conn, RequestStatus::Completed)?,
                declined: store::count_by_status(conn, RequestStatus::Declined)?,
                expired: store::count_by_status(conn, RequestStatus::Expired)?,
                cancelled: store::count_by_status(conn, RequestStatus::Cancelled)?,
            })
        })
    }
}

fn validate_signers(new: &NewRequest) -> ESignResult<()> {
    if new.signers.is_empty() {
        return Err(ESignError::validation("At least one signer is required"));
    }

    let mut seen = HashSet::new();
    for assignment in &new.signers {
        if !seen.insert(assignment.signer_id) {
            return Err(ESignError::validation(format!(
                "Signer {} is listed more than once",
                assignment.signer_id
            )));
        }
        if matches!(assignment.ordinal, Some(ordinal) if ordinal < 1) {
            return Err(ESignError::validation(format!(
                "Ordinal of signer {} must be positive",
                assignment.signer_id
            )));
        }
    }
    Ok(())
}
