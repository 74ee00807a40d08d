//! Request aggregate - one approval request and all of its signer slots
//!
//! The engine loads the whole aggregate inside a transaction, applies one
//! transition in memory and writes the result back before committing.
//! Every rule of the state machine lives here, free of storage concerns.

use chrono::{DateTime, Utc};
use esign_core::{
    ApprovalRequest, ESignError, ESignResult, RequestDetail, RequestStatus, SignatureId,
    SignerSlot, SlotId, SlotStatus, UserId,
};

/// An approval request with its slots ordered by ordinal
#[derive(Debug, Clone, PartialEq)]
pub struct RequestAggregate {
    pub request: ApprovalRequest,
    pub slots: Vec<SignerSlot>,
}

impl From<RequestDetail> for RequestAggregate {
    fn from(detail: RequestDetail) -> Self {
        Self {
            request: detail.request,
            slots: detail.slots,
        }
    }
}

impl RequestAggregate {
    pub fn into_detail(self) -> RequestDetail {
        RequestDetail {
            request: self.request,
            slots: self.slots,
        }
    }

    /// Check if the request has passed its expiry
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.request.expires_at, Some(at) if now >= at)
    }

    pub fn signed_count(&self) -> u32 {
        self.slots
            .iter()
            .filter(|s| s.status == SlotStatus::Signed)
            .count() as u32
    }

    /// Number of signatures still needed for completion
    pub fn signatures_remaining(&self) -> u32 {
        self.request
            .required_signatures
            .saturating_sub(self.request.current_signatures)
    }

    /// Signatures that can still be collected: signed slots plus pending
    /// slots that are able to sign
    ///
    /// In sequential mode a declined slot blocks every later ordinal.
    pub fn reachable_signatures(&self) -> u32 {
        let blocked_after = if self.request.sequential {
            self.slots
                .iter()
                .filter(|s| s.status == SlotStatus::Declined)
                .map(|s| s.ordinal)
                .min()
        } else {
            None
        };

        let pending = self
            .slots
            .iter()
            .filter(|s| s.status == SlotStatus::Pending)
            .filter(|s| blocked_after.map_or(true, |limit| s.ordinal <= limit))
            .count() as u32;

        self.signed_count() + pending
    }

    /// Derive the request status from the slot counts
    ///
    /// Cancelled and expired requests keep their status.
    pub fn recompute_status(&mut self) {
        if matches!(
            self.request.status,
            RequestStatus::Cancelled | RequestStatus::Expired
        ) {
            return;
        }

        let required = self.request.required_signatures;
        self.request.status = if self.request.current_signatures >= required {
            RequestStatus::Completed
        } else if self.reachable_signatures() < required {
            RequestStatus::Declined
        } else if self.request.current_signatures > 0 {
            RequestStatus::PartiallySigned
        } else {
            RequestStatus::Pending
        };
    }

    fn slot_index(&self, slot_id: SlotId) -> ESignResult<usize> {
        self.slots
            .iter()
            .position(|s| s.id == slot_id)
            .ok_or_else(|| ESignError::not_found("Signer slot", slot_id))
    }

    /// Ownership and single-transition checks shared by sign and decline
    fn check_slot(&self, idx: usize, signer_id: UserId) -> ESignResult<()> {
        let slot = &self.slots[idx];
        if slot.signer_id != signer_id {
            return Err(ESignError::forbidden(
                "You are not the designated signer for this request",
            ));
        }
        if slot.status != SlotStatus::Pending {
            return Err(ESignError::conflict(format!(
                "Signer slot {} is already {}",
                slot.id, slot.status
            )));
        }
        Ok(())
    }

    fn ensure_open(&self, now: DateTime<Utc>) -> ESignResult<()> {
        if self.request.status.is_terminal() {
            return Err(ESignError::conflict(format!(
                "Request {} is already {}",
                self.request.request_number, self.request.status
            )));
        }
        if self.is_expired(now) {
            return Err(ESignError::conflict(format!(
                "Request {} has expired",
                self.request.request_number
            )));
        }
        Ok(())
    }

    fn ensure_turn(&self, idx: usize) -> ESignResult<()> {
        if !self.request.sequential {
            return Ok(());
        }
        let ordinal = self.slots[idx].ordinal;
        let waiting = self
            .slots
            .iter()
            .any(|s| s.ordinal < ordinal && s.status != SlotStatus::Signed);
        if waiting {
            return Err(ESignError::Order(
                "previous signers have not yet signed".to_string(),
            ));
        }
        Ok(())
    }

    /// Mark a slot signed; returns the index of the changed slot
    pub fn sign(
        &mut self,
        slot_id: SlotId,
        signer_id: UserId,
        signature_id: SignatureId,
        now: DateTime<Utc>,
    ) -> ESignResult<usize> {
        let idx = self.slot_index(slot_id)?;
        self.check_slot(idx, signer_id)?;
        self.ensure_open(now)?;
        self.ensure_turn(idx)?;

        let slot = &mut self.slots[idx];
        slot.status = SlotStatus::Signed;
        slot.signature_id = Some(signature_id);
        slot.signed_at = Some(now);

        self.request.current_signatures += 1;
        self.recompute_status();
        if self.request.status == RequestStatus::Completed {
            self.request.completed_at = Some(now);
        }

        debug_assert_eq!(self.request.current_signatures, self.signed_count());
        Ok(idx)
    }

    /// Mark a slot declined; returns the index of the changed slot
    pub fn decline(
        &mut self,
        slot_id: SlotId,
        signer_id: UserId,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> ESignResult<usize> {
        let idx = self.slot_index(slot_id)?;
        self.check_slot(idx, signer_id)?;
        self.ensure_open(now)?;

        let slot = &mut self.slots[idx];
        slot.status = SlotStatus::Declined;
        slot.decline_reason = reason.filter(|r| !r.trim().is_empty());
        slot.declined_at = Some(now);

        self.recompute_status();
        Ok(idx)
    }

    /// Withdraw the request; only its requester may do so
    pub fn cancel(&mut self, acting_user: UserId) -> ESignResult<()> {
        if self.request.requested_by != acting_user {
            return Err(ESignError::forbidden(
                "Only the requester may cancel this request",
            ));
        }
        if self.request.status.is_terminal() {
            return Err(ESignError::conflict(format!(
                "Request {} is already {}",
                self.request.request_number, self.request.status
            )));
        }
        self.request.status = RequestStatus::Cancelled;
        Ok(())
    }

    /// Mark an overdue, still-open request expired; returns whether it changed
    pub fn expire(&mut self, now: DateTime<Utc>) -> bool {
        if self.request.status.is_terminal() || !self.is_expired(now) {
            return false;
        }
        self.request.status = RequestStatus::Expired;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 1, 12, 0, 0).unwrap()
    }

    fn slot(id: SlotId, signer_id: UserId, ordinal: i64) -> SignerSlot {
        SignerSlot {
            id,
            request_id: 1,
            signer_id,
            ordinal,
            status: SlotStatus::Pending,
            signature_id: None,
            decline_reason: None,
            signed_at: None,
            declined_at: None,
        }
    }

    /// Signers 100, 200, 300 at the given ordinals
    fn aggregate(required: u32, sequential: bool, ordinals: [i64; 3]) -> RequestAggregate {
        RequestAggregate {
            request: ApprovalRequest {
                id: 1,
                request_number: "SR-0001".to_string(),
                entity_type: "NC".to_string(),
                entity_id: 42,
                action: "APPROVE_CLOSURE".to_string(),
                title: "Close NC-42".to_string(),
                description: None,
                required_signatures: required,
                current_signatures: 0,
                sequential,
                status: RequestStatus::Pending,
                requested_by: 1,
                created_at: now(),
                expires_at: None,
                completed_at: None,
                metadata: serde_json::json!({}),
            },
            slots: vec![
                slot(10, 100, ordinals[0]),
                slot(20, 200, ordinals[1]),
                slot(30, 300, ordinals[2]),
            ],
        }
    }

    #[test]
    fn test_sequential_out_of_order_rejected() {
        let mut agg = aggregate(3, true, [1, 2, 3]);
        let result = agg.sign(30, 300, 1, now());
        assert!(matches!(result, Err(ESignError::Order(_))));
        assert_eq!(agg.request.current_signatures, 0);
        assert_eq!(agg.slots[2].status, SlotStatus::Pending);
    }

    #[test]
    fn test_sequential_in_order_completes_on_last() {
        let mut agg = aggregate(3, true, [1, 2, 3]);

        agg.sign(10, 100, 1, now()).unwrap();
        assert_eq!(agg.request.status, RequestStatus::PartiallySigned);
        assert!(agg.request.completed_at.is_none());

        agg.sign(20, 200, 2, now()).unwrap();
        assert_eq!(agg.request.status, RequestStatus::PartiallySigned);
        assert!(agg.request.completed_at.is_none());

        agg.sign(30, 300, 3, now()).unwrap();
        assert_eq!(agg.request.status, RequestStatus::Completed);
        assert_eq!(agg.request.current_signatures, 3);
        assert_eq!(agg.request.completed_at, Some(now()));
    }

    #[test]
    fn test_ordinals_need_not_be_contiguous() {
        let mut agg = aggregate(3, true, [10, 50, 20]);
        // Slot 20 has ordinal 50: must wait for ordinal 20 (slot 30)
        agg.sign(10, 100, 1, now()).unwrap();
        assert!(matches!(agg.sign(20, 200, 2, now()), Err(ESignError::Order(_))));
        agg.sign(30, 300, 3, now()).unwrap();
        agg.sign(20, 200, 2, now()).unwrap();
        assert_eq!(agg.request.status, RequestStatus::Completed);
    }

    #[test]
    fn test_parallel_allows_any_order() {
        let mut agg = aggregate(2, false, [1, 2, 3]);
        agg.sign(30, 300, 1, now()).unwrap();
        agg.sign(10, 100, 2, now()).unwrap();
        assert_eq!(agg.request.status, RequestStatus::Completed);
    }

    #[test]
    fn test_wrong_signer_forbidden() {
        let mut agg = aggregate(3, false, [1, 2, 3]);
        assert!(matches!(
            agg.sign(10, 200, 1, now()),
            Err(ESignError::Forbidden(_))
        ));
        assert!(matches!(
            agg.decline(10, 200, None, now()),
            Err(ESignError::Forbidden(_))
        ));
    }

    #[test]
    fn test_double_sign_conflicts_without_recount() {
        let mut agg = aggregate(3, false, [1, 2, 3]);
        agg.sign(10, 100, 1, now()).unwrap();
        assert!(matches!(
            agg.sign(10, 100, 2, now()),
            Err(ESignError::Conflict(_))
        ));
        assert_eq!(agg.request.current_signatures, 1);
        assert_eq!(agg.slots[0].signature_id, Some(1));
    }

    #[test]
    fn test_unknown_slot() {
        let mut agg = aggregate(1, false, [1, 2, 3]);
        assert!(matches!(
            agg.sign(99, 100, 1, now()),
            Err(ESignError::NotFound { .. })
        ));
    }

    #[test]
    fn test_declined_predecessor_is_hard_stop() {
        let mut agg = aggregate(2, true, [1, 2, 3]);
        agg.decline(10, 100, Some("Evidence missing".to_string()), now())
            .unwrap();
        assert_eq!(agg.slots[0].decline_reason.as_deref(), Some("Evidence missing"));

        // Later ordinals can never sign, so the request cannot complete
        assert_eq!(agg.reachable_signatures(), 0);
        assert_eq!(agg.request.status, RequestStatus::Declined);
        assert!(matches!(
            agg.sign(20, 200, 1, now()),
            Err(ESignError::Conflict(_))
        ));
    }

    #[test]
    fn test_parallel_decline_lets_others_proceed() {
        let mut agg = aggregate(2, false, [1, 2, 3]);
        agg.decline(10, 100, None, now()).unwrap();
        assert_eq!(agg.request.status, RequestStatus::Pending);

        agg.sign(20, 200, 1, now()).unwrap();
        agg.sign(30, 300, 2, now()).unwrap();
        assert_eq!(agg.request.status, RequestStatus::Completed);
    }

    #[test]
    fn test_parallel_decline_terminal_when_unreachable() {
        let mut agg = aggregate(3, false, [1, 2, 3]);
        agg.sign(10, 100, 1, now()).unwrap();
        agg.decline(20, 200, None, now()).unwrap();
        assert_eq!(agg.request.status, RequestStatus::Declined);
        assert_eq!(agg.request.current_signatures, 1);
    }

    #[test]
    fn test_decline_twice_conflicts() {
        let mut agg = aggregate(1, false, [1, 2, 3]);
        agg.decline(10, 100, None, now()).unwrap();
        assert!(matches!(
            agg.decline(10, 100, None, now()),
            Err(ESignError::Conflict(_))
        ));
    }

    #[test]
    fn test_expired_request_rejects_transitions() {
        let mut agg = aggregate(2, false, [1, 2, 3]);
        agg.request.expires_at = Some(now() - Duration::minutes(1));

        assert!(matches!(
            agg.sign(10, 100, 1, now()),
            Err(ESignError::Conflict(_))
        ));
        assert!(matches!(
            agg.decline(20, 200, None, now()),
            Err(ESignError::Conflict(_))
        ));
        assert_eq!(agg.slots[0].status, SlotStatus::Pending);

        assert!(agg.expire(now()));
        assert_eq!(agg.request.status, RequestStatus::Expired);
        assert!(!agg.expire(now()));
    }

    #[test]
    fn test_not_yet_expired() {
        let mut agg = aggregate(1, false, [1, 2, 3]);
        agg.request.expires_at = Some(now() + Duration::hours(1));
        assert!(!agg.expire(now()));
        agg.sign(10, 100, 1, now()).unwrap();
        assert_eq!(agg.request.status, RequestStatus::Completed);
    }

    #[test]
    fn test_completed_request_is_closed_to_remaining_slots() {
        let mut agg = aggregate(1, false, [1, 2, 3]);
        agg.sign(10, 100, 1, now()).unwrap();
        assert!(matches!(
            agg.sign(20, 200, 2, now()),
            Err(ESignError::Conflict(_))
        ));
        assert_eq!(agg.request.current_signatures, 1);
    }

    #[test]
    fn test_cancel() {
        let mut agg = aggregate(2, false, [1, 2, 3]);
        assert!(matches!(agg.cancel(100), Err(ESignError::Forbidden(_))));
        agg.cancel(1).unwrap();
        assert_eq!(agg.request.status, RequestStatus::Cancelled);
        assert!(matches!(agg.cancel(1), Err(ESignError::Conflict(_))));
        assert!(matches!(
            agg.sign(10, 100, 1, now()),
            Err(ESignError::Conflict(_))
        ));
    }

    #[test]
    fn test_signatures_remaining() {
        let mut agg = aggregate(2, false, [1, 2, 3]);
        assert_eq!(agg.signatures_remaining(), 2);
        agg.sign(10, 100, 1, now()).unwrap();
        assert_eq!(agg.signatures_remaining(), 1);
    }
}
