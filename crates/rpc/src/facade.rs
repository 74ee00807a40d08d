//! Signing facade
//!
//! The one entry point a controller layer talks to. It re-verifies
//! credentials, runs the ledger and approval engine inside shared
//! transactions and reports every outcome to the audit logger.
//!
//! Audit logging is best-effort: a failing sink is logged and never
//! undoes or fails the operation it describes.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use esign_approval::{ApprovalEngine, ApprovalStats};
use esign_core::{
    actions, require, signing_now, ApprovalRequest, AuditEvent, AuditLogger, Capabilities,
    CredentialStore, ESignError, ESignResult, NewPolicy, NewRequest, OriginMeta, Policy, PolicyId,
    PolicyUpdate, RequestDetail, RequestFilter, RequestId, RequestPage, Severity, Signature,
    SignatureDraft, SignatureId, SignatureMethod, SignatureVerification, SlotId, UserId,
};
use esign_ledger::SignatureLedger;
use esign_policy::PolicyResolver;
use esign_store::Database;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::config::AppConfig;
use crate::credential::CredentialReverifier;

/// Audit entity type for signature events, keyed by signature id
const AUDIT_ENTITY: &str = "esignature";

/// Audit entity type for request events, keyed by request id
const AUDIT_REQUEST_ENTITY: &str = "esign_request";

/// Audit entity type for signer slot events, keyed by slot id
const AUDIT_SLOT_ENTITY: &str = "esign_request_signer";

/// Audit entity type for policy events
const AUDIT_POLICY_ENTITY: &str = "esignature_policy";

/// Input of a signing call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignCommand {
    pub entity_type: String,
    pub entity_id: i64,
    pub action: String,
    /// e.g. "approved", "reviewed"
    pub meaning: String,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub method: Option<SignatureMethod>,
    /// Presented secret, re-verified on every call
    pub credential: String,
    /// Signer slot this signature fulfils, if any
    #[serde(default)]
    pub slot_id: Option<SlotId>,
    #[serde(default)]
    pub origin: OriginMeta,
}

/// Result of a successful signing call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignOutcome {
    pub signature: Signature,
    /// The request after the slot transition, for slot-linked signs
    pub request: Option<RequestDetail>,
}

pub struct SigningFacade {
    db: Arc<Database>,
    ledger: SignatureLedger,
    policies: Arc<PolicyResolver>,
    approvals: ApprovalEngine,
    credentials: CredentialReverifier,
    audit: Arc<dyn AuditLogger>,
}

impl SigningFacade {
    pub fn new(
        db: Arc<Database>,
        config: &AppConfig,
        credentials: Arc<dyn CredentialStore>,
        audit: Arc<dyn AuditLogger>,
    ) -> Self {
        let policies = Arc::new(PolicyResolver::new(db.clone(), config.policy.clone()));
        Self {
            ledger: SignatureLedger::new(db.clone(), config.ledger.clone()),
            approvals: ApprovalEngine::new(db.clone(), policies.clone(), config.approval.clone()),
            policies,
            credentials: CredentialReverifier::new(credentials),
            audit,
            db,
        }
    }

    /// Create a facade with default config
    pub fn with_defaults(
        db: Arc<Database>,
        credentials: Arc<dyn CredentialStore>,
        audit: Arc<dyn AuditLogger>,
    ) -> Self {
        Self::new(db, &AppConfig::default(), credentials, audit)
    }

    fn audit(&self, event: AuditEvent) {
        let action = event.action.clone();
        if let Err(e) = self.audit.record(event) {
            tracing::warn!(event_type = %action, error = %e, "Audit sink failed; continuing");
        }
    }

    /// Apply an electronic signature
    ///
    /// The signature row and the slot transition commit together: if the
    /// slot rejects the signer, no signature is left behind.
    pub fn sign(
        &self,
        caps: &Capabilities,
        acting_user: UserId,
        cmd: SignCommand,
    ) -> ESignResult<SignOutcome> {
        require("entity_type", &cmd.entity_type)?;
        require("action", &cmd.action)?;
        require("meaning", &cmd.meaning)?;
        if cmd.entity_id <= 0 {
            return Err(ESignError::validation("entity_id is required"));
        }
        if cmd.credential.is_empty() {
            return Err(ESignError::validation(
                "Password is required for electronic signature",
            ));
        }
        caps.ensure(&cmd.entity_type)?;

        if !self.credentials.reverify(acting_user, &cmd.credential)? {
            self.audit(
                AuditEvent::info(
                    acting_user,
                    actions::ESIGN_FAILED,
                    AUDIT_ENTITY,
                    None,
                    format!(
                        "Failed e-signature attempt on {} #{} - invalid password",
                        cmd.entity_type, cmd.entity_id
                    ),
                )
                .with_metadata(json!({
                    "entity_type": cmd.entity_type,
                    "entity_id": cmd.entity_id,
                    "action": cmd.action,
                    "slot_id": cmd.slot_id,
                    "reason": "invalid_password",
                }))
                .with_severity(Severity::Warning),
            );
            return Err(ESignError::Unauthorized(
                "Invalid password. E-signature requires re-authentication.".to_string(),
            ));
        }

        let signer = self.credentials.snapshot(acting_user)?;
        let slot_id = cmd.slot_id;
        let draft = SignatureDraft {
            entity_type: cmd.entity_type,
            entity_id: cmd.entity_id,
            action: cmd.action,
            signer_id: acting_user,
            signer,
            meaning: cmd.meaning,
            reason: cmd.reason,
            method: cmd.method,
            origin: cmd.origin,
        };

        let outcome = self.db.write(|tx| {
            // Taken under the writer lock, so expiry checks and the digest
            // see the time the row is actually written
            let signed_at = signing_now();
            if let Some(slot_id) = slot_id {
                let detail = self.approvals.request_for_slot_in(tx, slot_id)?;
                ensure_same_subject(&detail.request, &draft)?;
            }

            let signature = self.ledger.create_signature_in(tx, draft, signed_at)?;
            let request = match slot_id {
                Some(slot_id) => Some(self.approvals.record_sign_in(
                    tx,
                    slot_id,
                    acting_user,
                    signature.id,
                    signature.signed_at,
                )?),
                None => None,
            };
            Ok::<_, ESignError>(SignOutcome { signature, request })
        })?;

        let signature = &outcome.signature;
        self.audit(
            AuditEvent::info(
                acting_user,
                actions::ESIGN_CREATE,
                AUDIT_ENTITY,
                Some(signature.id),
                format!(
                    "E-signature applied: {} on {} #{} ({})",
                    signature.action, signature.entity_type, signature.entity_id, signature.meaning
                ),
            )
            .with_metadata(json!({
                "entity_type": signature.entity_type,
                "entity_id": signature.entity_id,
                "action": signature.action,
                "meaning": signature.meaning,
                "method": signature.method,
                "digest": signature.digest,
                "request_number": outcome.request.as_ref().map(|d| d.request.request_number.clone()),
                "request_status": outcome.request.as_ref().map(|d| d.request.status),
            })),
        );
        Ok(outcome)
    }

    /// Decline the acting user's slot
    pub fn decline(
        &self,
        acting_user: UserId,
        slot_id: SlotId,
        reason: Option<String>,
    ) -> ESignResult<RequestDetail> {
        let detail = self.approvals.decline(slot_id, acting_user, reason.clone())?;
        self.audit(
            AuditEvent::info(
                acting_user,
                actions::ESIGN_DECLINE,
                AUDIT_SLOT_ENTITY,
                Some(slot_id),
                format!("Signature declined on {}", detail.request.request_number),
            )
            .with_metadata(json!({
                "request_id": detail.request.id,
                "request_number": detail.request.request_number,
                "reason": reason,
                "request_status": detail.request.status,
            })),
        );
        Ok(detail)
    }

    /// Open a multi-signer approval request
    ///
    /// When the resolved policy restricts roles, every designated signer's
    /// current role must be on the list.
    pub fn create_request(
        &self,
        caps: &Capabilities,
        acting_user: UserId,
        new: NewRequest,
    ) -> ESignResult<RequestDetail> {
        caps.ensure(&new.entity_type)?;

        let policy = self.policies.resolve(&new.entity_type, &new.action)?;
        if let Some(ref policy) = policy {
            self.ensure_signer_roles(policy, &new)?;
        }

        let detail = self
            .approvals
            .create_request_with_policy(new, acting_user, policy.as_ref())?;
        let request = &detail.request;
        self.audit(
            AuditEvent::info(
                acting_user,
                actions::ESIGN_REQUEST_CREATE,
                AUDIT_REQUEST_ENTITY,
                Some(request.id),
                format!("Signature request created: {}", request.request_number),
            )
            .with_metadata(json!({
                "request_number": request.request_number,
                "entity_type": request.entity_type,
                "entity_id": request.entity_id,
                "action": request.action,
                "required_signatures": request.required_signatures,
                "signers": detail.slots.iter().map(|s| s.signer_id).collect::<Vec<_>>(),
                "sequential": request.sequential,
            })),
        );
        Ok(detail)
    }

    fn ensure_signer_roles(&self, policy: &Policy, new: &NewRequest) -> ESignResult<()> {
        if policy.required_roles.is_empty() {
            return Ok(());
        }
        for assignment in &new.signers {
            let role = self.credentials.snapshot(assignment.signer_id)?.role;
            if !policy.allows_role(&role) {
                return Err(ESignError::validation(format!(
                    "Signer {} has role {}; policy for {} requires one of [{}]",
                    assignment.signer_id,
                    role,
                    policy.key(),
                    policy.required_roles.join(", ")
                )));
            }
        }
        Ok(())
    }

    /// Cancel a request; only its requester may do so
    pub fn cancel_request(&self, acting_user: UserId, id: RequestId) -> ESignResult<RequestDetail> {
        let detail = self.approvals.cancel_request(id, acting_user)?;
        self.audit(AuditEvent::info(
            acting_user,
            actions::ESIGN_REQUEST_CANCEL,
            AUDIT_REQUEST_ENTITY,
            Some(id),
            format!("Signature request cancelled: {}", detail.request.request_number),
        ));
        Ok(detail)
    }

    pub fn verify_signature(&self, id: SignatureId) -> ESignResult<SignatureVerification> {
        self.ledger.verify_signature(id)
    }

    /// Revoke a signature (irreversible)
    pub fn invalidate_signature(
        &self,
        acting_user: UserId,
        id: SignatureId,
        reason: &str,
    ) -> ESignResult<Signature> {
        let signature = self.ledger.invalidate(id, acting_user, reason)?;
        self.audit(
            AuditEvent::info(
                acting_user,
                actions::ESIGN_INVALIDATE,
                AUDIT_ENTITY,
                Some(id),
                format!(
                    "E-signature invalidated on {} #{}",
                    signature.entity_type, signature.entity_id
                ),
            )
            .with_metadata(json!({
                "reason": reason.trim(),
                "original_signer": signature.signer_id,
            }))
            .with_severity(Severity::Warning),
        );
        Ok(signature)
    }

    pub fn get_signature(&self, id: SignatureId) -> ESignResult<Signature> {
        self.ledger.get_signature(id)
    }

    pub fn get_request(&self, id: RequestId) -> ESignResult<RequestDetail> {
        self.approvals.get_request(id)
    }

    pub fn list_requests(&self, filter: &RequestFilter) -> ESignResult<RequestPage> {
        self.approvals.list_requests(filter)
    }

    /// All signatures on an entity, newest first
    pub fn signatures_for_entity(
        &self,
        entity_type: &str,
        entity_id: i64,
    ) -> ESignResult<Vec<Signature>> {
        self.ledger.signatures_for_entity(entity_type, entity_id)
    }

    pub fn create_policy(&self, acting_user: UserId, new: NewPolicy) -> ESignResult<Policy> {
        let policy = self.policies.create_policy(new, acting_user)?;
        self.audit(
            AuditEvent::info(
                acting_user,
                actions::ESIGN_POLICY_CREATE,
                AUDIT_POLICY_ENTITY,
                Some(policy.id),
                format!("E-signature policy created for {}", policy.key()),
            )
            .with_metadata(json!({
                "required_signatures": policy.required_signatures,
                "required_roles": policy.required_roles,
                "sequential": policy.sequential,
                "expiration_hours": policy.expiration_hours,
            })),
        );
        Ok(policy)
    }

    pub fn update_policy(
        &self,
        acting_user: UserId,
        id: PolicyId,
        update: PolicyUpdate,
    ) -> ESignResult<Policy> {
        let fields = update.field_names();
        let policy = self.policies.update_policy(id, update)?;
        self.audit(
            AuditEvent::info(
                acting_user,
                actions::ESIGN_POLICY_UPDATE,
                AUDIT_POLICY_ENTITY,
                Some(policy.id),
                format!("E-signature policy updated for {}", policy.key()),
            )
            .with_metadata(json!({ "updated_fields": fields })),
        );
        Ok(policy)
    }

    pub fn resolve_policy(&self, entity_type: &str, action: &str) -> ESignResult<Option<Policy>> {
        self.policies.resolve(entity_type, action)
    }

    pub fn list_policies(&self) -> ESignResult<Vec<Policy>> {
        self.policies.list_policies()
    }

    /// Persist EXPIRED on overdue requests; meant for an external scheduler
    pub fn expire_overdue(&self, now: DateTime<Utc>) -> ESignResult<Vec<ApprovalRequest>> {
        self.approvals.expire_overdue(now)
    }

    pub fn stats(&self) -> ESignResult<ApprovalStats> {
        self.approvals.stats()
    }
}

/// A slot-linked signature must be about the request's own subject
fn ensure_same_subject(request: &ApprovalRequest, draft: &SignatureDraft) -> ESignResult<()> {
    if request.entity_type != draft.entity_type
        || request.entity_id != draft.entity_id
        || request.action != draft.action
    {
        return Err(ESignError::validation(format!(
            "Request {} covers {} #{} {}, not {} #{} {}",
            request.request_number,
            request.entity_type,
            request.entity_id,
            request.action,
            draft.entity_type,
            draft.entity_id,
            draft.action
        )));
    }
    Ok(())
}
