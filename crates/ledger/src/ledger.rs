//! Signature ledger
//!
//! Creates signature records, re-derives their digests and revokes them.
//! Rows are written once; only the validity fields ever change.

use std::sync::Arc;

use chrono::{DateTime, SubsecRound, Utc};
use esign_core::digest::{compute_digest, digest_over_text, DigestCheck};
use esign_core::{
    require, signing_now, ESignError, ESignResult, Signature, SignatureDraft, SignatureId,
    SignatureMethod, SignatureVerification, UserId,
};
use esign_store::Database;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::store;

/// Configuration for the signature ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Client agent strings are cut to this many characters
    #[serde(default = "default_max_user_agent_len")]
    pub max_user_agent_len: usize,

    /// Method recorded when the caller does not name one
    #[serde(default)]
    pub default_method: SignatureMethod,
}

fn default_max_user_agent_len() -> usize {
    500
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            max_user_agent_len: default_max_user_agent_len(),
            default_method: SignatureMethod::default(),
        }
    }
}

pub struct SignatureLedger {
    db: Arc<Database>,
    config: LedgerConfig,
}

impl SignatureLedger {
    pub fn new(db: Arc<Database>, config: LedgerConfig) -> Self {
        Self { db, config }
    }

    /// Create a ledger with default config
    pub fn with_database(db: Arc<Database>) -> Self {
        Self::new(db, LedgerConfig::default())
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Create a standalone signature in its own transaction
    pub fn create_signature(&self, draft: SignatureDraft) -> ESignResult<Signature> {
        self.db
            .write(|tx| self.create_signature_in(tx, draft, signing_now()))
    }

    /// Create a signature inside a caller-owned transaction
    ///
    /// The digest and the stored row share one timestamp; if the two ever
    /// differed, re-verification would always fail. `signed_at` is moved
    /// forward by a microsecond only when the same signer already signed
    /// the same subject at that instant.
    pub fn create_signature_in(
        &self,
        conn: &Connection,
        draft: SignatureDraft,
        signed_at: DateTime<Utc>,
    ) -> ESignResult<Signature> {
        require("entity_type", &draft.entity_type)?;
        require("action", &draft.action)?;
        require("meaning", &draft.meaning)?;

        let mut signed_at = signed_at.trunc_subsecs(6);
        let digest_at = |at: &DateTime<Utc>| {
            compute_digest(
                &draft.entity_type,
                draft.entity_id,
                &draft.action,
                draft.signer_id,
                at,
            )
        };
        let mut digest = digest_at(&signed_at);
        // Same signer and subject within one microsecond: take the next one
        while store::digest_exists(conn, &digest)? {
            signed_at += chrono::Duration::microseconds(1);
            digest = digest_at(&signed_at);
        }

        let mut origin = draft.origin;
        origin.user_agent = origin
            .user_agent
            .map(|ua| truncate_chars(&ua, self.config.max_user_agent_len));

        let mut signature = Signature {
            id: 0,
            digest,
            entity_type: draft.entity_type,
            entity_id: draft.entity_id,
            action: draft.action,
            signer_id: draft.signer_id,
            signer: draft.signer,
            meaning: draft.meaning,
            reason: draft.reason.filter(|r| !r.trim().is_empty()),
            method: draft.method.unwrap_or(self.config.default_method),
            origin,
            signed_at,
            is_valid: true,
            invalidation: None,
        };
        signature.id = store::insert(conn, &signature)?;

        tracing::info!(
            signature_id = signature.id,
            signer_id = signature.signer_id,
            entity_type = %signature.entity_type,
            entity_id = signature.entity_id,
            action = %signature.action,
            "Signature recorded"
        );
        Ok(signature)
    }

    pub fn get_signature(&self, id: SignatureId) -> ESignResult<Signature> {
        self.db.read(|conn| Self::load(conn, id))
    }

    fn load(conn: &Connection, id: SignatureId) -> ESignResult<Signature> {
        store::get(conn, id)?.ok_or_else(|| ESignError::not_found("Signature", id))
    }

    /// Re-derive a signature's digest from its stored fields
    ///
    /// Works on the raw columns, so a row that no longer decodes still
    /// yields a verification (reported as not intact). Only a missing row
    /// is an error.
    pub fn verify_signature(&self, id: SignatureId) -> ESignResult<SignatureVerification> {
        let row = self
            .db
            .read(|conn| store::get_integrity(conn, id).map_err(ESignError::from))?
            .ok_or_else(|| ESignError::not_found("Signature", id))?;

        let check = match (row.entity_id, row.signer_id) {
            (Some(entity_id), Some(signer_id)) => DigestCheck::against(
                &row.digest,
                digest_over_text(
                    &row.entity_type,
                    entity_id,
                    &row.action,
                    signer_id,
                    &row.signed_at,
                ),
            ),
            _ => DigestCheck::unreadable(),
        };

        if !check.matches_stored {
            tracing::warn!(
                signature_id = id,
                stored = %row.digest,
                recomputed = %check.recomputed,
                "Signature digest mismatch"
            );
        }

        Ok(SignatureVerification {
            signature_id: id,
            stored_digest: row.digest,
            recomputed_digest: check.recomputed,
            is_intact: check.matches_stored,
            is_valid: row.is_valid,
            signed_at: row.signed_at,
            entity_type: row.entity_type,
            entity_id: row.entity_id.unwrap_or_default(),
            action: row.action,
        })
    }

    /// Revoke a signature (irreversible)
    pub fn invalidate(
        &self,
        id: SignatureId,
        acting_user: UserId,
        reason: &str,
    ) -> ESignResult<Signature> {
        if reason.trim().is_empty() {
            return Err(ESignError::validation("Invalidation reason is required"));
        }

        self.db.write(|tx| {
            let signature = Self::load(tx, id)?;
            if !signature.is_valid {
                return Err(ESignError::conflict(format!(
                    "Signature {} is already invalidated",
                    id
                )));
            }

            let now = Utc::now().trunc_subsecs(6);
            if store::mark_invalid(tx, id, acting_user, &now, reason.trim())? == 0 {
                return Err(ESignError::conflict(format!(
                    "Signature {} is already invalidated",
                    id
                )));
            }

            tracing::warn!(signature_id = id, invalidated_by = acting_user, "Signature invalidated");
            Self::load(tx, id)
        })
    }

    /// All signatures on an entity, newest first
    pub fn signatures_for_entity(
        &self,
        entity_type: &str,
        entity_id: i64,
    ) -> ESignResult<Vec<Signature>> {
        self.db.read(|conn| {
            store::list_for_entity(conn, entity_type, entity_id).map_err(ESignError::from)
        })
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}
