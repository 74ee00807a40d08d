//! Electronic signature records
//!
//! A `Signature` is written once by the sign operation and afterwards only
//! its validity fields may change (one-way invalidation).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// User identifier in the external identity store
pub type UserId = i64;

/// Signature row identifier
pub type SignatureId = i64;

/// How the signer authenticated the signing act
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, EnumString, Display,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignatureMethod {
    #[default]
    Password,
    Biometric,
    Token,
    Certificate,
}

/// Signer identity captured at the moment of signing
///
/// Later role or name changes in the directory never rewrite this.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignerSnapshot {
    pub full_name: String,
    pub role: String,
}

/// Network origin of the signing call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OriginMeta {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Who revoked a signature, when and why
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invalidation {
    pub invalidated_by: UserId,
    pub invalidated_at: DateTime<Utc>,
    pub reason: String,
}

/// An immutable record of one signing act
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub id: SignatureId,

    /// SHA-256 hex digest binding entity, id, action, signer and timestamp
    pub digest: String,

    pub entity_type: String,
    pub entity_id: i64,
    pub action: String,

    pub signer_id: UserId,
    pub signer: SignerSnapshot,

    /// e.g. "approved", "reviewed"
    pub meaning: String,
    pub reason: Option<String>,
    pub method: SignatureMethod,
    pub origin: OriginMeta,

    pub signed_at: DateTime<Utc>,

    pub is_valid: bool,
    pub invalidation: Option<Invalidation>,
}

/// Everything needed to create a signature, minus id/digest/timestamp
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureDraft {
    pub entity_type: String,
    pub entity_id: i64,
    pub action: String,
    pub signer_id: UserId,
    pub signer: SignerSnapshot,
    pub meaning: String,
    pub reason: Option<String>,
    pub method: Option<SignatureMethod>,
    pub origin: OriginMeta,
}

/// Result of re-deriving a stored signature's digest
///
/// `is_intact` and `is_valid` are independent: a signature may be intact yet
/// revoked, or still flagged valid while its stored fields were tampered with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureVerification {
    pub signature_id: SignatureId,
    pub stored_digest: String,
    pub recomputed_digest: String,
    pub is_intact: bool,
    pub is_valid: bool,
    /// Timestamp column exactly as stored
    pub signed_at: String,
    pub entity_type: String,
    pub entity_id: i64,
    pub action: String,
}

impl SignatureVerification {
    /// Intact and not revoked
    pub fn is_trustworthy(&self) -> bool {
        self.is_intact && self.is_valid
    }
}
