//! Tamper-evident digest for signature events
//!
//! The digest is a pure function of (entity type, entity id, action,
//! signer id, timestamp). No salt, no randomness: it must be re-derivable
//! from the stored signature row at any later time.
//!
//! Each field is length-prefixed so that adjacent fields cannot bleed into
//! each other (`"AB" + "C"` and `"A" + "BC"` hash differently).

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use sha2::{Digest, Sha256};

use crate::signature::{Signature, UserId};

const DOMAIN_TAG: &[u8] = b"qms-esign/v1";

/// Canonical text form of a signing timestamp (RFC 3339, microseconds, `Z`)
pub fn canonical_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Current time at the precision the store can represent
///
/// Using this for signing keeps the in-memory timestamp, the stored
/// timestamp and the digest input identical.
pub fn signing_now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

fn update_field(hasher: &mut Sha256, bytes: &[u8]) {
    hasher.update((bytes.len() as u64).to_be_bytes());
    hasher.update(bytes);
}

/// Compute the SHA-256 hex digest of a signature event
pub fn compute_digest(
    entity_type: &str,
    entity_id: i64,
    action: &str,
    signer_id: UserId,
    signed_at: &DateTime<Utc>,
) -> String {
    digest_over_text(
        entity_type,
        entity_id,
        action,
        signer_id,
        &canonical_timestamp(signed_at),
    )
}

/// Digest over an already-rendered timestamp
///
/// Stored rows keep the canonical text, so hashing it as read reproduces
/// the original digest, while any rewrite of the column (parseable or not)
/// produces a different one.
pub fn digest_over_text(
    entity_type: &str,
    entity_id: i64,
    action: &str,
    signer_id: UserId,
    signed_at: &str,
) -> String {
    let mut hasher = Sha256::new();
    update_field(&mut hasher, DOMAIN_TAG);
    update_field(&mut hasher, entity_type.as_bytes());
    update_field(&mut hasher, &entity_id.to_be_bytes());
    update_field(&mut hasher, action.as_bytes());
    update_field(&mut hasher, &signer_id.to_be_bytes());
    update_field(&mut hasher, signed_at.as_bytes());
    hex::encode(hasher.finalize())
}

/// Outcome of re-deriving a digest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestCheck {
    pub recomputed: String,
    pub matches_stored: bool,
}

impl DigestCheck {
    /// Compare a recomputed digest against the stored one
    pub fn against(stored: &str, recomputed: String) -> Self {
        let matches_stored = recomputed == stored;
        Self {
            recomputed,
            matches_stored,
        }
    }

    /// Result for a row whose signed fields cannot even be read back
    pub fn unreadable() -> Self {
        Self {
            recomputed: String::new(),
            matches_stored: false,
        }
    }
}

/// Recompute the digest from a signature's immutable fields
///
/// Never fails: a mismatch is a result, since verification has to run on
/// corrupted rows to surface the corruption.
pub fn verify(signature: &Signature) -> DigestCheck {
    let recomputed = compute_digest(
        &signature.entity_type,
        signature.entity_id,
        &signature.action,
        signature.signer_id,
        &signature.signed_at,
    );
    DigestCheck::against(&signature.digest, recomputed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::{OriginMeta, SignatureMethod, SignerSnapshot};
    use chrono::TimeZone;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, 9, 26, 53).unwrap()
    }

    fn signature(digest: String) -> Signature {
        Signature {
            id: 1,
            digest,
            entity_type: "NC".to_string(),
            entity_id: 42,
            action: "APPROVE_CLOSURE".to_string(),
            signer_id: 7,
            signer: SignerSnapshot {
                full_name: "Ada Quality".to_string(),
                role: "QA_MANAGER".to_string(),
            },
            meaning: "approved".to_string(),
            reason: None,
            method: SignatureMethod::Password,
            origin: OriginMeta::default(),
            signed_at: ts(),
            is_valid: true,
            invalidation: None,
        }
    }

    #[test]
    fn test_digest_deterministic() {
        let a = compute_digest("NC", 42, "APPROVE_CLOSURE", 7, &ts());
        let b = compute_digest("NC", 42, "APPROVE_CLOSURE", 7, &ts());
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_each_field_changes_digest() {
        let base = compute_digest("NC", 42, "APPROVE_CLOSURE", 7, &ts());
        let later = ts() + chrono::Duration::microseconds(1);

        assert_ne!(base, compute_digest("NCR", 42, "APPROVE_CLOSURE", 7, &ts()));
        assert_ne!(base, compute_digest("NC", 43, "APPROVE_CLOSURE", 7, &ts()));
        assert_ne!(base, compute_digest("NC", 42, "APPROVE_CLOSURe", 7, &ts()));
        assert_ne!(base, compute_digest("NC", 42, "APPROVE_CLOSURE", 8, &ts()));
        assert_ne!(base, compute_digest("NC", 42, "APPROVE_CLOSURE", 7, &later));
    }

    #[test]
    fn test_field_boundaries_do_not_collide() {
        // Naive concatenation would feed "ABC" in both cases
        let left = compute_digest("AB", 1, "C", 7, &ts());
        let right = compute_digest("A", 1, "BC", 7, &ts());
        assert_ne!(left, right);

        // Empty entity type vs empty action
        let left = compute_digest("", 1, "X", 7, &ts());
        let right = compute_digest("X", 1, "", 7, &ts());
        assert_ne!(left, right);

        // Numeric ids are fixed width, so 1|2 and 12 cannot meet
        let left = compute_digest("NC", 1, "2", 3, &ts());
        let right = compute_digest("NC", 12, "", 3, &ts());
        assert_ne!(left, right);
    }

    #[test]
    fn test_canonical_timestamp_format() {
        let t = ts() + chrono::Duration::microseconds(123_456);
        assert_eq!(canonical_timestamp(&t), "2026-03-14T09:26:53.123456Z");
    }

    #[test]
    fn test_signing_now_has_micro_precision() {
        let now = signing_now();
        assert_eq!(now.timestamp_subsec_nanos() % 1_000, 0);
    }

    #[test]
    fn test_verify_intact_and_tampered() {
        let digest = compute_digest("NC", 42, "APPROVE_CLOSURE", 7, &ts());
        let sig = signature(digest.clone());
        let check = verify(&sig);
        assert!(check.matches_stored);
        assert_eq!(check.recomputed, digest);

        let mut tampered = sig.clone();
        tampered.entity_id = 43;
        let check = verify(&tampered);
        assert!(!check.matches_stored);
        assert_ne!(check.recomputed, digest);
    }

    #[test]
    fn test_text_digest_matches_canonical_form() {
        let t = ts() + chrono::Duration::microseconds(5);
        assert_eq!(
            compute_digest("NC", 42, "APPROVE_CLOSURE", 7, &t),
            digest_over_text("NC", 42, "APPROVE_CLOSURE", 7, "2026-03-14T09:26:53.000005Z")
        );
        // Same instant, different spelling
        assert_ne!(
            compute_digest("NC", 42, "APPROVE_CLOSURE", 7, &ts()),
            digest_over_text("NC", 42, "APPROVE_CLOSURE", 7, "2026-03-14T09:26:53Z")
        );
    }

    #[test]
    fn test_unreadable_never_matches() {
        let check = DigestCheck::unreadable();
        assert!(!check.matches_stored);
        assert!(check.recomputed.is_empty());
    }

    #[test]
    fn test_verify_garbage_digest_is_reported_not_raised() {
        let sig = signature("not-a-digest".to_string());
        assert!(!verify(&sig).matches_stored);
    }
}
