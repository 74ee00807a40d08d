//! E-Sign Core - Domain types
//!
//! Shared vocabulary of the electronic signature engine:
//! - `Signature`: immutable record of one signing act
//! - `ApprovalRequest` / `SignerSlot`: multi-signer workflow state
//! - `Policy`: organization signing rule per (entity type, action)
//! - `digest`: tamper-evident SHA-256 digest of a signature event
//! - `ESignError`: the error taxonomy every component raises
//! - `CredentialStore` / `AuditLogger`: external collaborators

pub mod audit;
pub mod capability;
pub mod digest;
pub mod error;
pub mod identity;
pub mod policy;
pub mod request;
pub mod signature;

pub use audit::{actions, AuditError, AuditEvent, AuditLogger, Severity};
pub use capability::Capabilities;
pub use digest::{
    canonical_timestamp, compute_digest, digest_over_text, signing_now, DigestCheck,
};
pub use error::{require, ESignError, ESignResult};
pub use identity::{CredentialStore, UserProfile};
pub use policy::{
    expires_after, NewPolicy, Policy, PolicyId, PolicyKey, PolicyUpdate, MAX_EXPIRATION_HOURS,
};
pub use request::{
    ApprovalRequest, NewRequest, RequestDetail, RequestFilter, RequestId, RequestPage,
    RequestStatus, SignerAssignment, SignerSlot, SlotId, SlotStatus,
};
pub use signature::{
    Invalidation, OriginMeta, Signature, SignatureDraft, SignatureId, SignatureMethod,
    SignatureVerification, SignerSnapshot, UserId,
};
