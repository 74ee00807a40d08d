//! E-Sign Approval - multi-signer approval requests
//!
//! An approval request names its signers up front. Each signer owns one
//! slot that moves PENDING -> SIGNED or PENDING -> DECLINED exactly once.
//! The request completes when enough slots are signed, and in sequential
//! mode a slot may only sign after every lower ordinal has signed.

mod engine;
pub mod request;
pub mod store;

pub use engine::{ApprovalConfig, ApprovalEngine, ApprovalStats};
pub use request::RequestAggregate;
