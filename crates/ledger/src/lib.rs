//! E-Sign Ledger - immutable signature records
//!
//! Every signing act produces one `Signature` row whose digest can be
//! re-derived later to detect tampering. Rows are never deleted; the only
//! mutation is one-way invalidation.

mod ledger;
pub mod store;

pub use ledger::{LedgerConfig, SignatureLedger};
