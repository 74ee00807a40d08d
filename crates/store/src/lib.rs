//! E-Sign Store - shared SQLite storage
//!
//! One `Database` handle backs the signature ledger, the policy resolver
//! and the approval engine, so a signing call can insert a signature and
//! advance a signer slot in a single transaction.

pub mod database;
pub mod error;
pub mod schema;
pub mod time;

pub use database::Database;
pub use error::StoreError;

/// Re-exported so dependants name the same rusqlite types
pub use rusqlite;
