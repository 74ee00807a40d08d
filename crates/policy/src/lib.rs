//! E-Sign Policy - organization signing rules
//!
//! A policy says how many signers an (entity type, action) pair needs,
//! which roles may sign, whether they sign in order and how long a request
//! stays open. At most one policy per key is active at any time.

mod resolver;
pub mod store;

pub use resolver::{PolicyConfig, PolicyResolver};
