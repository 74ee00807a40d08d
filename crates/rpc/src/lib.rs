//! E-Sign RPC - signing facade and CLI orchestrator
//!
//! This crate provides the `SigningFacade` a controller layer calls, the
//! collaborators it needs (user directory, audit sinks), configuration and
//! the `esign` CLI binary.

pub mod audit;
pub mod commands;
pub mod config;
pub mod context;
pub mod credential;
pub mod directory;
pub mod facade;

pub use audit::{MemoryAuditLogger, TracingAuditLogger};
pub use config::AppConfig;
pub use context::AppContext;
pub use credential::CredentialReverifier;
pub use directory::StaticDirectory;
pub use facade::{SignCommand, SignOutcome, SigningFacade};
