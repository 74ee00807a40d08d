//! Identity store collaborator
//!
//! Credential storage lives outside the engine; the engine only asks
//! whether a presented secret is correct and who the user is right now.

use serde::{Deserialize, Serialize};

use crate::error::ESignResult;
use crate::signature::{SignerSnapshot, UserId};

/// Current directory view of a user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub display_name: String,
    pub role: String,
}

impl UserProfile {
    /// Freeze the profile into a signature snapshot
    ///
    /// Blank names fall back to `User#<id>`, blank roles to `USER`.
    pub fn snapshot(&self, user_id: UserId) -> SignerSnapshot {
        let full_name = if self.display_name.trim().is_empty() {
            format!("User#{}", user_id)
        } else {
            self.display_name.trim().to_string()
        };
        let role = if self.role.trim().is_empty() {
            "USER".to_string()
        } else {
            self.role.trim().to_string()
        };
        SignerSnapshot { full_name, role }
    }
}

/// External user directory
pub trait CredentialStore: Send + Sync {
    /// Check a presented secret against the stored credential
    fn verify_credential(&self, user_id: UserId, presented_secret: &str) -> ESignResult<bool>;

    /// Look up a user's current profile
    fn user_profile(&self, user_id: UserId) -> ESignResult<Option<UserProfile>>;
}
