//! Credential re-verification at the moment of signing

use std::sync::Arc;

use esign_core::{CredentialStore, ESignResult, SignerSnapshot, UserId, UserProfile};

/// Asks the identity store to confirm a signer's secret again
///
/// A logged-in session is not enough for a regulated signature; the
/// signer has to present the credential with every signing act.
pub struct CredentialReverifier {
    store: Arc<dyn CredentialStore>,
}

impl CredentialReverifier {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self { store }
    }

    /// True when the presented secret is correct for `user_id`
    pub fn reverify(&self, user_id: UserId, presented_secret: &str) -> ESignResult<bool> {
        let ok = self.store.verify_credential(user_id, presented_secret)?;
        if ok {
            tracing::debug!(user_id, "Credential re-verified");
        } else {
            tracing::warn!(user_id, "Credential re-verification failed");
        }
        Ok(ok)
    }

    pub fn profile(&self, user_id: UserId) -> ESignResult<Option<UserProfile>> {
        self.store.user_profile(user_id)
    }

    /// Identity to freeze into a signature
    ///
    /// Users missing from the directory get the fallback snapshot.
    pub fn snapshot(&self, user_id: UserId) -> ESignResult<SignerSnapshot> {
        let profile = self.profile(user_id)?.unwrap_or(UserProfile {
            display_name: String::new(),
            role: String::new(),
        });
        Ok(profile.snapshot(user_id))
    }
}
