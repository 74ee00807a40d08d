//! JSON-file user directory
//!
//! Stands in for the identity store. Secrets are kept as salted SHA-256
//! digests, never in clear text.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{PoisonError, RwLock};

use esign_core::{CredentialStore, ESignResult, UserId, UserProfile};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// One directory entry as stored on disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryUser {
    pub id: UserId,
    pub display_name: String,
    pub role: String,
    /// Hex-encoded random salt
    pub salt: String,
    /// Hex SHA-256 of salt bytes followed by the secret
    pub secret_hash: String,
}

impl DirectoryUser {
    fn profile(&self) -> UserProfile {
        UserProfile {
            display_name: self.display_name.clone(),
            role: self.role.clone(),
        }
    }

    fn matches(&self, presented_secret: &str) -> bool {
        let (Ok(salt), Ok(stored)) = (hex::decode(&self.salt), hex::decode(&self.secret_hash))
        else {
            return false;
        };
        let presented = secret_digest(&salt, presented_secret);
        presented.as_slice().ct_eq(stored.as_slice()).into()
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct DirectoryFile {
    #[serde(default)]
    users: Vec<DirectoryUser>,
}

fn secret_digest(salt: &[u8], secret: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(secret.as_bytes());
    hasher.finalize().to_vec()
}

fn hash_secret(salt: &[u8], secret: &str) -> String {
    hex::encode(secret_digest(salt, secret))
}

/// In-memory user directory, optionally backed by a JSON file
#[derive(Debug, Default)]
pub struct StaticDirectory {
    users: RwLock<BTreeMap<UserId, DirectoryUser>>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load users from a JSON file
    pub fn from_file(path: &Path) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        let file: DirectoryFile = serde_json::from_str(&content)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        let users = file.users.into_iter().map(|u| (u.id, u)).collect();
        Ok(Self {
            users: RwLock::new(users),
        })
    }

    /// Load from `path`, or start empty when the file does not exist yet
    pub fn load_or_default(path: &Path) -> Result<Self, std::io::Error> {
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Self::new())
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), std::io::Error> {
        let file = DirectoryFile {
            users: self.users(),
        };
        let content = serde_json::to_string_pretty(&file)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, content)
    }

    /// Add or replace a user, hashing the secret with a fresh salt
    pub fn upsert_user(
        &self,
        id: UserId,
        display_name: impl Into<String>,
        role: impl Into<String>,
        secret: &str,
    ) {
        let mut salt = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut salt);

        let user = DirectoryUser {
            id,
            display_name: display_name.into(),
            role: role.into(),
            salt: hex::encode(salt),
            secret_hash: hash_secret(&salt, secret),
        };
        self.users
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, user);
    }

    /// Change a user's role; returns false for unknown users
    pub fn set_role(&self, id: UserId, role: impl Into<String>) -> bool {
        let mut users = self.users.write().unwrap_or_else(PoisonError::into_inner);
        match users.get_mut(&id) {
            Some(user) => {
                user.role = role.into();
                true
            }
            None => false,
        }
    }

    pub fn users(&self) -> Vec<DirectoryUser> {
        self.users
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }
}

impl CredentialStore for StaticDirectory {
    fn verify_credential(&self, user_id: UserId, presented_secret: &str) -> ESignResult<bool> {
        let users = self.users.read().unwrap_or_else(PoisonError::into_inner);
        Ok(users
            .get(&user_id)
            .map_or(false, |u| u.matches(presented_secret)))
    }

    fn user_profile(&self, user_id: UserId) -> ESignResult<Option<UserProfile>> {
        let users = self.users.read().unwrap_or_else(PoisonError::into_inner);
        Ok(users.get(&user_id).map(DirectoryUser::profile))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_verify_credential() {
        let dir = StaticDirectory::new();
        dir.upsert_user(1, "Ada Quality", "QA_MANAGER", "s3cret");

        assert!(dir.verify_credential(1, "s3cret").unwrap());
        assert!(!dir.verify_credential(1, "S3cret").unwrap());
        assert!(!dir.verify_credential(1, "").unwrap());
        assert!(!dir.verify_credential(2, "s3cret").unwrap());
    }

    #[test]
    fn test_secret_not_stored_in_clear() {
        let dir = StaticDirectory::new();
        dir.upsert_user(1, "Ada", "QA", "s3cret");
        dir.upsert_user(2, "Bob", "QA", "s3cret");

        let users = dir.users();
        assert!(users.iter().all(|u| !u.secret_hash.contains("s3cret")));
        // Same secret, different salts
        assert_ne!(users[0].secret_hash, users[1].secret_hash);
    }

    #[test]
    fn test_profile_and_role_change() {
        let dir = StaticDirectory::new();
        dir.upsert_user(1, "Ada", "QA", "pw");
        assert_eq!(dir.user_profile(1).unwrap().unwrap().role, "QA");
        assert!(dir.set_role(1, "QA_MANAGER"));
        assert_eq!(dir.user_profile(1).unwrap().unwrap().role, "QA_MANAGER");
        assert!(!dir.set_role(9, "QA"));
        assert!(dir.user_profile(9).unwrap().is_none());
    }

    #[test]
    fn test_file_round_trip() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("users.json");

        let dir = StaticDirectory::new();
        dir.upsert_user(7, "Grace Auditor", "AUDITOR", "pw");
        dir.save(&path).unwrap();

        let loaded = StaticDirectory::from_file(&path).unwrap();
        assert!(loaded.verify_credential(7, "pw").unwrap());
        assert_eq!(loaded.users(), dir.users());

        let missing = StaticDirectory::load_or_default(&tmp.path().join("none.json")).unwrap();
        assert!(missing.users().is_empty());
    }

    #[test]
    fn test_corrupt_salt_never_matches() {
        let dir = StaticDirectory::new();
        dir.upsert_user(1, "Ada", "QA", "pw");
        dir.users.write().unwrap().get_mut(&1).unwrap().salt = "zz".to_string();
        assert!(!dir.verify_credential(1, "pw").unwrap());
    }

    #[test]
    fn test_hash_compared_as_bytes() {
        let dir = StaticDirectory::new();
        dir.upsert_user(1, "Ada", "QA", "pw");

        // Hex case is presentation only
        {
            let mut users = dir.users.write().unwrap();
            let user = users.get_mut(&1).unwrap();
            user.secret_hash = user.secret_hash.to_uppercase();
        }
        assert!(dir.verify_credential(1, "pw").unwrap());

        // A truncated digest never matches
        dir.users.write().unwrap().get_mut(&1).unwrap().secret_hash.truncate(32);
        assert!(!dir.verify_credential(1, "pw").unwrap());
    }
}
