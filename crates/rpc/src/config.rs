//! Application configuration
//!
//! Loaded from a JSON file; every field has a default so a partial file
//! (or none at all) is enough.

use std::path::{Path, PathBuf};

use esign_approval::ApprovalConfig;
use esign_core::Capabilities;
use esign_ledger::LedgerConfig;
use esign_policy::PolicyConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// SQLite database file
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// JSON user directory; defaults to `users.json` next to the database
    #[serde(default)]
    pub users_path: Option<PathBuf>,

    /// Entity types whose modules are enabled; `None` enables all
    #[serde(default)]
    pub enabled_entities: Option<Vec<String>>,

    #[serde(default)]
    pub ledger: LedgerConfig,

    #[serde(default)]
    pub approval: ApprovalConfig,

    #[serde(default)]
    pub policy: PolicyConfig,
}

fn default_database_path() -> PathBuf {
    PathBuf::from("./data/esign.db")
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            users_path: None,
            enabled_entities: None,
            ledger: LedgerConfig::default(),
            approval: ApprovalConfig::default(),
            policy: PolicyConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from JSON file
    pub fn from_file(path: &Path) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    pub fn users_path(&self) -> PathBuf {
        match self.users_path {
            Some(ref path) => path.clone(),
            None => self
                .database_path
                .parent()
                .unwrap_or_else(|| Path::new("."))
                .join("users.json"),
        }
    }

    pub fn capabilities(&self) -> Capabilities {
        match self.enabled_entities {
            Some(ref entities) => Capabilities::only(entities.iter().cloned()),
            None => Capabilities::all(),
        }
    }
}
