//! Application context - wires everything together

use std::sync::Arc;

use esign_core::{AuditLogger, Capabilities, CredentialStore};
use esign_store::Database;

use crate::audit::TracingAuditLogger;
use crate::config::AppConfig;
use crate::directory::StaticDirectory;
use crate::facade::SigningFacade;

/// Application context - wires together all components
pub struct AppContext {
    pub config: AppConfig,
    pub facade: SigningFacade,
    pub directory: Arc<StaticDirectory>,
}

impl AppContext {
    /// Open the configured database and user directory
    pub fn new(config: AppConfig) -> Result<Self, anyhow::Error> {
        let db = Arc::new(Database::open(&config.database_path)?);
        let directory = Arc::new(StaticDirectory::load_or_default(&config.users_path())?);
        let audit: Arc<dyn AuditLogger> = Arc::new(TracingAuditLogger);

        tracing::debug!(
            database = %config.database_path.display(),
            users = directory.users().len(),
            "Application context ready"
        );
        Ok(Self::with_parts(config, db, directory, audit))
    }

    /// Assemble a context from already-built parts
    pub fn with_parts(
        config: AppConfig,
        db: Arc<Database>,
        directory: Arc<StaticDirectory>,
        audit: Arc<dyn AuditLogger>,
    ) -> Self {
        let credentials: Arc<dyn CredentialStore> = directory.clone();
        let facade = SigningFacade::new(db, &config, credentials, audit);
        Self {
            config,
            facade,
            directory,
        }
    }

    pub fn capabilities(&self) -> Capabilities {
        self.config.capabilities()
    }

    /// Persist the user directory
    pub fn save_directory(&self) -> Result<(), anyhow::Error> {
        self.directory.save(&self.config.users_path())?;
        Ok(())
    }
}
