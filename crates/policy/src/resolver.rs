//! Policy resolver
//!
//! Looks up the active policy for an (entity type, action) pair. Lookups are
//! cached against the database's policy generation: any policy write, from
//! this handle or another connection on the same file, advances it and the
//! whole cache is dropped on the next lookup.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{SubsecRound, Utc};
use esign_core::{
    ESignError, ESignResult, NewPolicy, Policy, PolicyId, PolicyKey, PolicyUpdate, UserId,
};
use esign_store::Database;
use serde::{Deserialize, Serialize};

use crate::store;

/// Configuration for the policy resolver
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyConfig {
    #[serde(default = "default_cache_enabled")]
    pub cache_enabled: bool,
}

fn default_cache_enabled() -> bool {
    true
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            cache_enabled: default_cache_enabled(),
        }
    }
}

#[derive(Debug, Default)]
struct PolicyCache {
    generation: i64,
    entries: HashMap<PolicyKey, Option<Policy>>,
}

pub struct PolicyResolver {
    db: Arc<Database>,
    config: PolicyConfig,
    cache: Mutex<PolicyCache>,
}

impl PolicyResolver {
    pub fn new(db: Arc<Database>, config: PolicyConfig) -> Self {
        Self {
            db,
            config,
            cache: Mutex::new(PolicyCache::default()),
        }
    }

    /// Create a resolver with default config
    pub fn with_database(db: Arc<Database>) -> Self {
        Self::new(db, PolicyConfig::default())
    }

    /// Active policy for the pair, or `None` when nothing is configured
    pub fn resolve(&self, entity_type: &str, action: &str) -> ESignResult<Option<Policy>> {
        if !self.config.cache_enabled {
            return self.db.read(|conn| {
                store::find_active(conn, entity_type, action).map_err(ESignError::from)
            });
        }

        let key = PolicyKey::new(entity_type, action);
        // The connection stays held from the generation read to the cache
        // fill, so no write through this handle can land in between.
        self.db.read(|conn| -> ESignResult<Option<Policy>> {
            let generation = store::generation(conn)?;
            let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
            if cache.generation != generation {
                tracing::debug!(
                    from = cache.generation,
                    to = generation,
                    "Policy generation changed; dropping cache"
                );
                cache.entries.clear();
                cache.generation = generation;
            }

            if let Some(hit) = cache.entries.get(&key) {
                tracing::debug!(policy_key = %key, "Policy cache hit");
                return Ok(hit.clone());
            }

            let policy = store::find_active(conn, entity_type, action)?;
            cache.entries.insert(key, policy.clone());
            Ok(policy)
        })
    }

    /// Create a policy; at most one may be active per key
    pub fn create_policy(&self, new: NewPolicy, created_by: UserId) -> ESignResult<Policy> {
        new.validate()?;
        let key = PolicyKey::new(&new.entity_type, &new.action);

        let policy = self.db.write(|tx| {
            if store::find_active(tx, &new.entity_type, &new.action)?.is_some() {
                return Err(ESignError::conflict(format!(
                    "An active policy already exists for {}",
                    key
                )));
            }
            let now = Utc::now().trunc_subsecs(6);
            let id = store::insert(tx, &new, created_by, &now)?;
            store::get(tx, id)?.ok_or_else(|| ESignError::not_found("Policy", id))
        })?;

        tracing::info!(policy_id = policy.id, policy_key = %key, "Signing policy created");
        Ok(policy)
    }

    /// Update the mutable fields of a policy
    pub fn update_policy(&self, id: PolicyId, update: PolicyUpdate) -> ESignResult<Policy> {
        if update.is_empty() {
            return Err(ESignError::validation("No updatable policy fields given"));
        }
        update.validate()?;

        let policy = self.db.write(|tx| {
            let mut policy =
                store::get(tx, id)?.ok_or_else(|| ESignError::not_found("Policy", id))?;
            let was_active = policy.is_active;
            update.apply_to(&mut policy);

            if policy.is_active && !was_active {
                if let Some(other) = store::find_active(tx, &policy.entity_type, &policy.action)? {
                    return Err(ESignError::conflict(format!(
                        "Policy {} is already active for {}",
                        other.id,
                        policy.key()
                    )));
                }
            }

            store::update(tx, &policy)?;
            Ok(policy)
        })?;

        tracing::info!(
            policy_id = policy.id,
            fields = ?update.field_names(),
            "Signing policy updated"
        );
        Ok(policy)
    }

    pub fn get_policy(&self, id: PolicyId) -> ESignResult<Policy> {
        self.db.read(|conn| {
            store::get(conn, id)?.ok_or_else(|| ESignError::not_found("Policy", id))
        })
    }

    /// Active policies ordered by entity type, then action
    pub fn list_policies(&self) -> ESignResult<Vec<Policy>> {
        self.db
            .read(|conn| store::list_active(conn).map_err(ESignError::from))
    }

    /// Drop every cached lookup
    pub fn invalidate_cache(&self) {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .clear();
    }
}
