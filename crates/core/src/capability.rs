//! Enabled-module capability set
//!
//! Which regulated entity types exist depends on the deployment's modules.
//! Callers pass that in explicitly instead of the engine reading it from
//! ambient state.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::{ESignError, ESignResult};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    /// `None` enables every entity type
    enabled_entities: Option<BTreeSet<String>>,
}

impl Capabilities {
    /// Every entity type enabled
    pub fn all() -> Self {
        Self {
            enabled_entities: None,
        }
    }

    /// Only the listed entity types enabled
    pub fn only<I, S>(entities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            enabled_entities: Some(entities.into_iter().map(Into::into).collect()),
        }
    }

    pub fn allows(&self, entity_type: &str) -> bool {
        match self.enabled_entities {
            None => true,
            Some(ref set) => set.contains(entity_type),
        }
    }

    pub fn ensure(&self, entity_type: &str) -> ESignResult<()> {
        if self.allows(entity_type) {
            Ok(())
        } else {
            Err(ESignError::forbidden(format!(
                "module for entity type {} is not enabled",
                entity_type
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_allows_anything() {
        assert!(Capabilities::all().allows("NC"));
        assert!(Capabilities::default().allows("WAREHOUSE"));
    }

    #[test]
    fn test_only_restricts() {
        let caps = Capabilities::only(["NC", "CAPA"]);
        assert!(caps.allows("NC"));
        assert!(!caps.allows("RISK"));
        assert!(matches!(caps.ensure("RISK"), Err(ESignError::Forbidden(_))));
    }
}
