//! Organization signing policies keyed by (entity type, action)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{require, ESignError, ESignResult};
use crate::signature::UserId;

pub type PolicyId = i64;

/// Longest expiration window a policy or request may ask for (ten years)
pub const MAX_EXPIRATION_HOURS: u32 = 24 * 365 * 10;

/// `now` plus an expiration window, rejecting windows past the limit
pub fn expires_after(now: DateTime<Utc>, hours: u32) -> ESignResult<DateTime<Utc>> {
    validate_expiration(Some(hours))?;
    now.checked_add_signed(chrono::Duration::hours(i64::from(hours)))
        .ok_or_else(|| ESignError::validation("expiration window is out of range"))
}

/// Lookup key of a policy
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PolicyKey {
    pub entity_type: String,
    pub action: String,
}

impl PolicyKey {
    pub fn new(entity_type: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            action: action.into(),
        }
    }
}

impl std::fmt::Display for PolicyKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.entity_type, self.action)
    }
}

/// A signing rule for one (entity type, action) pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    pub id: PolicyId,
    pub entity_type: String,
    pub action: String,
    pub required_signatures: u32,
    /// Allow-list of signer roles; empty means any role
    pub required_roles: Vec<String>,
    pub sequential: bool,
    pub expiration_hours: Option<u32>,
    pub is_active: bool,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
}

impl Policy {
    pub fn key(&self) -> PolicyKey {
        PolicyKey::new(&self.entity_type, &self.action)
    }

    /// Whether a signer with `role` satisfies the role allow-list
    pub fn allows_role(&self, role: &str) -> bool {
        self.required_roles.is_empty() || self.required_roles.iter().any(|r| r == role)
    }

    /// Expiry computed from the policy window, if it has one
    pub fn expiry_from(&self, now: DateTime<Utc>) -> ESignResult<Option<DateTime<Utc>>> {
        self.expiration_hours
            .map(|h| expires_after(now, h))
            .transpose()
    }
}

/// Input for creating a policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPolicy {
    pub entity_type: String,
    pub action: String,
    #[serde(default = "default_required_signatures")]
    pub required_signatures: u32,
    #[serde(default)]
    pub required_roles: Vec<String>,
    #[serde(default)]
    pub sequential: bool,
    #[serde(default)]
    pub expiration_hours: Option<u32>,
}

fn default_required_signatures() -> u32 {
    1
}

impl NewPolicy {
    pub fn new(entity_type: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            action: action.into(),
            required_signatures: default_required_signatures(),
            required_roles: Vec::new(),
            sequential: false,
            expiration_hours: None,
        }
    }

    pub fn required(mut self, n: u32) -> Self {
        self.required_signatures = n;
        self
    }

    pub fn sequential(mut self, sequential: bool) -> Self {
        self.sequential = sequential;
        self
    }

    pub fn roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_roles = roles.into_iter().map(Into::into).collect();
        self
    }

    pub fn expires_after_hours(mut self, hours: u32) -> Self {
        self.expiration_hours = Some(hours);
        self
    }

    pub fn validate(&self) -> ESignResult<()> {
        require("entity_type", &self.entity_type)?;
        require("action", &self.action)?;
        validate_required(self.required_signatures)?;
        validate_expiration(self.expiration_hours)
    }
}

/// Mutable policy fields
///
/// The lookup key (entity type, action) is deliberately absent: it cannot
/// change once the policy exists. Unknown fields are rejected when parsing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyUpdate {
    pub required_signatures: Option<u32>,
    pub required_roles: Option<Vec<String>>,
    pub sequential: Option<bool>,
    /// `Some(None)` clears the expiration window
    #[serde(default, with = "double_option")]
    pub expiration_hours: Option<Option<u32>>,
    pub is_active: Option<bool>,
}

impl PolicyUpdate {
    pub fn is_empty(&self) -> bool {
        self.required_signatures.is_none()
            && self.required_roles.is_none()
            && self.sequential.is_none()
            && self.expiration_hours.is_none()
            && self.is_active.is_none()
    }

    /// Names of the fields this update touches
    pub fn field_names(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.required_signatures.is_some() {
            names.push("required_signatures");
        }
        if self.required_roles.is_some() {
            names.push("required_roles");
        }
        if self.sequential.is_some() {
            names.push("sequential");
        }
        if self.expiration_hours.is_some() {
            names.push("expiration_hours");
        }
        if self.is_active.is_some() {
            names.push("is_active");
        }
        names
    }

    pub fn validate(&self) -> ESignResult<()> {
        if let Some(n) = self.required_signatures {
            validate_required(n)?;
        }
        if let Some(hours) = self.expiration_hours {
            validate_expiration(hours)?;
        }
        Ok(())
    }

    /// Apply the update to a policy in place
    pub fn apply_to(&self, policy: &mut Policy) {
        if let Some(n) = self.required_signatures {
            policy.required_signatures = n;
        }
        if let Some(ref roles) = self.required_roles {
            policy.required_roles = roles.clone();
        }
        if let Some(sequential) = self.sequential {
            policy.sequential = sequential;
        }
        if let Some(hours) = self.expiration_hours {
            policy.expiration_hours = hours;
        }
        if let Some(active) = self.is_active {
            policy.is_active = active;
        }
    }
}

fn validate_required(n: u32) -> ESignResult<()> {
    if n == 0 {
        return Err(ESignError::validation(
            "required_signatures must be at least 1",
        ));
    }
    Ok(())
}

fn validate_expiration(hours: Option<u32>) -> ESignResult<()> {
    match hours {
        Some(0) => Err(ESignError::validation(
            "expiration_hours must be positive when set",
        )),
        Some(h) if h > MAX_EXPIRATION_HOURS => Err(ESignError::validation(format!(
            "expiration_hours must be at most {}, got {}",
            MAX_EXPIRATION_HOURS, h
        ))),
        _ => Ok(()),
    }
}

mod double_option {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S, T>(value: &Option<Option<T>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        T: Serialize,
    {
        match value {
            Some(inner) => inner.serialize(serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de>,
    {
        Option::<T>::deserialize(deserializer).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn policy() -> Policy {
        Policy {
            id: 1,
            entity_type: "NC".to_string(),
            action: "APPROVE_CLOSURE".to_string(),
            required_signatures: 2,
            required_roles: vec!["QA_MANAGER".to_string()],
            sequential: true,
            expiration_hours: Some(48),
            is_active: true,
            created_by: 1,
            created_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_new_policy_defaults() {
        let p: NewPolicy =
            serde_json::from_str(r#"{"entity_type":"DOC","action":"RELEASE"}"#).unwrap();
        assert_eq!(p.required_signatures, 1);
        assert!(p.required_roles.is_empty());
        assert!(!p.sequential);
        assert!(p.expiration_hours.is_none());
        assert!(p.validate().is_ok());
    }

    #[test]
    fn test_new_policy_validation() {
        assert!(NewPolicy::new("", "RELEASE").validate().is_err());
        assert!(NewPolicy::new("DOC", "RELEASE").required(0).validate().is_err());
        assert!(NewPolicy::new("DOC", "RELEASE")
            .expires_after_hours(0)
            .validate()
            .is_err());
    }

    #[test]
    fn test_update_rejects_key_fields() {
        let result: Result<PolicyUpdate, _> =
            serde_json::from_str(r#"{"entity_type":"CAPA","sequential":true}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_update_clears_expiration() {
        let update: PolicyUpdate = serde_json::from_str(r#"{"expiration_hours":null}"#).unwrap();
        assert_eq!(update.expiration_hours, Some(None));

        let mut p = policy();
        update.apply_to(&mut p);
        assert_eq!(p.expiration_hours, None);
        assert_eq!(p.required_signatures, 2);
    }

    #[test]
    fn test_update_field_names() {
        let update = PolicyUpdate {
            sequential: Some(false),
            is_active: Some(false),
            ..Default::default()
        };
        assert_eq!(update.field_names(), vec!["sequential", "is_active"]);
        assert!(PolicyUpdate::default().is_empty());
    }

    #[test]
    fn test_allows_role() {
        let mut p = policy();
        assert!(p.allows_role("QA_MANAGER"));
        assert!(!p.allows_role("OPERATOR"));
        p.required_roles.clear();
        assert!(p.allows_role("OPERATOR"));
    }

    #[test]
    fn test_expiry_from() {
        let p = policy();
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(
            p.expiry_from(now).unwrap(),
            Some(now + chrono::Duration::hours(48))
        );
    }

    #[test]
    fn test_expiration_upper_bound() {
        assert!(NewPolicy::new("DOC", "RELEASE")
            .expires_after_hours(MAX_EXPIRATION_HOURS)
            .validate()
            .is_ok());
        assert!(NewPolicy::new("DOC", "RELEASE")
            .expires_after_hours(u32::MAX)
            .validate()
            .is_err());

        let update = PolicyUpdate {
            expiration_hours: Some(Some(MAX_EXPIRATION_HOURS + 1)),
            ..Default::default()
        };
        assert!(matches!(update.validate(), Err(ESignError::Validation(_))));
    }

    #[test]
    fn test_oversized_window_on_stored_policy_is_an_error() {
        // A row written before the bound existed must not panic
        let mut p = policy();
        p.expiration_hours = Some(u32::MAX);
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        assert!(matches!(p.expiry_from(now), Err(ESignError::Validation(_))));
    }

    #[test]
    fn test_expires_after_near_the_end_of_time() {
        assert!(expires_after(DateTime::<Utc>::MAX_UTC, 1).is_err());
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(
            expires_after(now, 24).unwrap(),
            Utc.with_ymd_and_hms(2026, 1, 2, 0, 0, 0).unwrap()
        );
    }
}
