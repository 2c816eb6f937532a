//! Reason policy configuration
//!
//! The policy is split across two inputs: the forbidden-user list comes from the
//! process configuration, while the allowed reasons and the reason pattern live in
//! a ConfigMap that operators can edit without restarting the webhook. Both are
//! combined into a [`PolicyConfig`] once per admission request.

mod configmap;

pub use configmap::ConfigMapPolicySource;

use std::collections::BTreeMap;

use async_trait::async_trait;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use crate::{Result, SUPERUSER};

/// ConfigMap key holding the comma-separated allowed reasons
pub const ALLOWED_REASONS_KEY: &str = "allowedReasons";

/// ConfigMap key holding the reason regex pattern
pub const REASON_PATTERN_KEY: &str = "reasonRegexPattern";

/// Policy snapshot used for a single decision
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyConfig {
    /// Usernames barred from Node operations (exact, case-sensitive)
    pub forbidden_users: Vec<String>,
    /// Reasons accepted verbatim, ignoring case
    pub allowed_reasons: Vec<String>,
    /// Regex a reason may fully match instead; empty means no pattern
    pub reason_pattern: String,
}

impl PolicyConfig {
    /// Build a policy; [`SUPERUSER`] is always added to the forbidden users
    pub fn new(
        forbidden_users: Vec<String>,
        allowed_reasons: Vec<String>,
        reason_pattern: impl Into<String>,
    ) -> Self {
        let mut forbidden_users = forbidden_users;
        if !forbidden_users.iter().any(|u| u == SUPERUSER) {
            forbidden_users.push(SUPERUSER.to_string());
        }
        Self {
            forbidden_users,
            allowed_reasons,
            reason_pattern: reason_pattern.into(),
        }
    }

    /// Build a policy from ConfigMap data
    ///
    /// Missing keys are not an error: they leave the allowed list empty or the
    /// pattern unset.
    pub fn from_config_map_data(
        forbidden_users: &[String],
        data: Option<&BTreeMap<String, String>>,
    ) -> Self {
        let allowed_reasons = match data.and_then(|d| d.get(ALLOWED_REASONS_KEY)) {
            Some(raw) => parse_list(raw),
            None => {
                debug!(key = ALLOWED_REASONS_KEY, "Policy ConfigMap has no allowed reasons");
                Vec::new()
            }
        };

        let reason_pattern = match data.and_then(|d| d.get(REASON_PATTERN_KEY)) {
            Some(pattern) => pattern.clone(),
            None => {
                debug!(key = REASON_PATTERN_KEY, "Policy ConfigMap has no reason pattern");
                String::new()
            }
        };

        Self::new(forbidden_users.to_vec(), allowed_reasons, reason_pattern)
    }

    /// Whether a reason pattern is configured
    pub fn has_pattern(&self) -> bool {
        !self.reason_pattern.is_empty()
    }
}

/// Split a comma-separated list, trimming entries and dropping empty ones
pub fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Source of the policy for each decision
///
/// Called once per non-trivial admission request; implementations must not cache
/// across calls.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait PolicySource: Send + Sync {
    /// Fetch the current policy from the given namespace
    async fn fetch_policy(&self, namespace: &str) -> Result<PolicyConfig>;
}

/// Policy source returning a fixed policy
///
/// Used when running without a cluster and in tests.
#[derive(Debug, Clone)]
pub struct StaticPolicySource {
    policy: PolicyConfig,
}

impl StaticPolicySource {
    /// Create a source that always returns `policy`
    pub fn new(policy: PolicyConfig) -> Self {
        Self { policy }
    }
}

#[async_trait]
impl PolicySource for StaticPolicySource {
    async fn fetch_policy(&self, _namespace: &str) -> Result<PolicyConfig> {
        Ok(self.policy.clone())
    }
}
