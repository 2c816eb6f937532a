//! Principal classification
//!
//! Order matters: a forbidden username is checked before the trusted prefixes, so
//! listing e.g. `system:node:worker-1` as forbidden bars it even though it also
//! looks like a kubelet identity.

use crate::{NODE_AGENT_PREFIX, SERVICE_ACCOUNT_PREFIX};

/// Category of the principal requesting a Node operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityClass {
    /// Explicitly barred from Node operations
    Forbidden,
    /// Kubernetes ServiceAccount (`system:serviceaccount:*`)
    ServiceAccount,
    /// Kubelet identity (`system:node:*`)
    NodeAgent,
    /// Any other principal, typically a human operator
    Regular,
}

impl IdentityClass {
    /// Classify a username; first match wins
    pub fn classify(principal: &str, forbidden_users: &[String]) -> Self {
        if forbidden_users.iter().any(|user| user == principal) {
            Self::Forbidden
        } else if principal.starts_with(SERVICE_ACCOUNT_PREFIX) {
            Self::ServiceAccount
        } else if principal.starts_with(NODE_AGENT_PREFIX) {
            Self::NodeAgent
        } else {
            Self::Regular
        }
    }

    /// Automation identities that bypass the reason policy
    pub fn is_trusted(&self) -> bool {
        matches!(self, Self::ServiceAccount | Self::NodeAgent)
    }

    /// Label value for logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Forbidden => "forbidden",
            Self::ServiceAccount => "service_account",
            Self::NodeAgent => "node",
            Self::Regular => "regular",
        }
    }
}
