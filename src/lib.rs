//! Node Operation Validator - admission policy for Node lifecycle operations
//!
//! A validating admission webhook that decides whether a Node may be created,
//! deleted, cordoned or uncordoned. Human operators must justify destructive
//! operations with a reason annotation; trusted automation bypasses the check and
//! selected identities are barred outright.
//!
//! # Modules
//!
//! - [`operation`] - Derive the logical Node operation from an admission verb
//! - [`identity`] - Classify the requesting principal
//! - [`reason`] - Evaluate a reason annotation against the configured policy
//! - [`policy`] - Policy configuration and the ConfigMap-backed policy source
//! - [`decision`] - The decision engine producing verdicts
//! - [`validator`] - Fetch, decide, and audit for one request
//! - [`events`] - Kubernetes Event emission for approved operations
//! - [`webhook`] - AdmissionReview HTTP handler
//! - [`server`] - TLS server bootstrap
//! - [`manifest`] - ValidatingWebhookConfiguration and RBAC generation
//! - [`telemetry`] / [`metrics`] - Logging, tracing and decision metrics
//! - [`error`] - Error types

#![deny(missing_docs)]

pub mod decision;
pub mod error;
pub mod events;
pub mod identity;
pub mod manifest;
pub mod metrics;
pub mod operation;
pub mod policy;
pub mod reason;
pub mod server;
pub mod telemetry;
pub mod validator;
pub mod webhook;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

// =============================================================================
// Policy Constants
// =============================================================================

/// Annotation carrying the operator's justification for a Node operation
pub const REASON_ANNOTATION: &str = "node.dana.io/reason";

/// Username prefix of Kubernetes ServiceAccount principals
pub const SERVICE_ACCOUNT_PREFIX: &str = "system:serviceaccount:";

/// Username prefix of kubelet (node agent) principals
pub const NODE_AGENT_PREFIX: &str = "system:node:";

/// Built-in superuser that is always forbidden from Node operations
pub const SUPERUSER: &str = "system:admin";

// =============================================================================
// Default Configuration Constants
// =============================================================================

/// Name of the ConfigMap holding the reason policy
pub const DEFAULT_CONFIG_NAME: &str = "node-operation-validator-config";

/// Namespace of the ConfigMap holding the reason policy
pub const DEFAULT_CONFIG_NAMESPACE: &str = "node-operation-validator-system";

/// HTTP path the API server posts Node AdmissionReviews to
pub const VALIDATE_NODE_PATH: &str = "/validate-v1-node";

/// Default HTTPS port for the webhook server
pub const DEFAULT_WEBHOOK_PORT: u16 = 9443;
