//! Error types for the node operation validator
//!
//! A denial is never an error: denials are [`Verdict`](crate::decision::Verdict)s.
//! Errors cover the cases where no verdict can be produced at all, either because
//! the request could not be decoded or because the policy could not be fetched.

use std::time::Duration;

use thiserror::Error;

/// Main error type for validator operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// The policy ConfigMap could not be read
    #[error("failed to fetch policy ConfigMap {namespace}/{name}: {message}")]
    PolicyFetch {
        /// Namespace the ConfigMap was looked up in
        namespace: String,
        /// Name of the ConfigMap
        name: String,
        /// Description of what failed
        message: String,
    },

    /// The policy fetch did not complete within the configured timeout
    #[error("timed out after {timeout:?} fetching policy ConfigMap {namespace}/{name}")]
    PolicyTimeout {
        /// Namespace the ConfigMap was looked up in
        namespace: String,
        /// Name of the ConfigMap
        name: String,
        /// The timeout that elapsed
        timeout: Duration,
    },

    /// The admission request or the Node it carries could not be decoded
    #[error("decode error: {0}")]
    Decode(String),

    /// Invalid startup configuration (TLS material, flags)
    #[error("configuration error: {0}")]
    Config(String),

    /// Serialization error (manifests, responses)
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The HTTPS server failed while serving
    #[error("server error: {0}")]
    Server(String),
}

impl Error {
    /// Create a decode error with the given message
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    /// Create a configuration error with the given message
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Create a policy fetch error for the given ConfigMap
    pub fn policy_fetch(
        namespace: impl Into<String>,
        name: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::PolicyFetch {
            namespace: namespace.into(),
            name: name.into(),
            message: msg.into(),
        }
    }

    /// Whether the caller sent something undecodable
    ///
    /// Everything else is an infrastructure failure on our side.
    pub fn is_bad_request(&self) -> bool {
        matches!(self, Self::Decode(_))
    }
}
