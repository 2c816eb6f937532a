//! Validating Admission Webhook for Nodes
//!
//! The API server posts an AdmissionReview for every Node create, update and
//! delete. The handler decodes the Node states, hands them to the
//! [`NodeValidator`], and translates the verdict (or the failure to reach one)
//! back into an AdmissionResponse.

pub mod node;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};

use crate::validator::NodeValidator;
use crate::VALIDATE_NODE_PATH;

/// Shared state for webhook handlers
#[derive(Clone)]
pub struct WebhookState {
    /// Decides each Node admission request
    pub validator: Arc<NodeValidator>,
}

impl WebhookState {
    /// Create a new webhook state around the given validator
    pub fn new(validator: NodeValidator) -> Self {
        Self {
            validator: Arc::new(validator),
        }
    }
}

/// Create the webhook router
///
/// Routes:
/// - POST /validate-v1-node - Validate Node admission reviews
/// - GET /healthz, /readyz - Liveness and readiness probes
pub fn webhook_router(state: Arc<WebhookState>) -> Router {
    Router::new()
        .route(VALIDATE_NODE_PATH, post(node::validate_handler))
        .route("/healthz", get(|| async { "ok" }))
        .route("/readyz", get(|| async { "ok" }))
        .with_state(state)
}
