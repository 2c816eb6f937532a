//! Node Validation Webhook
//!
//! Handles AdmissionReview requests for Node resources. The handler always
//! answers with an AdmissionReview; the outcome is carried in `allowed` and in
//! the status code:
//!
//! - 200: operation allowed
//! - 403: operation denied by policy
//! - 400: the request or the Node it carries could not be decoded
//! - 500: the policy could not be fetched

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use k8s_openapi::api::core::v1::Node;
use kube::{
    api::DynamicObject,
    core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview, Operation},
    core::{Status, TypeMeta},
};
use tracing::{error, warn};

use crate::decision::{DecisionRequest, NodeState, Verdict};
use crate::operation::Verb;

use super::WebhookState;

/// Error type for webhook operations
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    /// The admission review request was invalid or malformed
    #[error("invalid admission review: {0}")]
    InvalidReview(String),

    /// The API server sent a verb the policy does not cover
    #[error("unsupported admission operation {0:?} for nodes")]
    UnsupportedOperation(Operation),

    /// Decoding the Node or evaluating the policy failed
    #[error(transparent)]
    Validation(#[from] crate::Error),
}

impl WebhookError {
    /// HTTP status code and Kubernetes status reason for this error
    pub fn status(&self) -> (u16, &'static str) {
        match self {
            WebhookError::InvalidReview(_) | WebhookError::UnsupportedOperation(_) => {
                (400, "BadRequest")
            }
            WebhookError::Validation(e) if e.is_bad_request() => (400, "BadRequest"),
            WebhookError::Validation(_) => (500, "InternalError"),
        }
    }

    /// Turn the error into a rejected AdmissionResponse for `request`
    pub fn into_admission_response(
        self,
        request: &AdmissionRequest<DynamicObject>,
    ) -> AdmissionResponse {
        let (code, reason) = self.status();
        let mut response = AdmissionResponse::from(request);
        response.allowed = false;
        response.result = Status::failure(&self.to_string(), reason).with_code(code);
        response
    }

    /// Turn the error into a rejected response when no request could be read
    ///
    /// The uid is unknown, but the review is still answered as `admission.k8s.io/v1`.
    pub fn into_unbound_response(self) -> AdmissionResponse {
        let (code, reason) = self.status();
        let message = self.to_string();
        let mut response = AdmissionResponse::invalid(&message);
        response.types = TypeMeta {
            api_version: ADMISSION_API_VERSION.to_string(),
            kind: "AdmissionReview".to_string(),
        };
        response.result = Status::failure(&message, reason).with_code(code);
        response
    }
}

/// API version of the AdmissionReviews this webhook answers
const ADMISSION_API_VERSION: &str = "admission.k8s.io/v1";

/// Handle validating admission review for Nodes
pub async fn validate_handler(
    State(state): State<Arc<WebhookState>>,
    body: Result<Json<AdmissionReview<DynamicObject>>, JsonRejection>,
) -> Json<AdmissionReview<DynamicObject>> {
    let req = match parse_review(body) {
        Ok(req) => req,
        Err(e) => {
            error!(error = %e, "Failed to parse admission request");
            return Json(e.into_unbound_response().into_review());
        }
    };

    let response = validate_node(&state, &req).await;
    Json(response.into_review())
}

/// Extract the admission request from the posted body
fn parse_review(
    body: Result<Json<AdmissionReview<DynamicObject>>, JsonRejection>,
) -> Result<AdmissionRequest<DynamicObject>, WebhookError> {
    let Json(review) = body.map_err(|e| WebhookError::InvalidReview(e.body_text()))?;
    let request: Result<AdmissionRequest<DynamicObject>, _> = review.try_into();
    request.map_err(|e| WebhookError::InvalidReview(e.to_string()))
}

/// Process a single Node admission request
async fn validate_node(
    state: &WebhookState,
    request: &AdmissionRequest<DynamicObject>,
) -> AdmissionResponse {
    let decision_request = match decision_request(request) {
        Ok(r) => r,
        Err(e) => {
            warn!(
                uid = %request.uid,
                node = %request.name,
                error = %e,
                "Rejecting undecodable node admission request"
            );
            return e.into_admission_response(request);
        }
    };

    match state.validator.validate(&decision_request).await {
        Ok(verdict) => verdict_response(request, &verdict),
        Err(e) => {
            error!(
                uid = %request.uid,
                node = %request.name,
                error = %e,
                "Failed to evaluate node operation"
            );
            WebhookError::from(e).into_admission_response(request)
        }
    }
}

/// Build the decision request from an admission request
pub fn decision_request(
    request: &AdmissionRequest<DynamicObject>,
) -> Result<DecisionRequest, WebhookError> {
    let verb = match &request.operation {
        Operation::Create => Verb::Create,
        Operation::Update => Verb::Update,
        Operation::Delete => Verb::Delete,
        other => return Err(WebhookError::UnsupportedOperation(other.clone())),
    };

    let before = request
        .old_object
        .as_ref()
        .map(|obj| decode_node(&request.name, obj))
        .transpose()?;
    let after = request
        .object
        .as_ref()
        .map(|obj| decode_node(&request.name, obj))
        .transpose()?;

    let principal = request.user_info.username.clone().unwrap_or_default();

    Ok(DecisionRequest::from_states(
        verb,
        principal,
        &request.name,
        before.as_ref(),
        after.as_ref(),
    )?)
}

/// Decode a dynamic object into the Node fields the policy needs
fn decode_node(name: &str, obj: &DynamicObject) -> Result<NodeState, WebhookError> {
    let node: Node = serde_json::to_value(obj)
        .and_then(serde_json::from_value)
        .map_err(|e| crate::Error::decode(format!("failed to decode node {name:?}: {e}")))?;
    Ok(NodeState::from(&node))
}

/// Translate a verdict into an AdmissionResponse
fn verdict_response(
    request: &AdmissionRequest<DynamicObject>,
    verdict: &Verdict,
) -> AdmissionResponse {
    let mut response = AdmissionResponse::from(request);
    response.allowed = verdict.allowed;
    response.result = if verdict.allowed {
        let mut status = Status::success().with_code(200);
        status.message = verdict.message.clone();
        status
    } else {
        Status::failure(&verdict.message, "Forbidden").with_code(403)
    };
    response
}
