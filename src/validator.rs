//! Request-level orchestration: fetch the policy, decide, audit
//!
//! The validator holds no per-request state. Each call fetches a fresh policy
//! (plain updates skip the fetch entirely), evaluates it, and emits at most one
//! audit event.

use std::sync::Arc;

use crate::decision::{self, DecisionRequest, Verdict};
use crate::events::AuditEmitter;
use crate::metrics::{DecisionOutcome, DecisionTimer};
use crate::policy::PolicySource;
use crate::Result;

/// Validates Node operations against the reason policy
pub struct NodeValidator {
    policy_source: Arc<dyn PolicySource>,
    emitter: Arc<dyn AuditEmitter>,
    policy_namespace: String,
}

impl NodeValidator {
    /// Create a validator reading the policy from `policy_namespace`
    pub fn new(
        policy_source: Arc<dyn PolicySource>,
        emitter: Arc<dyn AuditEmitter>,
        policy_namespace: impl Into<String>,
    ) -> Self {
        Self {
            policy_source,
            emitter,
            policy_namespace: policy_namespace.into(),
        }
    }

    /// Decide a request
    ///
    /// A policy that cannot be fetched is an error, not a denial. Approved
    /// operations are audited before the verdict is returned.
    pub async fn validate(&self, request: &DecisionRequest) -> Result<Verdict> {
        let timer = DecisionTimer::start(request.operation);

        let decision = match decision::without_policy(request) {
            Some(decision) => decision,
            None => match self.policy_source.fetch_policy(&self.policy_namespace).await {
                Ok(policy) => decision::evaluate(request, &policy),
                Err(e) => {
                    timer.complete(DecisionOutcome::Error);
                    return Err(e);
                }
            },
        };

        if let Some(event) = &decision.event {
            self.emitter.emit(event).await;
        }

        timer.complete(if decision.verdict.allowed {
            DecisionOutcome::Allow
        } else {
            DecisionOutcome::Deny
        });
        Ok(decision.verdict)
    }
}
