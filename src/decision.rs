//! Decision engine for Node operations
//!
//! Combines the classified [`Operation`], the requester's [`IdentityClass`] and
//! the reason annotation into a [`Verdict`]. Evaluation is a pure function of the
//! request and the policy snapshot; fetching the policy and emitting the audit
//! event happen around it in [`crate::validator`].
//!
//! Policy table:
//!
//! | Operation | Reason            |
//! |-----------|-------------------|
//! | Create    | must be absent    |
//! | Delete    | required          |
//! | Cordon    | required          |
//! | Uncordon  | must be absent    |
//! | NoOp      | not checked       |
//!
//! For every operation except NoOp, identities are checked in a fixed order:
//! forbidden users are denied, trusted automation is allowed, and only regular
//! users reach the reason rule.

use k8s_openapi::api::core::v1::Node;
use tracing::{debug, info};

use crate::events::NodeEvent;
use crate::identity::IdentityClass;
use crate::operation::{Operation, Verb};
use crate::policy::PolicyConfig;
use crate::reason;
use crate::{Error, Result, REASON_ANNOTATION};

/// Message for updates that neither cordon nor uncordon
const NOOP_MESSAGE: &str = "Node was updated";

/// What an operation demands of the reason annotation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReasonRule {
    /// The annotation must be present and accepted by the reason policy
    Required,
    /// The annotation must be absent
    Forbidden,
    /// Neither identity nor reason is checked
    Unrestricted,
}

impl ReasonRule {
    /// Look up the rule for an operation
    pub fn for_operation(operation: Operation) -> Self {
        match operation {
            Operation::Delete | Operation::Cordon => Self::Required,
            Operation::Create | Operation::Uncordon => Self::Forbidden,
            Operation::NoOp => Self::Unrestricted,
        }
    }
}

/// The parts of a Node the policy looks at
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeState {
    /// UID of the Node object, if assigned
    pub uid: Option<String>,
    /// `spec.unschedulable`, false when unset
    pub unschedulable: bool,
    /// Value of the reason annotation, if present
    pub reason: Option<String>,
}

impl From<&Node> for NodeState {
    fn from(node: &Node) -> Self {
        Self {
            uid: node.metadata.uid.clone(),
            unschedulable: node
                .spec
                .as_ref()
                .and_then(|spec| spec.unschedulable)
                .unwrap_or(false),
            reason: node
                .metadata
                .annotations
                .as_ref()
                .and_then(|annotations| annotations.get(REASON_ANNOTATION))
                .cloned(),
        }
    }
}

/// Everything the engine needs to decide one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecisionRequest {
    /// Classified operation
    pub operation: Operation,
    /// Requesting username
    pub principal: String,
    /// Name of the Node
    pub node_name: String,
    /// UID of the Node, if known
    pub node_uid: Option<String>,
    /// Reason annotation read from the relevant object state
    pub reason: Option<String>,
}

impl DecisionRequest {
    /// Classify a request from the Node states the API server sent
    ///
    /// Creates read the new object, deletes the old one, and updates need both:
    /// the schedulability change decides the operation and the reason is taken
    /// from the new object.
    pub fn from_states(
        verb: Verb,
        principal: impl Into<String>,
        node_name: impl Into<String>,
        before: Option<&NodeState>,
        after: Option<&NodeState>,
    ) -> Result<Self> {
        let node_name = node_name.into();
        let missing = |field: &str| {
            Error::decode(format!(
                "{verb:?} request for node {node_name:?} carries no {field}"
            ))
        };

        let (operation, state) = match verb {
            Verb::Create => {
                let after = after.ok_or_else(|| missing("object"))?;
                (Operation::Create, after)
            }
            Verb::Delete => {
                let before = before.ok_or_else(|| missing("oldObject"))?;
                (Operation::Delete, before)
            }
            Verb::Update => {
                let before = before.ok_or_else(|| missing("oldObject"))?;
                let after = after.ok_or_else(|| missing("object"))?;
                let operation =
                    Operation::classify(verb, before.unschedulable, after.unschedulable);
                (operation, after)
            }
        };

        Ok(Self {
            operation,
            principal: principal.into(),
            node_uid: state.uid.clone(),
            reason: state.reason.clone(),
            node_name,
        })
    }
}

/// Outcome of a decision
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    /// Whether the operation may proceed
    pub allowed: bool,
    /// Explanation for the operator; never empty
    pub message: String,
}

impl Verdict {
    /// An approval
    pub fn allow(message: impl Into<String>) -> Self {
        Self {
            allowed: true,
            message: message.into(),
        }
    }

    /// A denial
    pub fn deny(message: impl Into<String>) -> Self {
        Self {
            allowed: false,
            message: message.into(),
        }
    }
}

/// A verdict plus the audit event owed for it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    /// The verdict returned to the caller
    pub verdict: Verdict,
    /// Present exactly when an operation other than NoOp was allowed
    pub event: Option<NodeEvent>,
}

impl Decision {
    fn deny(message: String) -> Self {
        Self {
            verdict: Verdict::deny(message),
            event: None,
        }
    }

    fn allow_untracked(message: &str) -> Self {
        Self {
            verdict: Verdict::allow(message),
            event: None,
        }
    }

    fn allow_with_event(request: &DecisionRequest, message: String, reason: String) -> Self {
        Self {
            verdict: Verdict::allow(message),
            event: Some(NodeEvent {
                node_name: request.node_name.clone(),
                node_uid: request.node_uid.clone(),
                operation: request.operation,
                principal: request.principal.clone(),
                reason,
            }),
        }
    }
}

/// Decide a request that needs no policy at all
///
/// Returns `None` when the operation has to be evaluated against a policy, so
/// callers can skip the policy fetch for plain updates.
pub fn without_policy(request: &DecisionRequest) -> Option<Decision> {
    if ReasonRule::for_operation(request.operation) != ReasonRule::Unrestricted {
        return None;
    }
    debug!(node = %request.node_name, "Node update does not change schedulability");
    Some(Decision::allow_untracked(NOOP_MESSAGE))
}

/// Decide a request against a policy snapshot
pub fn evaluate(request: &DecisionRequest, policy: &PolicyConfig) -> Decision {
    if let Some(decision) = without_policy(request) {
        return decision;
    }

    let rule = ReasonRule::for_operation(request.operation);

    let user = request.principal.as_str();
    let operation = request.operation;
    let supplied_reason = request.reason.clone().unwrap_or_default();

    match IdentityClass::classify(user, &policy.forbidden_users) {
        IdentityClass::Forbidden => {
            info!(
                node = %request.node_name,
                user,
                %operation,
                denial_reason = "forbidden user",
                "Node operation denied"
            );
            Decision::deny(forbidden_user_message(user, operation, rule))
        }
        IdentityClass::ServiceAccount => {
            info!(
                node = %request.node_name,
                user,
                %operation,
                approval_reason = "service account",
                "Node operation approved"
            );
            Decision::allow_with_event(
                request,
                format!("Service account {user:?} is allowed to {operation} nodes"),
                supplied_reason,
            )
        }
        IdentityClass::NodeAgent => {
            info!(
                node = %request.node_name,
                user,
                %operation,
                approval_reason = "node",
                "Node operation approved"
            );
            Decision::allow_with_event(
                request,
                format!("Node {user:?} is allowed to {operation} nodes"),
                supplied_reason,
            )
        }
        IdentityClass::Regular => evaluate_regular(request, rule, policy),
    }
}

/// Apply the reason rule for a regular user
fn evaluate_regular(
    request: &DecisionRequest,
    rule: ReasonRule,
    policy: &PolicyConfig,
) -> Decision {
    let user = request.principal.as_str();
    let operation = request.operation;
    let approved = || format!("{operation} operation has been approved");

    match (rule, request.reason.as_deref()) {
        (ReasonRule::Required, None) => {
            info!(
                node = %request.node_name,
                user,
                %operation,
                denial_reason = "reason annotation missing",
                "Node operation denied"
            );
            Decision::deny(format!(
                "You must add the {REASON_ANNOTATION:?} annotation to {operation} a node"
            ))
        }
        (ReasonRule::Required, Some(reason)) => {
            match reason::evaluate(reason, operation, policy) {
                Some(acceptance) => {
                    info!(
                        node = %request.node_name,
                        user,
                        %operation,
                        reason,
                        accepted_by = acceptance.as_str(),
                        "Node operation approved"
                    );
                    Decision::allow_with_event(request, approved(), reason.to_string())
                }
                None => {
                    info!(
                        node = %request.node_name,
                        user,
                        %operation,
                        reason,
                        denial_reason = "invalid reason",
                        "Node operation denied"
                    );
                    Decision::deny(invalid_reason_message(reason, policy))
                }
            }
        }
        (ReasonRule::Forbidden, Some(_)) => {
            info!(
                node = %request.node_name,
                user,
                %operation,
                denial_reason = "reason annotation present",
                "Node operation denied"
            );
            Decision::deny(format!(
                "Don't forget to remove the {REASON_ANNOTATION:?} annotation from the node \
                 before you {operation} it"
            ))
        }
        (ReasonRule::Forbidden, None) => {
            info!(node = %request.node_name, user, %operation, "Node operation approved");
            Decision::allow_with_event(request, approved(), String::new())
        }
        (ReasonRule::Unrestricted, _) => Decision::allow_untracked(NOOP_MESSAGE),
    }
}

fn forbidden_user_message(user: &str, operation: Operation, rule: ReasonRule) -> String {
    let annotation_hint = match rule {
        ReasonRule::Required => format!("You must also add the {REASON_ANNOTATION:?} annotation"),
        _ => format!("The {REASON_ANNOTATION:?} annotation must not be set"),
    };
    format!(
        "{user:?} user is not allowed to {operation} a node. \
         Please log in with a privileged user. {annotation_hint}"
    )
}

fn invalid_reason_message(reason: &str, policy: &PolicyConfig) -> String {
    match (policy.allowed_reasons.is_empty(), policy.has_pattern()) {
        (true, false) => format!(
            "Invalid reason {reason:?}: no allowed reasons or reason pattern are configured"
        ),
        (_, false) => format!(
            "Invalid reason {reason:?}. Allowed reasons: [{}]",
            policy.allowed_reasons.join(", ")
        ),
        (_, true) => format!(
            "Invalid reason {reason:?}. Allowed reasons: [{}], or a reason matching {:?}",
            policy.allowed_reasons.join(", "),
            policy.reason_pattern
        ),
    }
}
