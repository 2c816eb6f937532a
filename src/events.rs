//! Audit events for approved Node operations.
//!
//! Every approved create, delete, cordon or uncordon leaves a Kubernetes Event on
//! the Node recording who did it and why, visible via `kubectl describe node`.
//!
//! Events are **fire-and-forget**: failures are logged as warnings and never
//! propagate errors. A failed event must never change an admission verdict.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::Client;
use opentelemetry::KeyValue;
use tracing::{debug, warn};

#[cfg(test)]
use mockall::automock;

use crate::metrics::EVENTS_EMITTED;
use crate::operation::Operation;

/// Event reason shown in the REASON column of `kubectl get events`
pub const NODE_OPERATION_REASON: &str = "NodeOperation";

/// Audit record for one approved Node operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeEvent {
    /// Name of the affected Node
    pub node_name: String,
    /// UID of the affected Node, when the object already has one
    pub node_uid: Option<String>,
    /// The approved operation
    pub operation: Operation,
    /// Username that performed it
    pub principal: String,
    /// Reason annotation text; empty when none was given
    pub reason: String,
}

impl NodeEvent {
    /// Human-readable note: `<principal>: <reason>`
    pub fn note(&self) -> String {
        format!("{}: {}", self.principal, self.reason)
    }

    /// Reference to the Node the event is attached to
    pub fn object_ref(&self) -> ObjectReference {
        ObjectReference {
            api_version: Some("v1".to_string()),
            kind: Some("Node".to_string()),
            name: Some(self.node_name.clone()),
            uid: self.node_uid.clone(),
            ..Default::default()
        }
    }
}

/// Sink for audit events.
///
/// Implementations are expected to be fire-and-forget: `emit()` logs a warning
/// on failure but never returns an error.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait AuditEmitter: Send + Sync {
    /// Emit an audit event for an approved operation
    async fn emit(&self, event: &NodeEvent);
}

/// Production implementation wrapping `kube::runtime::events::Recorder`.
pub struct KubeAuditEmitter {
    recorder: Recorder,
}

impl KubeAuditEmitter {
    /// Create a new emitter reporting as `reporter_name`.
    ///
    /// The name appears as the "reportingComponent" on Events.
    pub fn new(client: Client, reporter_name: &str) -> Self {
        let reporter = Reporter {
            controller: reporter_name.to_string(),
            instance: std::env::var("POD_NAME").ok(),
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

#[async_trait]
impl AuditEmitter for KubeAuditEmitter {
    async fn emit(&self, event: &NodeEvent) {
        let k8s_event = Event {
            type_: EventType::Normal,
            reason: NODE_OPERATION_REASON.to_string(),
            note: Some(event.note()),
            action: event.operation.action().to_string(),
            secondary: None,
        };

        let result = match self.recorder.publish(&k8s_event, &event.object_ref()).await {
            Ok(()) => {
                debug!(
                    node = %event.node_name,
                    operation = %event.operation,
                    "Published node operation event"
                );
                "success"
            }
            Err(e) => {
                warn!(
                    node = %event.node_name,
                    operation = %event.operation,
                    error = %e,
                    "Failed to publish node operation event"
                );
                "error"
            }
        };

        EVENTS_EMITTED.add(
            1,
            &[
                KeyValue::new("operation", event.operation.as_str()),
                KeyValue::new("result", result),
            ],
        );
    }
}
