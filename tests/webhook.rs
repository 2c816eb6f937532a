//! End-to-end scenarios through the public webhook router

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use node_operation_validator::events::{AuditEmitter, NodeEvent};
use node_operation_validator::operation::Operation;
use node_operation_validator::policy::{PolicyConfig, StaticPolicySource};
use node_operation_validator::validator::NodeValidator;
use node_operation_validator::webhook::{webhook_router, WebhookState};
use node_operation_validator::{REASON_ANNOTATION, SUPERUSER, VALIDATE_NODE_PATH};

const REGULAR_USER: &str = "user";
const MACHINE_CONFIG_DAEMON: &str =
    "system:serviceaccount:openshift-machine-config-operator:machine-config-daemon";

#[derive(Default)]
struct RecordingEmitter {
    events: Mutex<Vec<NodeEvent>>,
}

impl RecordingEmitter {
    fn events(&self) -> Vec<NodeEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl AuditEmitter for RecordingEmitter {
    async fn emit(&self, event: &NodeEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

fn policy() -> PolicyConfig {
    PolicyConfig::new(
        vec![SUPERUSER.to_string()],
        vec![
            "Testing".to_string(),
            "Unauthorized access".to_string(),
            "Invalid configuration".to_string(),
            "Dependency error".to_string(),
        ],
        "",
    )
}

fn setup() -> (Arc<WebhookState>, Arc<RecordingEmitter>) {
    let emitter = Arc::new(RecordingEmitter::default());
    let validator = NodeValidator::new(
        Arc::new(StaticPolicySource::new(policy())),
        emitter.clone(),
        "node-operation-validator-system",
    );
    (Arc::new(WebhookState::new(validator)), emitter)
}

fn node(name: &str, unschedulable: bool, reason: &str) -> Value {
    let mut annotations = serde_json::Map::new();
    if !reason.is_empty() {
        annotations.insert(REASON_ANNOTATION.to_string(), json!(reason));
    }
    json!({
        "apiVersion": "v1",
        "kind": "Node",
        "metadata": { "name": name, "annotations": annotations },
        "spec": { "unschedulable": unschedulable }
    })
}

fn review(name: &str, operation: &str, user: &str, object: Value, old_object: Value) -> Value {
    json!({
        "apiVersion": "admission.k8s.io/v1",
        "kind": "AdmissionReview",
        "request": {
            "uid": format!("uid-{name}"),
            "kind": { "group": "", "version": "v1", "kind": "Node" },
            "resource": { "group": "", "version": "v1", "resource": "nodes" },
            "name": name,
            "operation": operation,
            "userInfo": { "username": user },
            "object": object,
            "oldObject": old_object,
            "dryRun": false
        }
    })
}

/// Build the review for a logical operation the way the API server would
fn review_for(name: &str, operation: &str, user: &str, reason: &str) -> Value {
    match operation {
        "create" => review(name, "CREATE", user, node(name, false, reason), Value::Null),
        "delete" => review(name, "DELETE", user, Value::Null, node(name, false, reason)),
        "cordon" => review(
            name,
            "UPDATE",
            user,
            node(name, true, reason),
            node(name, false, reason),
        ),
        "uncordon" => review(
            name,
            "UPDATE",
            user,
            node(name, false, reason),
            node(name, true, reason),
        ),
        other => panic!("unknown operation {other}"),
    }
}

async fn post(state: Arc<WebhookState>, body: Value) -> Value {
    let request = Request::builder()
        .method("POST")
        .uri(VALIDATE_NODE_PATH)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();

    let response = webhook_router(state).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    let review: Value = serde_json::from_slice(&bytes).unwrap();
    review["response"].clone()
}

#[rustfmt::skip]
const SCENARIOS: &[(&str, &str, &str, &str, bool)] = &[
    // name                                    operation   user                   reason     allowed
    ("CreateWithReason",                       "create",   REGULAR_USER,          "Testing", false),
    ("CreateWithoutReason",                    "create",   REGULAR_USER,          "",        true),
    ("DeleteAsKubeadminWithReason",            "delete",   SUPERUSER,             "Testing", false),
    ("DeleteAsUserWithoutReason",              "delete",   REGULAR_USER,          "",        false),
    ("DeleteAsUserWithValidReason",            "delete",   REGULAR_USER,          "testing", true),
    ("DeleteAsUserWithFreeTextReason",         "delete",   REGULAR_USER,          "for fun", true),
    ("CordonAsKubeadminWithReason",            "cordon",   SUPERUSER,             "Testing", false),
    ("CordonAsUserWithoutReason",              "cordon",   REGULAR_USER,          "",        false),
    ("CordonAsUserWithReason",                 "cordon",   REGULAR_USER,          "Testing", true),
    ("CordonAsUserWithUnknownReason",          "cordon",   REGULAR_USER,          "for fun", false),
    ("CordonAsServiceAccountWithoutReason",    "cordon",   MACHINE_CONFIG_DAEMON, "",        true),
    ("UncordonAsKubeadminWithoutReason",       "uncordon", SUPERUSER,             "",        false),
    ("UncordonAsUserWithReason",               "uncordon", REGULAR_USER,          "Testing", false),
    ("UncordonAsUserWithoutReason",            "uncordon", REGULAR_USER,          "",        true),
    ("UncordonAsServiceAccountWithReason",     "uncordon", MACHINE_CONFIG_DAEMON, "testing", true),
];

#[tokio::test]
async fn scenario_table() {
    for &(name, operation, user, reason, allowed) in SCENARIOS {
        let (state, _) = setup();
        let response = post(state, review_for(name, operation, user, reason)).await;

        assert_eq!(response["uid"], format!("uid-{name}"), "{name}");
        assert_eq!(response["allowed"], allowed, "{name}: {}", response["status"]);
        let expected_code = if allowed { 200 } else { 403 };
        assert_eq!(response["status"]["code"], expected_code, "{name}");
    }
}

#[tokio::test]
async fn approved_operations_are_audited_once() {
    let (state, emitter) = setup();
    let response = post(
        state,
        review_for("worker-7", "cordon", REGULAR_USER, "Dependency error"),
    )
    .await;
    assert_eq!(response["allowed"], true);

    let events = emitter.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].operation, Operation::Cordon);
    assert_eq!(events[0].node_name, "worker-7");
    assert_eq!(events[0].note(), "user: Dependency error");
}

#[tokio::test]
async fn denied_operations_are_not_audited() {
    let (state, emitter) = setup();
    let response = post(state, review_for("worker-7", "delete", SUPERUSER, "Testing")).await;
    assert_eq!(response["allowed"], false);
    assert!(emitter.events().is_empty());
}

#[tokio::test]
async fn plain_update_is_allowed_without_audit() {
    let (state, emitter) = setup();
    let body = review(
        "worker-7",
        "UPDATE",
        SUPERUSER,
        node("worker-7", true, "Testing"),
        node("worker-7", true, ""),
    );
    let response = post(state, body).await;

    assert_eq!(response["allowed"], true);
    assert_eq!(response["status"]["message"], "Node was updated");
    assert!(emitter.events().is_empty());
}

#[tokio::test]
async fn delete_without_old_object_is_bad_request() {
    let (state, _) = setup();
    let body = review("worker-7", "DELETE", REGULAR_USER, Value::Null, Value::Null);
    let response = post(state, body).await;

    assert_eq!(response["allowed"], false);
    assert_eq!(response["status"]["code"], 400);
    assert_eq!(response["status"]["reason"], "BadRequest");
}
