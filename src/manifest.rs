//! Webhook registration and RBAC manifests
//!
//! `node-operation-validator manifest` prints the ValidatingWebhookConfiguration
//! the API server needs to route Node admission requests to the webhook Service,
//! followed by the ClusterRole and binding the webhook needs to read its policy
//! ConfigMap and record Events. Without that RBAC every policy fetch fails and
//! the `Ignore` failure policy lets every request through.

use k8s_openapi::api::admissionregistration::v1::{
    RuleWithOperations, ServiceReference, ValidatingWebhook, ValidatingWebhookConfiguration,
    WebhookClientConfig,
};
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding, PolicyRule, RoleRef, Subject};
use kube::api::ObjectMeta;

use crate::error::Error;
use crate::VALIDATE_NODE_PATH;

/// Name of the webhook entry inside the configuration
pub const WEBHOOK_NAME: &str = "nodeoperation.dana.io";

/// Name of the ValidatingWebhookConfiguration object
pub const CONFIGURATION_NAME: &str = "node-operation-validator";

/// Name of the ClusterRole and ClusterRoleBinding
pub const ROLE_NAME: &str = "node-operation-validator";

/// Where the API server should send admission requests
#[derive(Debug, Clone)]
pub struct ManifestConfig {
    /// Name of the webhook Service
    pub service_name: String,
    /// Namespace of the webhook Service
    pub service_namespace: String,
    /// Service port the webhook listens behind
    pub service_port: i32,
    /// ServiceAccount the webhook runs as, in `service_namespace`
    pub service_account: String,
    /// PEM CA bundle that signed the serving certificate
    pub ca_bundle: Option<String>,
}

impl Default for ManifestConfig {
    fn default() -> Self {
        Self {
            service_name: "node-operation-validator-webhook-service".to_string(),
            service_namespace: crate::DEFAULT_CONFIG_NAMESPACE.to_string(),
            service_port: 443,
            service_account: "node-operation-validator".to_string(),
            ca_bundle: None,
        }
    }
}

/// Build the ValidatingWebhookConfiguration for Node operations
///
/// Failures to reach the webhook are ignored so that a broken validator never
/// blocks kubelet registration.
pub fn webhook_configuration(config: &ManifestConfig) -> ValidatingWebhookConfiguration {
    ValidatingWebhookConfiguration {
        metadata: ObjectMeta {
            name: Some(CONFIGURATION_NAME.to_string()),
            ..Default::default()
        },
        webhooks: Some(vec![ValidatingWebhook {
            name: WEBHOOK_NAME.to_string(),
            admission_review_versions: vec!["v1".to_string()],
            side_effects: "None".to_string(),
            failure_policy: Some("Ignore".to_string()),
            rules: Some(vec![RuleWithOperations {
                operations: Some(vec![
                    "CREATE".to_string(),
                    "UPDATE".to_string(),
                    "DELETE".to_string(),
                ]),
                api_groups: Some(vec![String::new()]),
                api_versions: Some(vec!["v1".to_string()]),
                resources: Some(vec!["nodes".to_string()]),
                scope: None,
            }]),
            client_config: WebhookClientConfig {
                service: Some(ServiceReference {
                    name: config.service_name.clone(),
                    namespace: config.service_namespace.clone(),
                    path: Some(VALIDATE_NODE_PATH.to_string()),
                    port: Some(config.service_port),
                }),
                ca_bundle: config
                    .ca_bundle
                    .as_ref()
                    .map(|pem| k8s_openapi::ByteString(pem.as_bytes().to_vec())),
                ..Default::default()
            },
            ..Default::default()
        }]),
    }
}

fn rule(api_group: &str, resource: &str, verbs: &[&str]) -> PolicyRule {
    PolicyRule {
        api_groups: Some(vec![api_group.to_string()]),
        resources: Some(vec![resource.to_string()]),
        verbs: verbs.iter().map(|v| v.to_string()).collect(),
        ..Default::default()
    }
}

/// ClusterRole granting ConfigMap reads and Event writes
///
/// Events on cluster-scoped Nodes land in the `default` namespace, so the grant
/// has to be cluster-wide.
pub fn cluster_role() -> ClusterRole {
    ClusterRole {
        metadata: ObjectMeta {
            name: Some(ROLE_NAME.to_string()),
            ..Default::default()
        },
        rules: Some(vec![
            rule("", "configmaps", &["get", "list", "watch"]),
            rule("", "events", &["create", "patch"]),
            rule("events.k8s.io", "events", &["create", "patch"]),
        ]),
        ..Default::default()
    }
}

/// Bind the ClusterRole to the webhook's ServiceAccount
pub fn cluster_role_binding(config: &ManifestConfig) -> ClusterRoleBinding {
    ClusterRoleBinding {
        metadata: ObjectMeta {
            name: Some(ROLE_NAME.to_string()),
            ..Default::default()
        },
        role_ref: RoleRef {
            api_group: "rbac.authorization.k8s.io".to_string(),
            kind: "ClusterRole".to_string(),
            name: ROLE_NAME.to_string(),
        },
        subjects: Some(vec![Subject {
            kind: "ServiceAccount".to_string(),
            name: config.service_account.clone(),
            namespace: Some(config.service_namespace.clone()),
            ..Default::default()
        }]),
    }
}

/// Render the webhook configuration and RBAC as a multi-document YAML stream
pub fn render(config: &ManifestConfig) -> Result<String, Error> {
    let documents = [
        to_yaml(&webhook_configuration(config))?,
        to_yaml(&cluster_role())?,
        to_yaml(&cluster_role_binding(config))?,
    ];
    Ok(documents.join("---\n"))
}

fn to_yaml<T: serde::Serialize>(object: &T) -> Result<String, Error> {
    serde_yaml::to_string(object)
        .map_err(|e| Error::serialization(format!("failed to render manifest: {}", e)))
}
