//! ConfigMap-backed policy source

use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::{Api, Client};
use tracing::{debug, error};

use super::{PolicyConfig, PolicySource};
use crate::metrics::POLICY_FETCH_ERRORS;
use crate::{Error, Result};

/// Reads the reason policy from a named ConfigMap on every call
pub struct ConfigMapPolicySource {
    client: Client,
    name: String,
    forbidden_users: Vec<String>,
    timeout: Duration,
}

impl ConfigMapPolicySource {
    /// Create a source for the ConfigMap `name`
    ///
    /// `forbidden_users` is merged into every fetched policy. `timeout` bounds each
    /// API call; an elapsed timeout is an error, never a default policy.
    pub fn new(
        client: Client,
        name: impl Into<String>,
        forbidden_users: Vec<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            name: name.into(),
            forbidden_users,
            timeout,
        }
    }
}

#[async_trait]
impl PolicySource for ConfigMapPolicySource {
    async fn fetch_policy(&self, namespace: &str) -> Result<PolicyConfig> {
        let config_maps: Api<ConfigMap> = Api::namespaced(self.client.clone(), namespace);

        let config_map = match tokio::time::timeout(self.timeout, config_maps.get(&self.name)).await
        {
            Ok(Ok(cm)) => cm,
            Ok(Err(e)) => {
                error!(
                    namespace,
                    name = %self.name,
                    error = %e,
                    "Failed to fetch policy ConfigMap"
                );
                POLICY_FETCH_ERRORS.add(1, &[]);
                return Err(Error::policy_fetch(namespace, &self.name, e.to_string()));
            }
            Err(_) => {
                error!(
                    namespace,
                    name = %self.name,
                    timeout = ?self.timeout,
                    "Timed out fetching policy ConfigMap"
                );
                POLICY_FETCH_ERRORS.add(1, &[]);
                return Err(Error::PolicyTimeout {
                    namespace: namespace.to_string(),
                    name: self.name.clone(),
                    timeout: self.timeout,
                });
            }
        };

        let policy =
            PolicyConfig::from_config_map_data(&self.forbidden_users, config_map.data.as_ref());
        debug!(
            namespace,
            allowed_reasons = policy.allowed_reasons.len(),
            has_pattern = policy.has_pattern(),
            "Fetched reason policy"
        );
        Ok(policy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SUPERUSER;
    use axum::http::{Method, Request, Response, StatusCode};
    use kube::client::Body;
    use serde_json::{json, Value};
    use tower_test::mock;

    const NAMESPACE: &str = "node-operation-validator-system";
    const NAME: &str = "node-operation-validator-config";
    const CONFIG_MAP_PATH: &str = concat!(
        "/api/v1/namespaces/node-operation-validator-system",
        "/configmaps/node-operation-validator-config"
    );

    type Handle = mock::Handle<Request<Body>, Response<Body>>;

    fn mock_source(timeout: Duration) -> (ConfigMapPolicySource, Handle) {
        let (service, handle) = mock::pair::<Request<Body>, Response<Body>>();
        let client = Client::new(service, NAMESPACE);
        let source =
            ConfigMapPolicySource::new(client, NAME, vec!["alice".to_string()], timeout);
        (source, handle)
    }

    /// Answer the next request with `status` and a JSON body
    fn respond_once(mut handle: Handle, status: StatusCode, body: Value) {
        tokio::spawn(async move {
            let (request, send) = handle.next_request().await.expect("service not called");
            assert_eq!(request.method(), Method::GET);
            assert_eq!(request.uri().path(), CONFIG_MAP_PATH);
            send.send_response(
                Response::builder()
                    .status(status)
                    .body(Body::from(serde_json::to_vec(&body).unwrap()))
                    .unwrap(),
            );
        });
    }

    fn config_map(data: Option<Value>) -> Value {
        let mut cm = json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": { "name": NAME, "namespace": NAMESPACE }
        });
        if let Some(data) = data {
            cm["data"] = data;
        }
        cm
    }

    #[tokio::test]
    async fn test_fetch_reads_policy_from_config_map() {
        let (source, handle) = mock_source(Duration::from_secs(5));
        respond_once(
            handle,
            StatusCode::OK,
            config_map(Some(json!({
                "allowedReasons": "Testing, Dependency error",
                "reasonRegexPattern": r"INC-\d+"
            }))),
        );

        let policy = source.fetch_policy(NAMESPACE).await.unwrap();
        assert_eq!(policy.allowed_reasons, vec!["Testing", "Dependency error"]);
        assert_eq!(policy.reason_pattern, r"INC-\d+");
        assert_eq!(policy.forbidden_users, vec!["alice", SUPERUSER]);
    }

    #[tokio::test]
    async fn test_config_map_without_keys_gives_empty_policy() {
        let (source, handle) = mock_source(Duration::from_secs(5));
        respond_once(handle, StatusCode::OK, config_map(None));

        let policy = source.fetch_policy(NAMESPACE).await.unwrap();
        assert!(policy.allowed_reasons.is_empty());
        assert!(!policy.has_pattern());
        assert!(policy.forbidden_users.contains(&SUPERUSER.to_string()));
    }

    #[tokio::test]
    async fn test_missing_config_map_is_fetch_error() {
        let (source, handle) = mock_source(Duration::from_secs(5));
        respond_once(
            handle,
            StatusCode::NOT_FOUND,
            json!({
                "apiVersion": "v1",
                "kind": "Status",
                "metadata": {},
                "status": "Failure",
                "message": format!("configmaps {NAME:?} not found"),
                "reason": "NotFound",
                "code": 404
            }),
        );

        let err = source.fetch_policy(NAMESPACE).await.unwrap_err();
        match &err {
            Error::PolicyFetch {
                namespace,
                name,
                message,
            } => {
                assert_eq!(namespace, NAMESPACE);
                assert_eq!(name, NAME);
                assert!(message.contains("not found"));
            }
            other => panic!("expected PolicyFetch, got {other:?}"),
        }
        assert!(!err.is_bad_request());
    }

    #[tokio::test]
    async fn test_stalled_api_server_is_timeout_error() {
        // The handle is kept alive but never answers
        let (source, _handle) = mock_source(Duration::from_millis(50));

        let err = source.fetch_policy(NAMESPACE).await.unwrap_err();
        match err {
            Error::PolicyTimeout {
                namespace,
                name,
                timeout,
            } => {
                assert_eq!(namespace, NAMESPACE);
                assert_eq!(name, NAME);
                assert_eq!(timeout, Duration::from_millis(50));
            }
            other => panic!("expected PolicyTimeout, got {other:?}"),
        }
    }
}
