//! Client for the clusters_mgmt API of OpenShift Cluster Manager

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use tracing::{debug, info};

use rosa_common::{Error, Result};

use crate::cluster::{ClusterList, ExternalCluster};
use crate::record::ClusterRecord;
use crate::token::TokenSource;

/// Default base URL of the service
pub const DEFAULT_OCM_URL: &str = "https://api.openshift.com";

/// Path of the clusters collection
const CLUSTERS_PATH: &str = "/api/clusters_mgmt/v1/clusters";

/// Per-request timeout for service calls
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Operations the reconciler needs from the cluster-management service.
///
/// Lookups return `Ok(None)` when the cluster does not exist.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterManagementClient: Send + Sync {
    /// Find a cluster by its exact name
    async fn find_cluster_by_name(&self, name: &str) -> Result<Option<ExternalCluster>>;

    /// Fetch a cluster by service id
    async fn get_cluster(&self, id: &str) -> Result<Option<ExternalCluster>>;

    /// Submit a new cluster
    async fn create_cluster(&self, record: &ClusterRecord) -> Result<ExternalCluster>;

    /// Request uninstall of a cluster. Deleting an absent cluster succeeds.
    async fn delete_cluster(&self, id: &str) -> Result<()>;
}

/// Error body returned by the service
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    reason: Option<String>,
}

/// HTTP implementation over a shared connection pool
pub struct OcmClient {
    http: reqwest::Client,
    base_url: String,
    tokens: Arc<TokenSource>,
}

impl OcmClient {
    /// Create a client for `base_url` authenticating with `tokens`
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        tokens: Arc<TokenSource>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            tokens,
        }
    }

    /// Build the pooled HTTP client shared by every call
    pub fn http_client(timeout: Duration) -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .user_agent(concat!("rosa-controlplane/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                Error::internal_with_context("ocm", format!("failed to create HTTP client: {}", e))
            })
    }

    fn clusters_url(&self) -> String {
        format!("{}{}", self.base_url, CLUSTERS_PATH)
    }

    fn cluster_url(&self, id: &str) -> String {
        format!("{}/{}", self.clusters_url(), id)
    }

    async fn send(&self, cluster: &str, request: RequestBuilder) -> Result<Response> {
        let token = self.tokens.access_token().await?;
        request
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| Error::external(cluster, format!("request failed: {}", e)))
    }
}

/// Turn a non-success response into an error carrying the service's reason
async fn error_from_response(cluster: &str, response: Response) -> Error {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    let message = match serde_json::from_str::<ErrorBody>(&text) {
        Ok(ErrorBody {
            reason: Some(reason),
            code,
        }) => match code {
            Some(code) => format!("{}: {}", code, reason),
            None => reason,
        },
        _ if text.is_empty() => status.to_string(),
        _ => text,
    };
    Error::external_with_status(cluster, status.as_u16(), message)
}

async fn decode<T: serde::de::DeserializeOwned>(cluster: &str, response: Response) -> Result<T> {
    response
        .json()
        .await
        .map_err(|e| Error::external(cluster, format!("invalid response body: {}", e)))
}

/// Quote a value for the service's search language
fn search_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

#[async_trait]
impl ClusterManagementClient for OcmClient {
    async fn find_cluster_by_name(&self, name: &str) -> Result<Option<ExternalCluster>> {
        let search = format!("name = {}", search_literal(name));
        let request = self
            .http
            .get(self.clusters_url())
            .query(&[("search", search.as_str()), ("size", "1")]);
        let response = self.send(name, request).await?;
        if !response.status().is_success() {
            return Err(error_from_response(name, response).await);
        }
        let list: ClusterList = decode(name, response).await?;
        debug!(cluster = %name, found = list.items.len(), "searched clusters by name");
        Ok(list.items.into_iter().find(|c| c.name == name))
    }

    async fn get_cluster(&self, id: &str) -> Result<Option<ExternalCluster>> {
        let response = self.send(id, self.http.get(self.cluster_url(id))).await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            s if s.is_success() => decode(id, response).await.map(Some),
            _ => Err(error_from_response(id, response).await),
        }
    }

    async fn create_cluster(&self, record: &ClusterRecord) -> Result<ExternalCluster> {
        let request = self.http.post(self.clusters_url()).json(record);
        let response = self.send(&record.name, request).await?;
        if !response.status().is_success() {
            return Err(error_from_response(&record.name, response).await);
        }
        let cluster: ExternalCluster = decode(&record.name, response).await?;
        info!(cluster = %record.name, id = %cluster.id, "submitted cluster");
        Ok(cluster)
    }

    async fn delete_cluster(&self, id: &str) -> Result<()> {
        let response = self
            .send(id, self.http.delete(self.cluster_url(id)))
            .await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(()),
            s if s.is_success() => {
                info!(id = %id, "requested cluster uninstall");
                Ok(())
            }
            _ => Err(error_from_response(id, response).await),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    use axum::extract::{Path, Query, State};
    use axum::http::{HeaderMap, StatusCode as HttpStatus};
    use axum::response::IntoResponse;
    use axum::routing::get;
    use axum::{Json, Router};
    use chrono::Utc;
    use rosa_common::crd::{ROSAControlPlane, RosaControlPlaneSpec};

    use crate::record::build_cluster_record;

    #[derive(Default)]
    struct FakeOcm {
        clusters: Mutex<HashMap<String, ExternalCluster>>,
        created: Mutex<Vec<serde_json::Value>>,
    }

    type Shared = Arc<FakeOcm>;

    fn authorized(headers: &HeaderMap) -> bool {
        headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v == "Bearer test-token")
    }

    async fn list(
        State(ocm): State<Shared>,
        headers: HeaderMap,
        Query(q): Query<HashMap<String, String>>,
    ) -> impl IntoResponse {
        if !authorized(&headers) {
            return (HttpStatus::UNAUTHORIZED, Json(serde_json::json!({}))).into_response();
        }
        let search = q.get("search").cloned().unwrap_or_default();
        let items: Vec<ExternalCluster> = ocm
            .clusters
            .lock()
            .unwrap()
            .values()
            .filter(|c| search == format!("name = '{}'", c.name))
            .cloned()
            .collect();
        Json(serde_json::json!({"kind": "ClusterList", "items": items})).into_response()
    }

    async fn create(
        State(ocm): State<Shared>,
        Json(body): Json<serde_json::Value>,
    ) -> impl IntoResponse {
        let name = body["name"].as_str().unwrap_or_default().to_string();
        if ocm.clusters.lock().unwrap().values().any(|c| c.name == name) {
            return (
                HttpStatus::BAD_REQUEST,
                Json(serde_json::json!({
                    "kind": "Error",
                    "code": "CLUSTERS-MGMT-400",
                    "reason": format!("Cluster '{}' already exists", name),
                })),
            )
                .into_response();
        }
        let cluster = ExternalCluster {
            id: format!("id-{}", name),
            name,
            state: crate::cluster::ClusterState::Pending,
            ..Default::default()
        };
        ocm.clusters
            .lock()
            .unwrap()
            .insert(cluster.id.clone(), cluster.clone());
        ocm.created.lock().unwrap().push(body);
        (HttpStatus::CREATED, Json(cluster)).into_response()
    }

    async fn fetch(State(ocm): State<Shared>, Path(id): Path<String>) -> impl IntoResponse {
        match ocm.clusters.lock().unwrap().get(&id) {
            Some(c) => Json(c.clone()).into_response(),
            None => HttpStatus::NOT_FOUND.into_response(),
        }
    }

    async fn remove(State(ocm): State<Shared>, Path(id): Path<String>) -> impl IntoResponse {
        match ocm.clusters.lock().unwrap().remove(&id) {
            Some(_) => HttpStatus::NO_CONTENT,
            None => HttpStatus::NOT_FOUND,
        }
    }

    async fn serve() -> (OcmClient, Shared) {
        let ocm = Shared::default();
        let app = Router::new()
            .route(CLUSTERS_PATH, get(list).post(create))
            .route(
                &format!("{}/{{id}}", CLUSTERS_PATH),
                get(fetch).delete(remove),
            )
            .with_state(ocm.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await });

        let http = OcmClient::http_client(Duration::from_secs(5)).unwrap();
        let tokens = Arc::new(TokenSource::new("test-token", "http://unused", http.clone()));
        (
            OcmClient::new(http, format!("http://{}/", addr), tokens),
            ocm,
        )
    }

    fn record(name: &str) -> ClusterRecord {
        let mut cp = ROSAControlPlane::new(
            name,
            RosaControlPlaneSpec {
                region: "us-west-2".to_string(),
                version: "4.14.0".to_string(),
                machine_cidr: "10.0.0.0/16".to_string(),
                account_id: "123".to_string(),
                installer_role_arn: "arn:installer".to_string(),
                support_role_arn: "arn:support".to_string(),
                oidc_id: "oidc".to_string(),
                ..Default::default()
            },
        );
        cp.metadata.namespace = Some("ns1".to_string());
        build_cluster_record(&cp, Utc::now(), Duration::from_secs(3600)).unwrap()
    }

    #[tokio::test]
    async fn create_then_find_by_name() {
        let (client, ocm) = serve().await;
        assert!(client.find_cluster_by_name("c1").await.unwrap().is_none());

        let created = client.create_cluster(&record("c1")).await.unwrap();
        assert_eq!(created.id, "id-c1");

        let found = client.find_cluster_by_name("c1").await.unwrap().unwrap();
        assert_eq!(found.id, "id-c1");
        assert_eq!(ocm.created.lock().unwrap()[0]["region"]["id"], "us-west-2");
    }

    #[tokio::test]
    async fn duplicate_create_surfaces_service_reason() {
        let (client, _ocm) = serve().await;
        client.create_cluster(&record("c1")).await.unwrap();
        let err = client.create_cluster(&record("c1")).await.unwrap_err();
        assert_eq!(err.external_status(), Some(400));
        assert!(err.to_string().contains("already exists"));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn get_and_delete_treat_missing_as_absent() {
        let (client, _ocm) = serve().await;
        let created = client.create_cluster(&record("c1")).await.unwrap();
        assert!(client.get_cluster(&created.id).await.unwrap().is_some());

        client.delete_cluster(&created.id).await.unwrap();
        assert!(client.get_cluster(&created.id).await.unwrap().is_none());
        client.delete_cluster(&created.id).await.unwrap();
    }

    #[tokio::test]
    async fn bad_token_is_rejected() {
        let (mut client, _ocm) = serve().await;
        client.tokens = Arc::new(TokenSource::new("wrong", "http://unused", client.http.clone()));
        let err = client.find_cluster_by_name("c1").await.unwrap_err();
        assert_eq!(err.external_status(), Some(401));
    }

    #[tokio::test]
    async fn unreachable_service_is_retryable() {
        let http = OcmClient::http_client(Duration::from_secs(1)).unwrap();
        let tokens = Arc::new(TokenSource::new("t", "http://unused", http.clone()));
        let client = OcmClient::new(http, "http://127.0.0.1:1", tokens);
        let err = client.get_cluster("abc").await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(err.external_status(), None);
    }

    #[test]
    fn search_literal_escapes_quotes() {
        assert_eq!(search_literal("c1"), "'c1'");
        assert_eq!(search_literal("it's"), "'it''s'");
    }
}
