//! Cherry Servers projects API client
//!
//! Stateless transport for the Project endpoints. Retries and idempotence
//! live one layer up in [`crate::client::RemoteClient`].

use crate::config::ProviderConfig;
use crate::error::{ApiError, Result};
use async_trait::async_trait;
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Header carrying the idempotency key of a create request
pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

/// Remote projects API
#[async_trait]
pub trait ProjectsApi: Send + Sync {
    /// Create a project inside a team
    async fn create(
        &self,
        team_id: u64,
        request: &CreateProject,
        idempotency_key: &str,
    ) -> Result<ApiProject>;

    /// Get a project by ID
    async fn get(&self, project_id: u64) -> Result<ApiProject>;

    /// Update a project
    async fn update(&self, project_id: u64, request: &UpdateProject) -> Result<ApiProject>;

    /// Delete a project
    async fn delete(&self, project_id: u64) -> Result<()>;

    /// List the projects of a team
    async fn list(&self, team_id: u64) -> Result<Vec<ApiProject>>;

    /// List the teams the token has access to
    async fn teams(&self) -> Result<Vec<ApiTeam>>;
}

/// HTTP implementation of [`ProjectsApi`]
pub struct HttpProjectsApi {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl HttpProjectsApi {
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ApiError::InvalidConfig(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url().to_string(),
            token: config.token.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Send a request and decode the JSON body of a successful response
    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = request.bearer_auth(&self.token).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(error_from_body(status, &body));
        }

        Ok(serde_json::from_str(&body)?)
    }

    /// Send a request whose successful response carries no body
    async fn send_empty(&self, request: RequestBuilder) -> Result<()> {
        let response = request.bearer_auth(&self.token).send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(error_from_body(status, &body));
        }

        Ok(())
    }
}

fn error_from_body(status: StatusCode, body: &str) -> ApiError {
    let message = serde_json::from_str::<ApiErrorBody>(body)
        .ok()
        .and_then(|b| b.message)
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| {
            if body.trim().is_empty() {
                status
                    .canonical_reason()
                    .unwrap_or("Unknown error")
                    .to_string()
            } else {
                body.trim().to_string()
            }
        });
    ApiError::status(status.as_u16(), message)
}

#[async_trait]
impl ProjectsApi for HttpProjectsApi {
    async fn create(
        &self,
        team_id: u64,
        request: &CreateProject,
        idempotency_key: &str,
    ) -> Result<ApiProject> {
        let url = self.url(&format!("/teams/{}/projects", team_id));
        tracing::debug!("POST {} (name={}, bgp={})", url, request.name, request.bgp);

        self.send(
            self.client
                .post(&url)
                .header(IDEMPOTENCY_HEADER, idempotency_key)
                .json(request),
        )
        .await
    }

    async fn get(&self, project_id: u64) -> Result<ApiProject> {
        let url = self.url(&format!("/projects/{}", project_id));
        tracing::debug!("GET {}", url);

        self.send(self.client.get(&url)).await
    }

    async fn update(&self, project_id: u64, request: &UpdateProject) -> Result<ApiProject> {
        let url = self.url(&format!("/projects/{}", project_id));
        tracing::debug!("PUT {}", url);

        self.send(self.client.put(&url).json(request)).await
    }

    async fn delete(&self, project_id: u64) -> Result<()> {
        let url = self.url(&format!("/projects/{}", project_id));
        tracing::debug!("DELETE {}", url);

        self.send_empty(self.client.delete(&url)).await
    }

    async fn list(&self, team_id: u64) -> Result<Vec<ApiProject>> {
        let url = self.url(&format!("/teams/{}/projects", team_id));
        tracing::debug!("GET {}", url);

        self.send(self.client.get(&url)).await
    }

    async fn teams(&self) -> Result<Vec<ApiTeam>> {
        let url = self.url("/teams");
        tracing::debug!("GET {}", url);

        self.send(self.client.get(&url)).await
    }
}

// ============ API Types ============

/// Project as returned by the API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiProject {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub team_id: Option<u64>,
    #[serde(default)]
    pub bgp: ApiBgp,
    #[serde(default)]
    pub href: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiBgp {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub local_asn: Option<u32>,
}

/// Team as returned by the API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiTeam {
    pub id: u64,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateProject {
    pub name: String,
    pub bgp: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateProject {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bgp: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[allow(dead_code)]
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    message: Option<String>,
}
