//! Retrying, idempotent access to the projects API

use crate::api::{ApiProject, CreateProject, ProjectsApi, UpdateProject};
use cherry_cloud::{CloudError, Result, RetryConfig, retry};
use std::sync::Arc;

/// Outcome of a delete call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    /// The project did not exist (e.g. a retried delete)
    AlreadyAbsent,
}

/// Remote API client for projects.
///
/// Owns no resource state. Transient failures are retried; a create that
/// hits "already exists" adopts the existing project, a delete that hits
/// "not found" reports [`DeleteOutcome::AlreadyAbsent`].
#[derive(Clone)]
pub struct RemoteClient {
    api: Arc<dyn ProjectsApi>,
    retry: RetryConfig,
}

impl RemoteClient {
    pub fn new(api: Arc<dyn ProjectsApi>, retry: RetryConfig) -> Self {
        Self { api, retry }
    }

    pub async fn create(
        &self,
        team_id: u64,
        name: &str,
        bgp: bool,
        idempotency_key: &str,
    ) -> Result<ApiProject> {
        let api = &self.api;
        let request = CreateProject {
            name: name.to_string(),
            bgp,
        };
        let request = &request;

        let result = retry(&self.retry, "create project", move || async move {
            api.create(team_id, request, idempotency_key)
                .await
                .map_err(CloudError::from)
        })
        .await;

        match result {
            Err(CloudError::Conflict(detail)) => {
                tracing::debug!(
                    "create of project '{}' in team {} conflicted ({}); looking for an existing one",
                    name,
                    team_id,
                    detail
                );
                match self.find_by_name(team_id, name).await? {
                    Some(existing) => {
                        tracing::info!(
                            "Project '{}' already exists in team {} (ID: {}); adopting it",
                            name,
                            team_id,
                            existing.id
                        );
                        Ok(existing)
                    }
                    None => Err(CloudError::Conflict(detail)),
                }
            }
            other => other,
        }
    }

    pub async fn get(&self, project_id: u64) -> Result<ApiProject> {
        let api = &self.api;
        retry(&self.retry, "get project", move || async move {
            api.get(project_id).await.map_err(CloudError::from)
        })
        .await
    }

    pub async fn update(
        &self,
        project_id: u64,
        name: Option<&str>,
        bgp: Option<bool>,
    ) -> Result<ApiProject> {
        let api = &self.api;
        let request = UpdateProject {
            name: name.map(str::to_string),
            bgp,
        };
        let request = &request;

        retry(&self.retry, "update project", move || async move {
            api.update(project_id, request)
                .await
                .map_err(CloudError::from)
        })
        .await
    }

    pub async fn delete(&self, project_id: u64) -> Result<DeleteOutcome> {
        let api = &self.api;
        let result = retry(&self.retry, "delete project", move || async move {
            api.delete(project_id).await.map_err(CloudError::from)
        })
        .await;

        match result {
            Ok(()) => Ok(DeleteOutcome::Deleted),
            Err(CloudError::NotFound(_)) => Ok(DeleteOutcome::AlreadyAbsent),
            Err(e) => Err(e),
        }
    }

    /// Find a project in a team by name
    pub async fn find_by_name(&self, team_id: u64, name: &str) -> Result<Option<ApiProject>> {
        let api = &self.api;
        let projects = retry(&self.retry, "list projects", move || async move {
            api.list(team_id).await.map_err(CloudError::from)
        })
        .await?;

        Ok(projects.into_iter().find(|p| p.name == name))
    }

    /// Find the team a project belongs to by scanning the teams' project
    /// lists. `None` when no accessible team lists it.
    pub async fn locate_team(&self, project_id: u64) -> Result<Option<u64>> {
        let api = &self.api;
        let teams = retry(&self.retry, "list teams", move || async move {
            api.teams().await.map_err(CloudError::from)
        })
        .await?;

        for team in teams {
            let team_id = team.id;
            let projects = retry(&self.retry, "list projects", move || async move {
                api.list(team_id).await.map_err(CloudError::from)
            })
            .await?;
            if projects.iter().any(|p| p.id == project_id) {
                tracing::debug!("Project {} found in team {}", project_id, team_id);
                return Ok(Some(team_id));
            }
        }
        Ok(None)
    }
}
