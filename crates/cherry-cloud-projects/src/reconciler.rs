//! Project reconciler
//!
//! Drives one project through its lifecycle:
//!
//! ```text
//! Absent  --create-->  Present
//! Present --update-->  Present
//! Present --replace--> Present (new id)
//! Present --delete-->  Absent
//! ```
//!
//! Every failure after a remote object came into existence is reported with
//! that object's id and the latest observed state, so the caller never loses
//! track of it. Cancellation is honored between remote steps only.

use crate::client::{DeleteOutcome, RemoteClient};
use crate::model::{ProjectSpec, ProjectState};
use cherry_cloud::{
    ActionType, ApplyOutcome, CancellationToken, CloudError, OpResult, Operation,
    OperationError, Plan, Poller, ReplacePolicy, Result, Warning,
};
use tracing::{debug, info, warn};

/// Project the caller already tracks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriorProject {
    pub id: u64,
    pub state: ProjectState,
}

/// Prior state paired with the desired spec
#[derive(Debug, Clone)]
pub struct ReconcileRequest {
    pub prior: Option<PriorProject>,
    pub desired: ProjectSpec,

    /// Idempotency key for creates. Generated when absent.
    pub request_token: Option<String>,
}

type Failure = OperationError<ProjectState>;

fn fail(
    operation: Operation,
    id: Option<u64>,
    last_known: Option<ProjectState>,
    source: CloudError,
) -> Failure {
    OperationError::new(operation, id.map(|id| id.to_string()), source).with_last_known(last_known)
}

fn cancelled(step: &str) -> CloudError {
    CloudError::Cancelled(format!("cancelled before {}", step))
}

pub struct Reconciler {
    client: RemoteClient,
    policy: ReplacePolicy,
    poller: Poller,
}

impl Reconciler {
    pub fn new(client: RemoteClient, policy: ReplacePolicy, poller: Poller) -> Self {
        Self {
            client,
            policy,
            poller,
        }
    }

    pub fn policy(&self) -> ReplacePolicy {
        self.policy
    }

    /// Apply a plan computed for `request`
    pub async fn apply(
        &self,
        plan: &Plan,
        request: &ReconcileRequest,
        cancel: &CancellationToken,
    ) -> OpResult<ApplyOutcome<ProjectState>, ProjectState> {
        let desired = &request.desired;

        let Some(prior) = &request.prior else {
            desired
                .validate()
                .map_err(|e| fail(Operation::Create, None, None, e))?;
            let (id, state) = self
                .create_project(desired, request.request_token.as_deref(), cancel)
                .await?;
            let state = self
                .await_asn(Operation::Create, id, state, cancel)
                .await?;
            return Ok(ApplyOutcome::new(Some(id.to_string()), state));
        };

        desired
            .validate()
            .map_err(|e| fail(Operation::Update, Some(prior.id), Some(prior.state.clone()), e))?;

        match plan.action {
            ActionType::NoOp => {
                debug!("Project {} is up to date", prior.id);
                Ok(ApplyOutcome::new(
                    Some(prior.id.to_string()),
                    prior.state.clone(),
                ))
            }
            ActionType::Update => self.update_in_place(prior, plan, desired, cancel).await,
            ActionType::Replace => self.replace(prior, request, cancel).await,
            ActionType::Create => Err(fail(
                Operation::Update,
                Some(prior.id),
                Some(prior.state.clone()),
                CloudError::InvalidConfig(format!(
                    "a {} plan can't be applied to existing project {}",
                    plan.action, prior.id
                )),
            )),
        }
    }

    /// Read and normalize a project. A 404 surfaces as `NotFound`.
    ///
    /// When neither the response nor the caller knows the team, it is
    /// resolved from the team listings.
    pub async fn read(&self, id: u64, expected_team: Option<u64>) -> Result<ProjectState> {
        let project = self.client.get(id).await?;
        let team = match (project.team_id, expected_team) {
            (None, None) => self.client.locate_team(id).await?,
            _ => expected_team,
        };
        ProjectState::from_remote(&project, team)
    }

    /// Delete a project. A project that is already gone counts as deleted.
    pub async fn delete(&self, id: u64) -> Result<DeleteOutcome> {
        let outcome = self.client.delete(id).await?;
        match outcome {
            DeleteOutcome::Deleted => info!("Deleted project {}", id),
            DeleteOutcome::AlreadyAbsent => {
                warn!("Project {} was already deleted", id)
            }
        }
        Ok(outcome)
    }

    /// Create the remote project. Does not wait for ASN assignment.
    async fn create_project(
        &self,
        desired: &ProjectSpec,
        request_token: Option<&str>,
        cancel: &CancellationToken,
    ) -> OpResult<(u64, ProjectState), ProjectState> {
        if cancel.is_cancelled() {
            return Err(fail(
                Operation::Create,
                None,
                None,
                cancelled("the project was created"),
            ));
        }

        let key = request_token
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let project = self
            .client
            .create(desired.team, &desired.name, desired.bgp, &key)
            .await
            .map_err(|e| fail(Operation::Create, None, None, e))?;

        info!(
            "Created project '{}' (ID: {}) in team {}",
            project.name, project.id, desired.team
        );

        let state = ProjectState::from_remote(&project, Some(desired.team))
            .map_err(|e| fail(Operation::Create, Some(project.id), None, e))?;
        Ok((project.id, state))
    }

    async fn update_in_place(
        &self,
        prior: &PriorProject,
        plan: &Plan,
        desired: &ProjectSpec,
        cancel: &CancellationToken,
    ) -> OpResult<ApplyOutcome<ProjectState>, ProjectState> {
        let id = prior.id;
        let team = prior.state.team;

        if cancel.is_cancelled() {
            return Err(fail(
                Operation::Update,
                Some(id),
                Some(prior.state.clone()),
                cancelled("the project was updated"),
            ));
        }

        // Ownership is checked before anything is written.
        let current = self
            .client
            .get(id)
            .await
            .map_err(|e| fail(Operation::Update, Some(id), Some(prior.state.clone()), e))?;
        let observed = match ProjectState::from_remote(&current, Some(team)) {
            Ok(observed) => observed,
            Err(e) => {
                let last_known = ProjectState::from_remote(&current, None)
                    .unwrap_or_else(|_| prior.state.clone());
                return Err(fail(Operation::Update, Some(id), Some(last_known), e));
            }
        };

        let name = plan.change("name").map(|_| desired.name.as_str());
        let bgp = plan.change("bgp").map(|_| desired.bgp);

        let state = if name.is_none() && bgp.is_none() {
            // Only derived fields drifted; the read is the refresh.
            debug!("Refreshed project {} ({})", id, plan.summary());
            observed
        } else {
            let project = self
                .client
                .update(id, name, bgp)
                .await
                .map_err(|e| fail(Operation::Update, Some(id), Some(observed.clone()), e))?;
            info!("Updated project {} ({})", id, plan.summary());
            ProjectState::from_remote(&project, Some(team))
                .map_err(|e| fail(Operation::Update, Some(id), Some(observed), e))?
        };

        let state = self.await_asn(Operation::Update, id, state, cancel).await?;
        Ok(ApplyOutcome::new(Some(id.to_string()), state))
    }

    async fn replace(
        &self,
        prior: &PriorProject,
        request: &ReconcileRequest,
        cancel: &CancellationToken,
    ) -> OpResult<ApplyOutcome<ProjectState>, ProjectState> {
        let old_id = prior.id;
        info!(
            "Replacing project {} (team {} -> {}, {})",
            old_id, prior.state.team, request.desired.team, self.policy
        );

        match self.policy {
            ReplacePolicy::CreateBeforeDelete => {
                let (new_id, state) = self
                    .create_project(&request.desired, request.request_token.as_deref(), cancel)
                    .await
                    .map_err(|e| {
                        if e.resource_id.is_some() {
                            // The new project exists; the caller has to track it.
                            OperationError { operation: Operation::Update, ..e }
                        } else {
                            fail(
                                Operation::Update,
                                Some(old_id),
                                Some(prior.state.clone()),
                                e.source,
                            )
                        }
                    })?;

                // Once the new project exists the old one is always removed,
                // whatever the token says.
                let dangling = match self.delete(old_id).await {
                    Ok(_) => None,
                    Err(e) => {
                        warn!(
                            "Project {} was replaced by {} but could not be deleted: {}",
                            old_id, new_id, e
                        );
                        Some(Warning::DanglingResource {
                            id: old_id.to_string(),
                            detail: e.to_string(),
                        })
                    }
                };

                let state = self
                    .await_asn(Operation::Update, new_id, state, cancel)
                    .await?;
                let outcome = ApplyOutcome::new(Some(new_id.to_string()), state);
                Ok(match dangling {
                    Some(warning) => outcome.with_warning(warning),
                    None => outcome,
                })
            }
            ReplacePolicy::DeleteBeforeCreate => {
                if cancel.is_cancelled() {
                    return Err(fail(
                        Operation::Update,
                        Some(old_id),
                        Some(prior.state.clone()),
                        cancelled("the project was replaced"),
                    ));
                }

                self.delete(old_id).await.map_err(|e| {
                    fail(Operation::Update, Some(old_id), Some(prior.state.clone()), e)
                })?;

                // The old project is gone: a failure from here on reports its
                // id with no last known state.
                let (new_id, state) = self
                    .create_project(&request.desired, request.request_token.as_deref(), cancel)
                    .await
                    .map_err(|e| match e.resource_id {
                        Some(_) => OperationError { operation: Operation::Update, ..e },
                        None => fail(Operation::Update, Some(old_id), None, e.source),
                    })?;

                let state = self
                    .await_asn(Operation::Update, new_id, state, cancel)
                    .await?;
                Ok(ApplyOutcome::new(Some(new_id.to_string()), state))
            }
        }
    }

    /// Wait until the remote assigned a local ASN, if BGP is enabled.
    async fn await_asn(
        &self,
        operation: Operation,
        id: u64,
        state: ProjectState,
        cancel: &CancellationToken,
    ) -> OpResult<ProjectState, ProjectState> {
        if !state.bgp || state.local_asn.is_some() {
            return Ok(state);
        }

        let client = &self.client;
        let team = state.team;
        let what = format!("ASN assignment for project {}", id);

        self.poller
            .until(&what, cancel, move || async move {
                let project = client.get(id).await?;
                let observed = ProjectState::from_remote(&project, Some(team))?;
                let done = !observed.bgp || observed.local_asn.is_some();
                Ok::<_, CloudError>(done.then_some(observed))
            })
            .await
            .map_err(|e| fail(operation, Some(id), Some(state), e))
    }
}
