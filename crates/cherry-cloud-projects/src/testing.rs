//! In-memory projects API for tests
//!
//! Behaves like the remote service: idempotency keys, unique names per team,
//! ASN assignment on BGP enablement, and 404s for unknown projects. Faults can
//! be queued per operation.

use crate::api::{ApiBgp, ApiProject, ApiTeam, CreateProject, ProjectsApi, UpdateProject};
use crate::error::{ApiError, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::Mutex;

/// First ASN handed out by the fake
pub const FIRST_ASN: u32 = 65000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiOp {
    Create,
    Get,
    Update,
    Delete,
    List,
    Teams,
}

enum Fault {
    /// Fail before applying anything
    Error(ApiError),
    /// Apply the operation, then report a transport failure
    LostResponse,
}

#[derive(Default)]
struct Inner {
    next_id: u64,
    next_asn: u32,
    projects: BTreeMap<u64, Stored>,
    tokens: HashMap<String, u64>,
    teams: Option<HashSet<u64>>,
    faults: HashMap<ApiOp, VecDeque<Fault>>,
    calls: HashMap<ApiOp, usize>,
    asn_delay: u32,
    omit_team_ids: bool,
}

struct Stored {
    project: ApiProject,
    /// Reads left before the assigned ASN becomes visible
    hidden_asn_reads: u32,
}

impl Inner {
    fn enter(&mut self, op: ApiOp) -> Option<Fault> {
        *self.calls.entry(op).or_default() += 1;
        self.faults.get_mut(&op).and_then(|q| q.pop_front())
    }

    fn assign_asn(&mut self) -> u32 {
        let asn = self.next_asn;
        self.next_asn += 1;
        asn
    }

    fn visible(&self, stored: &Stored) -> ApiProject {
        let mut project = stored.project.clone();
        if stored.hidden_asn_reads > 0 {
            project.bgp.local_asn = None;
        }
        if self.omit_team_ids {
            project.team_id = None;
        }
        project
    }
}

pub struct InMemoryProjects {
    inner: Mutex<Inner>,
}

impl Default for InMemoryProjects {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryProjects {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                next_id: 1,
                next_asn: FIRST_ASN,
                ..Default::default()
            }),
        }
    }

    /// Restrict the known teams; creates in other teams get a 404
    pub fn with_teams(self, teams: impl IntoIterator<Item = u64>) -> Self {
        self.lock().teams = Some(teams.into_iter().collect());
        self
    }

    /// Hide newly assigned ASNs for the given number of reads
    pub fn with_asn_delay(self, reads: u32) -> Self {
        self.lock().asn_delay = reads;
        self
    }

    /// Leave `team_id` out of project responses, like the public API does
    pub fn without_team_ids(self) -> Self {
        self.lock().omit_team_ids = true;
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Queue an error for the next call of `op`
    pub fn fail_next(&self, op: ApiOp, error: ApiError) {
        self.lock()
            .faults
            .entry(op)
            .or_default()
            .push_back(Fault::Error(error));
    }

    /// Apply the next call of `op` but report a transport failure
    pub fn lose_next_response(&self, op: ApiOp) {
        self.lock()
            .faults
            .entry(op)
            .or_default()
            .push_back(Fault::LostResponse);
    }

    /// Insert a project directly, bypassing faults and call counters
    pub fn insert(&self, team_id: u64, name: &str, bgp: bool) -> u64 {
        let mut inner = self.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        let local_asn = if bgp { Some(inner.assign_asn()) } else { None };
        inner.projects.insert(
            id,
            Stored {
                project: ApiProject {
                    id,
                    name: name.to_string(),
                    team_id: Some(team_id),
                    bgp: ApiBgp {
                        enabled: bgp,
                        local_asn,
                    },
                    href: Some(format!("/projects/{}", id)),
                },
                hidden_asn_reads: 0,
            },
        );
        id
    }

    /// Move a project to another team, as if done outside the provider
    pub fn reassign_team(&self, project_id: u64, team_id: u64) {
        if let Some(stored) = self.lock().projects.get_mut(&project_id) {
            stored.project.team_id = Some(team_id);
        }
    }

    pub fn project(&self, project_id: u64) -> Option<ApiProject> {
        self.lock()
            .projects
            .get(&project_id)
            .map(|s| s.project.clone())
    }

    pub fn len(&self) -> usize {
        self.lock().projects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn calls(&self, op: ApiOp) -> usize {
        self.lock().calls.get(&op).copied().unwrap_or(0)
    }
}

fn not_found(project_id: u64) -> ApiError {
    ApiError::status(404, format!("Project {} not found", project_id))
}

fn lost() -> ApiError {
    ApiError::Transport("connection reset after request was sent".to_string())
}

#[async_trait]
impl ProjectsApi for InMemoryProjects {
    async fn create(
        &self,
        team_id: u64,
        request: &CreateProject,
        idempotency_key: &str,
    ) -> Result<ApiProject> {
        let mut inner = self.lock();
        let lose_response = match inner.enter(ApiOp::Create) {
            Some(Fault::Error(e)) => return Err(e),
            Some(Fault::LostResponse) => true,
            None => false,
        };

        if let Some(id) = inner.tokens.get(idempotency_key).copied() {
            if let Some(stored) = inner.projects.get(&id) {
                return Ok(inner.visible(stored));
            }
        }

        if let Some(teams) = &inner.teams {
            if !teams.contains(&team_id) {
                return Err(ApiError::status(404, format!("Team {} not found", team_id)));
            }
        }

        if inner
            .projects
            .values()
            .any(|s| s.project.team_id == Some(team_id) && s.project.name == request.name)
        {
            return Err(ApiError::status(
                409,
                format!("Project with name '{}' already exists", request.name),
            ));
        }

        let id = inner.next_id;
        inner.next_id += 1;
        let local_asn = if request.bgp {
            Some(inner.assign_asn())
        } else {
            None
        };
        let hidden_asn_reads = if request.bgp { inner.asn_delay } else { 0 };
        let stored = Stored {
            project: ApiProject {
                id,
                name: request.name.clone(),
                team_id: Some(team_id),
                bgp: ApiBgp {
                    enabled: request.bgp,
                    local_asn,
                },
                href: Some(format!("/projects/{}", id)),
            },
            hidden_asn_reads,
        };
        let visible = inner.visible(&stored);
        inner.projects.insert(id, stored);
        inner.tokens.insert(idempotency_key.to_string(), id);

        if lose_response {
            return Err(lost());
        }
        Ok(visible)
    }

    async fn get(&self, project_id: u64) -> Result<ApiProject> {
        let mut inner = self.lock();
        if let Some(Fault::Error(e)) = inner.enter(ApiOp::Get) {
            return Err(e);
        }

        let stored = inner
            .projects
            .get(&project_id)
            .ok_or_else(|| not_found(project_id))?;
        let visible = inner.visible(stored);
        if let Some(stored) = inner.projects.get_mut(&project_id) {
            stored.hidden_asn_reads = stored.hidden_asn_reads.saturating_sub(1);
        }
        Ok(visible)
    }

    async fn update(&self, project_id: u64, request: &UpdateProject) -> Result<ApiProject> {
        let mut inner = self.lock();
        let lose_response = match inner.enter(ApiOp::Update) {
            Some(Fault::Error(e)) => return Err(e),
            Some(Fault::LostResponse) => true,
            None => false,
        };
        if !inner.projects.contains_key(&project_id) {
            return Err(not_found(project_id));
        }

        let needs_asn = request.bgp == Some(true)
            && inner
                .projects
                .get(&project_id)
                .is_some_and(|s| s.project.bgp.local_asn.is_none());
        let new_asn = if needs_asn {
            Some(inner.assign_asn())
        } else {
            None
        };
        let asn_delay = inner.asn_delay;

        let stored = inner
            .projects
            .get_mut(&project_id)
            .ok_or_else(|| not_found(project_id))?;
        if let Some(name) = &request.name {
            stored.project.name = name.clone();
        }
        if let Some(bgp) = request.bgp {
            stored.project.bgp.enabled = bgp;
            if !bgp {
                stored.project.bgp.local_asn = None;
            }
        }
        if new_asn.is_some() {
            stored.project.bgp.local_asn = new_asn;
            stored.hidden_asn_reads = asn_delay;
        }
        let visible = inner.visible(&inner.projects[&project_id]);

        if lose_response {
            return Err(lost());
        }
        Ok(visible)
    }

    async fn delete(&self, project_id: u64) -> Result<()> {
        let mut inner = self.lock();
        let lose_response = match inner.enter(ApiOp::Delete) {
            Some(Fault::Error(e)) => return Err(e),
            Some(Fault::LostResponse) => true,
            None => false,
        };

        inner
            .projects
            .remove(&project_id)
            .ok_or_else(|| not_found(project_id))?;

        if lose_response {
            return Err(lost());
        }
        Ok(())
    }

    async fn list(&self, team_id: u64) -> Result<Vec<ApiProject>> {
        let mut inner = self.lock();
        if let Some(Fault::Error(e)) = inner.enter(ApiOp::List) {
            return Err(e);
        }

        Ok(inner
            .projects
            .values()
            .filter(|s| s.project.team_id == Some(team_id))
            .map(|s| inner.visible(s))
            .collect())
    }

    async fn teams(&self) -> Result<Vec<ApiTeam>> {
        let mut inner = self.lock();
        if let Some(Fault::Error(e)) = inner.enter(ApiOp::Teams) {
            return Err(e);
        }

        let ids: BTreeSet<u64> = match &inner.teams {
            Some(teams) => teams.iter().copied().collect(),
            None => inner
                .projects
                .values()
                .filter_map(|s| s.project.team_id)
                .collect(),
        };
        Ok(ids
            .into_iter()
            .map(|id| ApiTeam {
                id,
                name: Some(format!("Team {}", id)),
            })
            .collect())
    }
}
