//! Project resource model

use crate::api::ApiProject;
use cherry_cloud::{CloudError, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// BGP setting used when the caller does not specify one
pub const DEFAULT_BGP: bool = false;

/// Desired configuration of a project, after validation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ProjectSpec {
    /// Project name.
    pub name: String,

    /// ID of the team the project will belong to.
    pub team: u64,

    /// Whether BGP should be enabled for the project.
    #[serde(default)]
    pub bgp: bool,
}

impl ProjectSpec {
    pub fn new(name: impl Into<String>, team: u64) -> Self {
        Self {
            name: name.into(),
            team,
            bgp: DEFAULT_BGP,
        }
    }

    pub fn with_bgp(mut self, bgp: bool) -> Self {
        self.bgp = bgp;
        self
    }

    /// Checks that hold for any spec before it reaches the remote system
    pub fn validate(&self) -> Result<()> {
        let mut failures = Vec::new();
        if self.team == 0 {
            failures.push(cherry_cloud::CheckFailure::new(
                "team",
                "must be a positive integer",
            ));
        }
        if self.name.trim().is_empty() {
            failures.push(cherry_cloud::CheckFailure::new("name", "must not be empty"));
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(CloudError::Validation(failures))
        }
    }
}

/// Observed state of a project
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ProjectState {
    /// Project name.
    pub name: String,

    /// ID of the team the project belongs to.
    pub team: u64,

    /// Whether BGP is enabled.
    pub bgp: bool,

    /// Local ASN assigned to the project. Only present while BGP is enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_asn: Option<u32>,
}

impl ProjectState {
    /// Planned state for a spec. The ASN is unknown until the remote assigns it.
    pub fn planned(spec: &ProjectSpec) -> Self {
        Self {
            name: spec.name.clone(),
            team: spec.team,
            bgp: spec.bgp,
            local_asn: None,
        }
    }

    /// Normalize the remote representation.
    ///
    /// `expected_team` is the team this provider last recorded or resolved.
    /// The public API often leaves `team_id` out, in which case the expected
    /// team is used; when both are present a mismatch is a conflict.
    pub fn from_remote(project: &ApiProject, expected_team: Option<u64>) -> Result<Self> {
        let team = match (project.team_id, expected_team) {
            (Some(remote), Some(expected)) if remote != expected => {
                return Err(CloudError::Conflict(format!(
                    "project {} belongs to team {} but team {} was expected; it was reassigned outside this provider",
                    project.id, remote, expected
                )));
            }
            (Some(remote), _) => remote,
            (None, Some(expected)) => expected,
            (None, None) => {
                return Err(CloudError::Conflict(format!(
                    "team of project {} is unknown: the API did not report it and no team \
                     this token can access lists the project",
                    project.id
                )));
            }
        };

        let bgp = project.bgp.enabled;
        Ok(Self {
            name: project.name.clone(),
            team,
            bgp,
            // Derived: never carried over while BGP is off.
            local_asn: if bgp {
                project.bgp.local_asn.filter(|asn| *asn != 0)
            } else {
                None
            },
        })
    }

    /// The inputs this state corresponds to
    pub fn spec(&self) -> ProjectSpec {
        ProjectSpec {
            name: self.name.clone(),
            team: self.team,
            bgp: self.bgp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiBgp;

    fn api_project(team_id: Option<u64>, enabled: bool, local_asn: Option<u32>) -> ApiProject {
        ApiProject {
            id: 10,
            name: "myProject".to_string(),
            team_id,
            bgp: ApiBgp { enabled, local_asn },
            href: Some("/projects/10".to_string()),
        }
    }

    #[test]
    fn test_from_remote_clears_asn_without_bgp() {
        let state =
            ProjectState::from_remote(&api_project(Some(148226), false, Some(65000)), None)
                .unwrap();
        assert!(!state.bgp);
        assert_eq!(state.local_asn, None);
    }

    #[test]
    fn test_from_remote_keeps_asn_with_bgp() {
        let state =
            ProjectState::from_remote(&api_project(None, true, Some(65000)), Some(148226))
                .unwrap();
        assert_eq!(state.team, 148226);
        assert_eq!(state.local_asn, Some(65000));
    }

    #[test]
    fn test_from_remote_treats_zero_asn_as_unassigned() {
        let state =
            ProjectState::from_remote(&api_project(Some(1), true, Some(0)), None).unwrap();
        assert_eq!(state.local_asn, None);
    }

    #[test]
    fn test_from_remote_detects_team_reassignment() {
        let err = ProjectState::from_remote(&api_project(Some(999), false, None), Some(148226))
            .unwrap_err();
        assert!(matches!(err, CloudError::Conflict(_)));
    }

    #[test]
    fn test_from_remote_without_any_team() {
        let err = ProjectState::from_remote(&api_project(None, false, None), None).unwrap_err();
        assert!(matches!(err, CloudError::Conflict(_)));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_spec_validate() {
        assert!(ProjectSpec::new("p", 1).validate().is_ok());

        match ProjectSpec::new("", 0).validate() {
            Err(CloudError::Validation(failures)) => {
                let props: Vec<_> = failures.iter().map(|f| f.property.as_str()).collect();
                assert_eq!(props, vec!["team", "name"]);
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }
}
