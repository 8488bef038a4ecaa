//! Project provider
//!
//! Implements the fixed `ResourceProvider` interface for Cherry Servers
//! projects on top of the differ and the reconciler.

use crate::api::{HttpProjectsApi, ProjectsApi};
use crate::autoname::autoname;
use crate::client::RemoteClient;
use crate::config::{ProviderConfig, TOKEN_ENV};
use crate::diff::{diff, planned_state};
use crate::model::{DEFAULT_BGP, ProjectSpec, ProjectState};
use crate::reconciler::{PriorProject, ReconcileRequest, Reconciler};
use async_trait::async_trait;
use cherry_cloud::{
    ApplyOutcome, CancellationToken, CheckFailure, CheckRequest, CloudError, CreateRequest,
    DeleteRequest, OpResult, Operation, OperationError, Plan, Poller, PropertySchema,
    ProviderSchema, ReadRequest, ReplacePolicy, ResourceProvider, ResourceSchema, Result,
    UpdateRequest,
};
use serde_json::Value;
use std::sync::Arc;

/// Provider package name
pub const PROVIDER_NAME: &str = "cherry-servers";

/// Resource type name
pub const RESOURCE_TYPE: &str = "Project";

/// Fully qualified resource token
pub const RESOURCE_TOKEN: &str = "cherry-servers:index:Project";

const INPUT_PROPERTIES: [&str; 3] = ["name", "team", "bgp"];

/// Cherry Servers Project provider
pub struct ProjectProvider {
    reconciler: Reconciler,
}

impl ProjectProvider {
    /// Provider talking to the HTTP API described by `config`
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        config.validate()?;
        let api = HttpProjectsApi::new(config)?;
        Self::with_api(Arc::new(api), config)
    }

    /// Provider on top of any projects API implementation
    pub fn with_api(api: Arc<dyn ProjectsApi>, config: &ProviderConfig) -> Result<Self> {
        let poller = Poller::new(config.poll.clone())?;
        let client = RemoteClient::new(api, config.retry.clone());

        tracing::debug!(
            "Project provider ready (api: {}, replace policy: {})",
            config.base_url(),
            config.replace_policy
        );

        Ok(Self {
            reconciler: Reconciler::new(client, config.replace_policy, poller),
        })
    }

    pub fn replace_policy(&self) -> ReplacePolicy {
        self.reconciler.policy()
    }
}

/// Declared schema of the Project resource
pub fn project_schema() -> ResourceSchema {
    ResourceSchema {
        token: RESOURCE_TOKEN.to_string(),
        type_name: RESOURCE_TYPE.to_string(),
        description: "A Cherry Servers project, the container for servers and IP addresses \
                      inside a team."
            .to_string(),
        inputs: vec![
            PropertySchema::string(
                "name",
                "Project name. Generated from the resource name when omitted.",
            ),
            PropertySchema::integer("team", "ID of the team the project belongs to.")
                .required()
                .replace_on_change(),
            PropertySchema::boolean("bgp", "Whether BGP is enabled. Defaults to false."),
        ],
        outputs: vec![
            PropertySchema::string("name", "Project name."),
            PropertySchema::integer("team", "ID of the team the project belongs to."),
            PropertySchema::boolean("bgp", "Whether BGP is enabled."),
            PropertySchema::integer(
                "local_asn",
                "Local ASN assigned by Cherry Servers. Only set while BGP is enabled.",
            )
            .derived(),
        ],
    }
}

/// Declared schema of the whole provider. Needs no credentials.
pub fn provider_schema() -> ProviderSchema {
    ProviderSchema {
        name: PROVIDER_NAME.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        config: vec![
            PropertySchema::string(
                "token",
                &format!("Cherry Servers API token. Overridden by {}.", TOKEN_ENV),
            )
            .required()
            .secret(),
            PropertySchema::string("api_url", "Cherry Servers API base URL."),
            PropertySchema::string(
                "replace_policy",
                "How replacements run: create-before-delete or delete-before-create.",
            ),
        ],
        resources: vec![project_schema()],
    }
}

/// Validate raw inputs into a spec, collecting every failure.
///
/// `team` accepts integral floats (`148226.0`), since JSON number handling
/// on the calling side may not preserve integer-ness.
pub fn check_inputs(
    logical_name: &str,
    inputs: &Value,
    prior: Option<&ProjectSpec>,
) -> Result<ProjectSpec> {
    let Some(object) = inputs.as_object() else {
        return Err(CloudError::invalid("inputs", "expected an object"));
    };

    let mut failures = Vec::new();

    for key in object.keys() {
        if key == "local_asn" {
            failures.push(CheckFailure::new(key, "derived by the remote, can't be set"));
        } else if !INPUT_PROPERTIES.contains(&key.as_str()) {
            failures.push(CheckFailure::new(key, "unknown property"));
        }
    }

    let name = match object.get("name") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.as_str()),
        Some(_) => {
            failures.push(CheckFailure::new("name", "expected a string"));
            None
        }
    };

    let team = match object.get("team") {
        None | Some(Value::Null) => {
            failures.push(CheckFailure::new("team", "missing required property"));
            None
        }
        Some(value) => match positive_integer(value) {
            Ok(team) => Some(team),
            Err(reason) => {
                failures.push(CheckFailure::new("team", reason));
                None
            }
        },
    };

    let bgp = match object.get("bgp") {
        None | Some(Value::Null) => DEFAULT_BGP,
        Some(Value::Bool(b)) => *b,
        Some(_) => {
            failures.push(CheckFailure::new("bgp", "expected a boolean"));
            DEFAULT_BGP
        }
    };

    match team {
        Some(team) if failures.is_empty() => {
            let name = autoname(name, logical_name, prior.map(|p| p.name.as_str()));
            Ok(ProjectSpec::new(name, team).with_bgp(bgp))
        }
        _ => Err(CloudError::Validation(failures)),
    }
}

fn positive_integer(value: &Value) -> std::result::Result<u64, &'static str> {
    let Value::Number(n) = value else {
        return Err("expected an integer");
    };
    if let Some(v) = n.as_u64() {
        return if v > 0 {
            Ok(v)
        } else {
            Err("must be a positive integer")
        };
    }
    match n.as_f64() {
        Some(f) if f.fract() == 0.0 && f >= 1.0 && f <= u64::MAX as f64 => Ok(f as u64),
        Some(f) if f.fract() == 0.0 => Err("must be a positive integer"),
        _ => Err("expected an integer"),
    }
}

fn parse_id(id: &str) -> Result<u64> {
    id.trim()
        .parse()
        .map_err(|_| CloudError::invalid("id", format!("'{}' is not a project id", id)))
}

#[async_trait]
impl ResourceProvider for ProjectProvider {
    type Inputs = ProjectSpec;
    type State = ProjectState;

    fn resource_type(&self) -> &str {
        RESOURCE_TYPE
    }

    fn schema(&self) -> ResourceSchema {
        project_schema()
    }

    async fn check(&self, request: CheckRequest<ProjectSpec>) -> Result<ProjectSpec> {
        check_inputs(&request.name, &request.inputs, request.prior_inputs.as_ref())
    }

    fn diff(&self, prior: Option<&ProjectState>, desired: &ProjectSpec) -> Plan {
        diff(prior, desired)
    }

    async fn create(
        &self,
        request: CreateRequest<ProjectSpec>,
        cancel: CancellationToken,
    ) -> OpResult<ApplyOutcome<ProjectState>, ProjectState> {
        let CreateRequest {
            inputs,
            dry_run,
            request_token,
        } = request;

        if dry_run {
            inputs
                .validate()
                .map_err(|e| OperationError::<ProjectState>::new(Operation::Create, None, e))?;
            return Ok(ApplyOutcome::new(None, ProjectState::planned(&inputs)));
        }

        let plan = diff(None, &inputs);
        let request = ReconcileRequest {
            prior: None,
            desired: inputs,
            request_token,
        };
        self.reconciler.apply(&plan, &request, &cancel).await
    }

    async fn update(
        &self,
        request: UpdateRequest<ProjectSpec, ProjectState>,
        cancel: CancellationToken,
    ) -> OpResult<ApplyOutcome<ProjectState>, ProjectState> {
        let UpdateRequest {
            id,
            prior,
            inputs,
            dry_run,
            request_token,
        } = request;

        let project_id = match parse_id(&id) {
            Ok(project_id) => project_id,
            Err(e) => {
                return Err(OperationError::new(Operation::Update, Some(id), e)
                    .with_last_known(Some(prior)));
            }
        };

        let plan = diff(Some(&prior), &inputs);

        if dry_run {
            inputs.validate().map_err(|e| {
                OperationError::new(Operation::Update, Some(id.clone()), e)
                    .with_last_known(Some(prior.clone()))
            })?;
            // A replacement gets a new id, unknown until it runs.
            let preview_id = (!plan.requires_replace).then(|| project_id.to_string());
            return Ok(ApplyOutcome::new(
                preview_id,
                planned_state(Some(&prior), &inputs, &plan),
            ));
        }

        let request = ReconcileRequest {
            prior: Some(PriorProject {
                id: project_id,
                state: prior,
            }),
            desired: inputs,
            request_token,
        };
        self.reconciler.apply(&plan, &request, &cancel).await
    }

    async fn delete(&self, request: DeleteRequest<ProjectState>) -> OpResult<(), ProjectState> {
        let DeleteRequest { id, state } = request;
        let result = match parse_id(&id) {
            Ok(project_id) => self.reconciler.delete(project_id).await.map(|_| ()),
            Err(e) => Err(e),
        };
        result.map_err(|e| {
            OperationError::new(Operation::Delete, Some(id), e).with_last_known(Some(state))
        })
    }

    async fn read(
        &self,
        request: ReadRequest<ProjectState>,
    ) -> OpResult<ProjectState, ProjectState> {
        let ReadRequest { id, prior } = request;
        let expected_team = prior.as_ref().map(|p| p.team);
        let result = match parse_id(&id) {
            Ok(project_id) => self.reconciler.read(project_id, expected_team).await,
            Err(e) => Err(e),
        };
        result.map_err(|e| {
            OperationError::new(Operation::Read, Some(id), e).with_last_known(prior)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ApiOp, InMemoryProjects};
    use cherry_cloud::{PollConfig, RetryConfig};
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(fake: &Arc<InMemoryProjects>) -> ProjectProvider {
        let config = ProviderConfig::new("test-token")
            .with_retry(RetryConfig::disabled())
            .with_poll(PollConfig {
                delay: Duration::from_millis(1),
                min_jitter: Duration::ZERO,
                max_jitter: Duration::from_millis(1),
                max_attempts: 3,
            });
        ProjectProvider::with_api(fake.clone(), &config).unwrap()
    }

    fn check(inputs: Value) -> Result<ProjectSpec> {
        check_inputs("myProject", &inputs, None)
    }

    fn failed_properties(result: Result<ProjectSpec>) -> Vec<String> {
        match result {
            Err(CloudError::Validation(failures)) => {
                failures.into_iter().map(|f| f.property).collect()
            }
            other => panic!("expected validation failure, got {:?}", other),
        }
    }

    #[test]
    fn test_check_accepts_positive_team() {
        let spec = check(json!({"name": "myProject", "team": 148226, "bgp": true})).unwrap();
        assert_eq!(spec, ProjectSpec::new("myProject", 148226).with_bgp(true));

        let spec = check(json!({"name": "p", "team": 148226.0})).unwrap();
        assert_eq!(spec.team, 148226);
        assert!(!spec.bgp);
    }

    #[test]
    fn test_check_rejects_bad_team() {
        assert_eq!(failed_properties(check(json!({"name": "p"}))), vec!["team"]);
        assert_eq!(failed_properties(check(json!({"team": 0}))), vec!["team"]);
        assert_eq!(failed_properties(check(json!({"team": -4}))), vec!["team"]);
        assert_eq!(failed_properties(check(json!({"team": 1.5}))), vec!["team"]);
        assert_eq!(failed_properties(check(json!({"team": "148226"}))), vec!["team"]);
        assert_eq!(failed_properties(check(json!({"team": null}))), vec!["team"]);
    }

    #[test]
    fn test_check_collects_every_failure() {
        let mut props = failed_properties(check(json!({
            "name": 5,
            "bgp": "yes",
            "local_asn": 65000,
            "color": "red"
        })));
        props.sort();
        assert_eq!(props, vec!["bgp", "color", "local_asn", "name", "team"]);
    }

    #[test]
    fn test_check_rejects_non_object() {
        assert_eq!(failed_properties(check(json!([1, 2]))), vec!["inputs"]);
    }

    #[test]
    fn test_check_autonames() {
        let spec = check(json!({"team": 1})).unwrap();
        assert!(spec.name.starts_with("myProject-"));

        let prior = ProjectSpec::new("kept", 1);
        let spec = check_inputs("myProject", &json!({"team": 1}), Some(&prior)).unwrap();
        assert_eq!(spec.name, "kept");
    }

    #[test]
    fn test_schema() {
        let schema = project_schema();
        assert_eq!(schema.token, RESOURCE_TOKEN);
        assert_eq!(schema.required_inputs(), vec!["team"]);
        assert!(schema.input("team").unwrap().replace_on_change);
        assert!(schema.input("local_asn").is_none());
        assert!(schema.output("local_asn").unwrap().derived);

        let provider = provider_schema();
        assert_eq!(provider.resources, vec![schema]);
        assert!(provider.config.iter().any(|p| p.name == "token" && p.secret));
    }

    #[tokio::test]
    async fn test_create_dry_run_makes_no_calls() {
        let fake = Arc::new(InMemoryProjects::new());
        let provider = provider(&fake);

        let outcome = provider
            .create(
                CreateRequest {
                    inputs: ProjectSpec::new("p", 1).with_bgp(true),
                    dry_run: true,
                    request_token: None,
                },
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.id, None);
        assert_eq!(outcome.state.local_asn, None);
        assert_eq!(fake.calls(ApiOp::Create), 0);
    }

    #[tokio::test]
    async fn test_lifecycle() {
        let fake = Arc::new(InMemoryProjects::new().with_teams([148226]));
        let provider = provider(&fake);
        assert_eq!(provider.resource_type(), "Project");

        let spec = provider
            .check(CheckRequest {
                name: "myProject".to_string(),
                inputs: json!({"name": "myProject", "team": 148226, "bgp": true}),
                prior_inputs: None,
            })
            .await
            .unwrap();

        let created = provider
            .create(
                CreateRequest {
                    inputs: spec.clone(),
                    dry_run: false,
                    request_token: Some("token-1".to_string()),
                },
                CancellationToken::new(),
            )
            .await
            .unwrap();
        let id = created.id.clone().unwrap();
        assert!(created.state.local_asn.is_some());
        assert!(provider.diff(Some(&created.state), &spec).is_empty());

        let disabled = spec.clone().with_bgp(false);
        let updated = provider
            .update(
                UpdateRequest {
                    id: id.clone(),
                    prior: created.state.clone(),
                    inputs: disabled,
                    dry_run: false,
                    request_token: None,
                },
                CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(updated.id.as_deref(), Some(id.as_str()));
        assert_eq!(updated.state.local_asn, None);
        assert_eq!(
            provider.read(ReadRequest::new(id.clone())).await.unwrap(),
            updated.state
        );

        provider
            .delete(DeleteRequest {
                id: id.clone(),
                state: updated.state.clone(),
            })
            .await
            .unwrap();

        let err = provider.read(ReadRequest::new(id.clone())).await.unwrap_err();
        assert_eq!(err.operation, Operation::Read);
        assert!(matches!(err.source, CloudError::NotFound(_)));

        // Deleting again is not an error.
        provider
            .delete(DeleteRequest {
                id,
                state: updated.state,
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_update_dry_run_previews_replacement() {
        let fake = Arc::new(InMemoryProjects::new());
        let provider = provider(&fake);
        let prior = ProjectState {
            name: "p".to_string(),
            team: 148226,
            bgp: true,
            local_asn: Some(65000),
        };

        let outcome = provider
            .update(
                UpdateRequest {
                    id: "12".to_string(),
                    prior,
                    inputs: ProjectSpec::new("p", 999).with_bgp(true),
                    dry_run: true,
                    request_token: None,
                },
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.id, None);
        assert_eq!(outcome.state.team, 999);
        assert_eq!(outcome.state.local_asn, None);
        assert_eq!(fake.calls(ApiOp::Update) + fake.calls(ApiOp::Create), 0);
    }

    #[tokio::test]
    async fn test_bad_id_keeps_state() {
        let fake = Arc::new(InMemoryProjects::new());
        let provider = provider(&fake);
        let state = ProjectState::planned(&ProjectSpec::new("p", 1));

        let err = provider
            .delete(DeleteRequest {
                id: "not-a-number".to_string(),
                state: state.clone(),
            })
            .await
            .unwrap_err();

        assert_eq!(err.resource_id.as_deref(), Some("not-a-number"));
        assert_eq!(err.last_known, Some(state));
        assert!(matches!(err.source, CloudError::Validation(_)));
        assert_eq!(fake.calls(ApiOp::Delete), 0);
    }

    #[tokio::test]
    async fn test_read_response_without_team() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/projects/321"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": 321,
                "name": "myProject",
                "href": "/projects/321",
                "bgp": {"enabled": true, "local_asn": 65000}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/teams"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 148226}])))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/teams/148226/projects"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": 321, "name": "myProject", "bgp": {"enabled": true, "local_asn": 65000}}
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let config = ProviderConfig::new("test-token")
            .with_api_url(format!("{}/v1", server.uri()))
            .with_retry(RetryConfig::disabled());
        let provider = ProjectProvider::new(&config).unwrap();
        let expected = ProjectState {
            name: "myProject".to_string(),
            team: 148226,
            bgp: true,
            local_asn: Some(65000),
        };

        // Team resolved from the listings.
        let state = provider.read(ReadRequest::new("321")).await.unwrap();
        assert_eq!(state, expected);

        // Team taken from the recorded state, no listing.
        let prior = ProjectState {
            local_asn: None,
            ..expected.clone()
        };
        let state = provider
            .read(ReadRequest::new("321").with_prior(Some(prior)))
            .await
            .unwrap();
        assert_eq!(state, expected);
    }

    #[test]
    fn test_new_requires_token() {
        let err = ProjectProvider::new(&ProviderConfig::new("")).err().unwrap();
        assert!(matches!(err, CloudError::InvalidConfig(_)));
    }
}
