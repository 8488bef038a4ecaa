//! Cherry Servers provider RPC server
//!
//! Serves the Project provider over stdio JSON-RPC using the rmcp SDK. Each
//! provider operation is one tool; results and failures are JSON documents.
//! stdout carries the protocol, so nothing else may be printed to it.

use anyhow::Result;
use cherry_cloud::{
    CancellationToken, CheckRequest, CloudError, CreateRequest, DeleteRequest, Operation,
    OperationError, ReadRequest, ResourceProvider, UpdateRequest,
};
use cherry_cloud_projects::{
    ProjectProvider, ProjectSpec, ProjectState, ProviderConfig, provider_schema,
};
use rmcp::{
    ErrorData as McpError, RoleServer, ServerHandler, ServiceExt,
    handler::server::{tool::ToolCallContext, tool::ToolRouter, wrapper::Parameters},
    model::*,
    service::RequestContext,
    tool, tool_router,
    transport::IntoTransport,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};

/// How long in-flight operations get to wind down after shutdown
const SHUTDOWN_DRAIN: Duration = Duration::from_secs(10);

// ============================================================================
// Parameters
// ============================================================================

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct CheckParam {
    /// Logical resource name, used to generate a project name when none is given
    pub name: String,
    /// Raw inputs (name, team, bgp)
    pub inputs: serde_json::Value,
    /// Validated inputs of the previous deployment
    pub prior_inputs: Option<ProjectSpec>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct DiffParam {
    /// Last observed state; omitted for a resource that does not exist yet
    pub prior: Option<ProjectState>,
    pub desired: ProjectSpec,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct CreateParam {
    pub inputs: ProjectSpec,
    /// Preview only
    #[serde(default)]
    pub dry_run: bool,
    /// Idempotency key; reuse it when retrying the same create
    pub request_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct UpdateParam {
    /// Project ID
    pub id: String,
    pub prior: ProjectState,
    pub inputs: ProjectSpec,
    #[serde(default)]
    pub dry_run: bool,
    pub request_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct DeleteParam {
    /// Project ID
    pub id: String,
    pub state: ProjectState,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ReadParam {
    /// Project ID
    pub id: String,
    /// Recorded state, if tracked; supplies the team when the API omits it
    pub prior: Option<ProjectState>,
}

// ============================================================================
// Responses
// ============================================================================

/// Failure document returned to the caller
#[derive(Debug, Serialize)]
struct ErrorDocument<'a> {
    operation: Operation,
    #[serde(skip_serializing_if = "Option::is_none")]
    resource_id: Option<&'a str>,
    kind: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    failures: Option<&'a [cherry_cloud::CheckFailure]>,
    last_known: Option<&'a ProjectState>,
}

fn to_json<T: Serialize>(value: &T) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("failed to encode result: {}", e))
}

fn error_json(
    operation: Operation,
    resource_id: Option<&str>,
    last_known: Option<&ProjectState>,
    source: &CloudError,
) -> String {
    let failures = match source {
        CloudError::Validation(failures) => Some(failures.as_slice()),
        _ => None,
    };
    let document = ErrorDocument {
        operation,
        resource_id,
        kind: source.kind(),
        message: source.to_string(),
        failures,
        last_known,
    };
    serde_json::to_string_pretty(&document).unwrap_or_else(|_| source.to_string())
}

fn operation_error_json(err: &OperationError<ProjectState>) -> String {
    error!("{}", err);
    error_json(
        err.operation,
        err.resource_id.as_deref(),
        err.last_known.as_ref(),
        &err.source,
    )
}

// ============================================================================
// Server
// ============================================================================

/// Provider RPC server
#[derive(Clone)]
pub struct ProviderServer {
    tool_router: ToolRouter<Self>,
    provider: Arc<ProjectProvider>,
    shutdown: CancellationToken,
    in_flight: TaskTracker,
}

#[tool_router]
impl ProviderServer {
    pub fn new(provider: ProjectProvider, shutdown: CancellationToken) -> Self {
        Self {
            tool_router: Self::tool_router(),
            provider: Arc::new(provider),
            shutdown,
            in_flight: TaskTracker::new(),
        }
    }

    #[tool(
        description = "Returns the provider schema: configuration keys and the Project resource with its required, optional and derived properties."
    )]
    async fn provider_schema(&self) -> Result<String, String> {
        to_json(&provider_schema())
    }

    #[tool(
        description = "Validates raw Project inputs without contacting Cherry Servers. Returns the validated inputs, with a generated name when none was given."
    )]
    async fn project_check(&self, params: Parameters<CheckParam>) -> Result<String, String> {
        let CheckParam {
            name,
            inputs,
            prior_inputs,
        } = params.0;

        self.provider
            .check(CheckRequest {
                name,
                inputs,
                prior_inputs,
            })
            .await
            .map_err(|e| error_json(Operation::Check, None, None, &e))
            .and_then(|spec| to_json(&spec))
    }

    #[tool(
        description = "Computes the plan from the prior Project state to the desired inputs. A team change requires replacement."
    )]
    async fn project_diff(&self, params: Parameters<DiffParam>) -> Result<String, String> {
        let plan = self
            .provider
            .diff(params.0.prior.as_ref(), &params.0.desired);
        to_json(&plan)
    }

    #[tool(
        description = "Creates a Project. Retrying with the same request_token never creates a second project."
    )]
    async fn project_create(
        &self,
        params: Parameters<CreateParam>,
        ctx: RequestContext<RoleServer>,
    ) -> Result<String, String> {
        let cancel = self.operation_token(&ctx.ct);
        self.in_flight
            .track_future(self.create(params.0, cancel))
            .await
    }

    #[tool(
        description = "Converges an existing Project to the desired inputs, in place or by replacement."
    )]
    async fn project_update(
        &self,
        params: Parameters<UpdateParam>,
        ctx: RequestContext<RoleServer>,
    ) -> Result<String, String> {
        let cancel = self.operation_token(&ctx.ct);
        self.in_flight
            .track_future(self.update(params.0, cancel))
            .await
    }

    #[tool(description = "Deletes a Project. A project that is already gone counts as deleted.")]
    async fn project_delete(&self, params: Parameters<DeleteParam>) -> Result<String, String> {
        let DeleteParam { id, state } = params.0;
        info!("delete project {}", id);

        self.provider
            .delete(DeleteRequest {
                id: id.clone(),
                state,
            })
            .await
            .map_err(|e| operation_error_json(&e))?;
        to_json(&json!({ "id": id, "deleted": true }))
    }

    #[tool(description = "Reads the current state of a Project from Cherry Servers.")]
    async fn project_read(&self, params: Parameters<ReadParam>) -> Result<String, String> {
        let ReadParam { id, prior } = params.0;
        let state = self
            .provider
            .read(ReadRequest::new(id.clone()).with_prior(prior))
            .await
            .map_err(|e| operation_error_json(&e))?;
        to_json(&json!({ "id": id, "state": state }))
    }
}

impl ProviderServer {
    /// Token for one operation, cancelled by the caller's request token or by
    /// server shutdown, whichever fires first.
    fn operation_token(&self, request: &CancellationToken) -> CancellationToken {
        let token = self.shutdown.child_token();
        if request.is_cancelled() {
            token.cancel();
            return token;
        }

        let request = request.clone();
        let linked = token.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = request.cancelled() => linked.cancel(),
                _ = linked.cancelled() => {}
            }
        });
        token
    }

    async fn create(
        &self,
        param: CreateParam,
        cancel: CancellationToken,
    ) -> Result<String, String> {
        let _done = cancel.clone().drop_guard();
        let CreateParam {
            inputs,
            dry_run,
            request_token,
        } = param;
        info!(
            "create project '{}' in team {}{}",
            inputs.name,
            inputs.team,
            if dry_run { " (dry run)" } else { "" }
        );

        let outcome = self
            .provider
            .create(
                CreateRequest {
                    inputs,
                    dry_run,
                    request_token,
                },
                cancel.clone(),
            )
            .await
            .map_err(|e| operation_error_json(&e))?;
        for warning in &outcome.warnings {
            warn!("{}", warning);
        }
        to_json(&outcome)
    }

    async fn update(
        &self,
        param: UpdateParam,
        cancel: CancellationToken,
    ) -> Result<String, String> {
        let _done = cancel.clone().drop_guard();
        let UpdateParam {
            id,
            prior,
            inputs,
            dry_run,
            request_token,
        } = param;
        info!(
            "update project {}{}",
            id,
            if dry_run { " (dry run)" } else { "" }
        );

        let outcome = self
            .provider
            .update(
                UpdateRequest {
                    id,
                    prior,
                    inputs,
                    dry_run,
                    request_token,
                },
                cancel.clone(),
            )
            .await
            .map_err(|e| operation_error_json(&e))?;
        for warning in &outcome.warnings {
            warn!("{}", warning);
        }
        to_json(&outcome)
    }
}

impl ServerHandler for ProviderServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo::default().with_instructions(
            "Cherry Servers resource provider. Manages the Project resource (cherry-servers:index:Project).",
        )
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, McpError> {
        Ok(ListToolsResult {
            tools: self.tool_router.list_all(),
            next_cursor: None,
            meta: None,
        })
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let tool_context = ToolCallContext::new(self, request, context);
        self.tool_router.call(tool_context).await
    }
}

/// Run the provider server on stdio until the client disconnects or
/// `shutdown` is cancelled.
pub async fn run_server(config: ProviderConfig, shutdown: CancellationToken) -> Result<()> {
    let provider = ProjectProvider::new(&config)?;
    info!(
        "Starting provider server (api: {}, replace policy: {})",
        config.base_url(),
        provider.replace_policy()
    );

    let server = ProviderServer::new(provider, shutdown.clone());
    serve_until_shutdown(server, (tokio::io::stdin(), tokio::io::stdout()), shutdown).await
}

/// Serve on `transport`. Once `shutdown` is cancelled, in-flight creates and
/// updates stop at their next step and get [`SHUTDOWN_DRAIN`] to report
/// before the service is stopped.
async fn serve_until_shutdown<T, E, A>(
    server: ProviderServer,
    transport: T,
    shutdown: CancellationToken,
) -> Result<()>
where
    T: IntoTransport<RoleServer, E, A>,
    E: std::error::Error + Send + Sync + 'static,
{
    let in_flight = server.in_flight.clone();
    let service = server.serve(transport).await.map_err(|e| {
        error!("Provider server initialization failed: {}", e);
        anyhow::anyhow!("Provider server initialization failed: {}", e)
    })?;

    let stop = service.cancellation_token();
    let waiting = service.waiting();
    tokio::pin!(waiting);

    let quit = tokio::select! {
        quit = &mut waiting => quit,
        _ = shutdown.cancelled() => {
            in_flight.close();
            info!("Shutdown requested; draining {} in-flight operations", in_flight.len());
            if tokio::time::timeout(SHUTDOWN_DRAIN, in_flight.wait()).await.is_err() {
                warn!("In-flight operations did not finish within {:?}", SHUTDOWN_DRAIN);
            }
            stop.cancel();
            waiting.await
        }
    };

    let reason = quit.map_err(|e| {
        error!("Provider server error: {}", e);
        anyhow::anyhow!("Provider server error: {}", e)
    })?;

    info!("Provider server stopped ({:?})", reason);
    Ok(())
}
