//! Resource provider trait definition

use crate::action::Plan;
use crate::error::{OperationError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Result of a lifecycle operation that may leave a tracked remote object behind
pub type OpResult<T, S> = std::result::Result<T, OperationError<S>>;

/// Resource provider abstraction trait
///
/// One implementation per resource type. Every call is independent: the
/// provider keeps no state between calls besides its configuration, and all
/// state authority lives in the remote system.
#[async_trait]
pub trait ResourceProvider: Send + Sync {
    /// Validated desired configuration
    type Inputs: Send + Sync;

    /// Observed resource state
    type State: Send + Sync;

    /// Resource type name (e.g. "Project")
    fn resource_type(&self) -> &str;

    /// Declared schema of inputs and outputs
    fn schema(&self) -> ResourceSchema;

    /// Validate raw inputs. Never contacts the remote system.
    async fn check(&self, request: CheckRequest<Self::Inputs>) -> Result<Self::Inputs>;

    /// Compute the plan from prior state to desired inputs
    fn diff(&self, prior: Option<&Self::State>, desired: &Self::Inputs) -> Plan;

    /// Create a new resource
    async fn create(
        &self,
        request: CreateRequest<Self::Inputs>,
        cancel: CancellationToken,
    ) -> OpResult<ApplyOutcome<Self::State>, Self::State>;

    /// Converge an existing resource to the desired inputs
    async fn update(
        &self,
        request: UpdateRequest<Self::Inputs, Self::State>,
        cancel: CancellationToken,
    ) -> OpResult<ApplyOutcome<Self::State>, Self::State>;

    /// Delete a resource
    async fn delete(&self, request: DeleteRequest<Self::State>) -> OpResult<(), Self::State>;

    /// Read the current remote state
    async fn read(&self, request: ReadRequest<Self::State>) -> OpResult<Self::State, Self::State>;
}

/// Provider operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Check,
    Diff,
    Create,
    Update,
    Delete,
    Read,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operation::Check => write!(f, "check"),
            Operation::Diff => write!(f, "diff"),
            Operation::Create => write!(f, "create"),
            Operation::Update => write!(f, "update"),
            Operation::Delete => write!(f, "delete"),
            Operation::Read => write!(f, "read"),
        }
    }
}

/// Check request
#[derive(Debug, Clone)]
pub struct CheckRequest<I> {
    /// Logical name the caller gave the resource, used for autonaming
    pub name: String,

    /// Raw, untyped inputs
    pub inputs: serde_json::Value,

    /// Inputs from the previous deployment, if any
    pub prior_inputs: Option<I>,
}

/// Create request
#[derive(Debug, Clone)]
pub struct CreateRequest<I> {
    pub inputs: I,

    /// Preview only, never contacts the remote system
    pub dry_run: bool,

    /// Idempotency key. Retrying with the same token never creates twice.
    pub request_token: Option<String>,
}

/// Update request
#[derive(Debug, Clone)]
pub struct UpdateRequest<I, S> {
    pub id: String,
    pub prior: S,
    pub inputs: I,
    pub dry_run: bool,
    pub request_token: Option<String>,
}

/// Delete request
#[derive(Debug, Clone)]
pub struct DeleteRequest<S> {
    pub id: String,
    pub state: S,
}

/// Read request
#[derive(Debug, Clone)]
pub struct ReadRequest<S> {
    pub id: String,

    /// State recorded for the resource, if the caller tracks it. Fills in
    /// what the remote representation does not report.
    pub prior: Option<S>,
}

impl<S> ReadRequest<S> {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            prior: None,
        }
    }

    pub fn with_prior(mut self, prior: Option<S>) -> Self {
        self.prior = prior;
        self
    }
}

/// Non-fatal condition reported alongside a successful apply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Warning {
    /// A remote object that should have been deleted still exists
    DanglingResource { id: String, detail: String },
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Warning::DanglingResource { id, detail } => {
                write!(f, "dangling resource {}: {}", id, detail)
            }
        }
    }
}

/// Result of a create or update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplyOutcome<S> {
    /// Remote identifier. `None` for previews of new resources.
    pub id: Option<String>,
    pub state: S,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<Warning>,
}

impl<S> ApplyOutcome<S> {
    pub fn new(id: Option<String>, state: S) -> Self {
        Self {
            id,
            state,
            warnings: Vec::new(),
        }
    }

    pub fn with_warning(mut self, warning: Warning) -> Self {
        self.warnings.push(warning);
        self
    }
}

/// How a resource is replaced when a change cannot be applied in place
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReplacePolicy {
    /// Create the new resource first, delete the old one afterwards
    #[default]
    CreateBeforeDelete,
    /// Delete the old resource first
    DeleteBeforeCreate,
}

impl std::fmt::Display for ReplacePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReplacePolicy::CreateBeforeDelete => write!(f, "create-before-delete"),
            ReplacePolicy::DeleteBeforeCreate => write!(f, "delete-before-create"),
        }
    }
}

impl std::str::FromStr for ReplacePolicy {
    type Err = crate::error::CloudError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "create-before-delete" => Ok(ReplacePolicy::CreateBeforeDelete),
            "delete-before-create" => Ok(ReplacePolicy::DeleteBeforeCreate),
            other => Err(crate::error::CloudError::InvalidConfig(format!(
                "unknown replace policy '{}' (expected create-before-delete or delete-before-create)",
                other
            ))),
        }
    }
}

// ============ Schema ============

/// Property value type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyType {
    String,
    Integer,
    Boolean,
}

/// Schema of a single property
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertySchema {
    pub name: String,
    #[serde(rename = "type")]
    pub property_type: PropertyType,
    pub description: String,
    #[serde(default)]
    pub required: bool,
    /// Computed by the remote system, never user-settable
    #[serde(default)]
    pub derived: bool,
    #[serde(default)]
    pub secret: bool,
    /// Changing the property forces replacement
    #[serde(default)]
    pub replace_on_change: bool,
}

impl PropertySchema {
    fn new(name: &str, property_type: PropertyType, description: &str) -> Self {
        Self {
            name: name.to_string(),
            property_type,
            description: description.to_string(),
            required: false,
            derived: false,
            secret: false,
            replace_on_change: false,
        }
    }

    pub fn string(name: &str, description: &str) -> Self {
        Self::new(name, PropertyType::String, description)
    }

    pub fn integer(name: &str, description: &str) -> Self {
        Self::new(name, PropertyType::Integer, description)
    }

    pub fn boolean(name: &str, description: &str) -> Self {
        Self::new(name, PropertyType::Boolean, description)
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn derived(mut self) -> Self {
        self.derived = true;
        self
    }

    pub fn secret(mut self) -> Self {
        self.secret = true;
        self
    }

    pub fn replace_on_change(mut self) -> Self {
        self.replace_on_change = true;
        self
    }
}

/// Schema of a resource type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSchema {
    /// Fully qualified token (e.g. "cherry-servers:index:Project")
    pub token: String,
    pub type_name: String,
    pub description: String,
    pub inputs: Vec<PropertySchema>,
    pub outputs: Vec<PropertySchema>,
}

impl ResourceSchema {
    pub fn input(&self, name: &str) -> Option<&PropertySchema> {
        self.inputs.iter().find(|p| p.name == name)
    }

    pub fn output(&self, name: &str) -> Option<&PropertySchema> {
        self.outputs.iter().find(|p| p.name == name)
    }

    pub fn required_inputs(&self) -> Vec<&str> {
        self.inputs
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name.as_str())
            .collect()
    }
}

/// Schema of the whole provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderSchema {
    pub name: String,
    pub version: String,
    pub config: Vec<PropertySchema>,
    pub resources: Vec<ResourceSchema>,
}

// ============ Retry ============

/// Retry configuration for provider operations
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one
    pub max_attempts: u32,

    /// Initial delay between retries
    pub initial_delay: Duration,

    /// Maximum delay between retries
    pub max_delay: Duration,

    /// Backoff multiplier
    pub backoff_multiplier: f64,

    /// Upper bound of the random jitter added to each delay
    pub max_jitter: Duration,
}

impl RetryConfig {
    /// No retries at all
    pub fn disabled() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before the retry following `attempt` (0-based), without jitter
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = self.backoff_multiplier.powi(attempt as i32);
        let delay = self.initial_delay.mul_f64(factor);
        delay.min(self.max_delay)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            max_jitter: Duration::from_millis(500),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_for_attempt() {
        let config = RetryConfig {
            max_attempts: 5,
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(10000),
            backoff_multiplier: 2.0,
            max_jitter: Duration::ZERO,
        };

        assert_eq!(config.delay_for_attempt(0), Duration::from_millis(1000));
        assert_eq!(config.delay_for_attempt(1), Duration::from_millis(2000));
        assert_eq!(config.delay_for_attempt(2), Duration::from_millis(4000));
        assert_eq!(config.delay_for_attempt(3), Duration::from_millis(8000));
        assert_eq!(config.delay_for_attempt(4), Duration::from_millis(10000)); // capped at max
    }

    #[test]
    fn test_replace_policy_parse() {
        assert_eq!(
            "create-before-delete".parse::<ReplacePolicy>().unwrap(),
            ReplacePolicy::CreateBeforeDelete
        );
        assert_eq!(
            " Delete-Before-Create ".parse::<ReplacePolicy>().unwrap(),
            ReplacePolicy::DeleteBeforeCreate
        );
        assert!("sideways".parse::<ReplacePolicy>().is_err());
        assert_eq!(
            ReplacePolicy::DeleteBeforeCreate.to_string(),
            "delete-before-create"
        );
    }

    #[test]
    fn test_schema_builders() {
        let schema = ResourceSchema {
            token: "test:index:Thing".to_string(),
            type_name: "Thing".to_string(),
            description: "A thing.".to_string(),
            inputs: vec![
                PropertySchema::integer("owner", "Owner id.")
                    .required()
                    .replace_on_change(),
                PropertySchema::string("label", "Label."),
            ],
            outputs: vec![PropertySchema::integer("serial", "Serial.").derived()],
        };

        assert_eq!(schema.required_inputs(), vec!["owner"]);
        assert!(schema.input("owner").unwrap().replace_on_change);
        assert!(schema.output("serial").unwrap().derived);
        assert!(schema.input("serial").is_none());
    }
}
