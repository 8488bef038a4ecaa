//! Cloud provider error types

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::provider::Operation;

/// A single input that failed validation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckFailure {
    /// Input property name (e.g. "team")
    pub property: String,

    /// Human readable reason
    pub reason: String,
}

impl CheckFailure {
    pub fn new(property: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            reason: reason.into(),
        }
    }
}

impl std::fmt::Display for CheckFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.property, self.reason)
    }
}

fn join_failures(failures: &[CheckFailure]) -> String {
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Cloud provider errors
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("Validation failed: {}", join_failures(.0))]
    Validation(Vec<CheckFailure>),

    #[error("Remote API error{}: {detail}", .status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    Remote { status: Option<u16>, detail: String },

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CloudError {
    /// Single-field validation failure
    pub fn invalid(property: impl Into<String>, reason: impl Into<String>) -> Self {
        CloudError::Validation(vec![CheckFailure::new(property, reason)])
    }

    /// Whether the operation may be retried after this error.
    ///
    /// Transport failures (no status), throttling and 5xx responses are
    /// transient. Conflicts and missing resources never are.
    pub fn is_transient(&self) -> bool {
        match self {
            CloudError::Remote { status: None, .. } => true,
            CloudError::Remote {
                status: Some(status),
                ..
            } => *status == 429 || (500..600).contains(status),
            _ => false,
        }
    }

    /// Stable machine-readable kind, used on the RPC boundary
    pub fn kind(&self) -> &'static str {
        match self {
            CloudError::Validation(_) => "validation",
            CloudError::Remote { .. } => "remote",
            CloudError::NotFound(_) => "not_found",
            CloudError::Conflict(_) => "conflict",
            CloudError::Timeout(_) => "timeout",
            CloudError::Cancelled(_) => "cancelled",
            CloudError::InvalidConfig(_) => "invalid_config",
            CloudError::Json(_) => "json",
        }
    }
}

/// Failure of a lifecycle operation on one resource.
///
/// Carries the last state the provider observed so the caller keeps tracking
/// a resource that may still exist remotely.
#[derive(Error, Debug)]
#[error("{operation} failed for {}: {source}", .resource_id.as_deref().unwrap_or("<new resource>"))]
pub struct OperationError<S> {
    pub operation: Operation,
    pub resource_id: Option<String>,
    pub last_known: Option<S>,
    #[source]
    pub source: CloudError,
}

impl<S> OperationError<S> {
    pub fn new(operation: Operation, resource_id: Option<String>, source: CloudError) -> Self {
        Self {
            operation,
            resource_id,
            last_known: None,
            source,
        }
    }

    pub fn with_last_known(mut self, state: Option<S>) -> Self {
        self.last_known = state;
        self
    }
}

pub type Result<T> = std::result::Result<T, CloudError>;
