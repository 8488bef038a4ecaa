//! Cherry Servers cloud resource abstraction
//!
//! This crate provides the provider-side building blocks shared by every
//! resource type: the fixed `ResourceProvider` interface with its declared
//! schema, reconcile plans, the error taxonomy, and retry/poll helpers.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │          IaC orchestration engine               │
//! └─────────────────┬───────────────────────────────┘
//!                   │ JSON-RPC (stdio)
//! ┌─────────────────▼───────────────────────────────┐
//! │               cherry-cloud-rpc                  │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │                cherry-cloud                     │
//! │  ┌──────────────────────────────────────────┐   │
//! │  │  trait ResourceProvider { ... }          │   │
//! │  └──────────────────────────────────────────┘   │
//! │  ┌──────────────┐  ┌──────────────┐             │
//! │  │  Plan types  │  │ Retry / Poll │             │
//! │  └──────────────┘  └──────────────┘             │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │  cherry-cloud-projects (Project resource)       │
//! └─────────────────────────────────────────────────┘
//! ```

pub mod action;
pub mod error;
pub mod provider;
pub mod retry;

// Re-exports
pub use action::{ActionType, ChangeKind, FieldChange, Plan, PlanSummary};
pub use error::{CheckFailure, CloudError, OperationError, Result};
pub use provider::{
    ApplyOutcome, CheckRequest, CreateRequest, DeleteRequest, OpResult, Operation,
    PropertySchema, PropertyType, ProviderSchema, ReadRequest, ReplacePolicy, ResourceProvider,
    ResourceSchema, RetryConfig, UpdateRequest, Warning,
};
pub use retry::{PollConfig, Poller, jitter_between, retry};

pub use tokio_util::sync::CancellationToken;
