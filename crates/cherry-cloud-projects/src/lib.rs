//! Cherry Servers Project resource
//!
//! Implements the `ResourceProvider` interface from `cherry-cloud` for
//! Cherry Servers projects.
//!
//! # Layers
//!
//! - [`api`]: stateless HTTP transport (`ProjectsApi`)
//! - [`client`]: retries and idempotent create/delete on top of the API
//! - [`diff`]: pure comparison of prior state and desired spec
//! - [`reconciler`]: executes a plan and normalizes the result
//! - [`provider`]: validation, previews, and the provider surface
//!
//! # Configuration
//!
//! - `CHERRY_AUTH_TOKEN`: API token (required)
//! - `CHERRY_API_URL`: API base URL (default `https://api.cherryservers.com/v1`)
//! - `CHERRY_REPLACE_POLICY`: `create-before-delete` (default) or `delete-before-create`
//!
//! # Example
//!
//! ```ignore
//! use cherry_cloud::{CancellationToken, CreateRequest, ResourceProvider};
//! use cherry_cloud_projects::{ProjectProvider, ProjectSpec, ProviderConfig};
//!
//! let provider = ProjectProvider::new(&ProviderConfig::from_env()?)?;
//!
//! let created = provider
//!     .create(
//!         CreateRequest {
//!             inputs: ProjectSpec::new("myProject", 148226).with_bgp(true),
//!             dry_run: false,
//!             request_token: None,
//!         },
//!         CancellationToken::new(),
//!     )
//!     .await?;
//! println!("local ASN: {:?}", created.state.local_asn);
//! ```

pub mod api;
pub mod autoname;
pub mod client;
pub mod config;
pub mod diff;
pub mod error;
pub mod model;
pub mod provider;
pub mod reconciler;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use api::{ApiProject, ApiTeam, HttpProjectsApi, ProjectsApi};
pub use client::{DeleteOutcome, RemoteClient};
pub use config::ProviderConfig;
pub use error::{ApiError, Result};
pub use model::{ProjectSpec, ProjectState};
pub use provider::{
    PROVIDER_NAME, ProjectProvider, RESOURCE_TOKEN, RESOURCE_TYPE, check_inputs, project_schema,
    provider_schema,
};
pub use reconciler::{PriorProject, ReconcileRequest, Reconciler};
