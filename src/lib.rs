//! Hemmer Provider for Data-Sharing Recipients
//!
//! This crate manages data-sharing *recipients* (the parties that may read
//! shared data) as declarative resources: a host plans, creates, reads,
//! updates, deletes and imports them through the [`ProviderService`] trait.
//!
//! # Overview
//!
//! - **Schema**: per-field annotations (required / optional / read-only,
//!   force-new, diff suppression, conflicts, accepted values)
//! - **Validation**: configuration checks run before any remote call
//! - **Diff**: Terraform-style flattened paths and suppression-aware plans
//! - **Sharing**: the recipient model, the [`RecipientsApi`] client seam and
//!   the [`RecipientResource`] lifecycle
//! - **Provider**: [`SharingProvider`], dispatching by resource type
//! - **Testing**: a host-like harness and an in-memory service fake
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use hemmer_provider_sharing::{ProviderService, SharingProvider, RESOURCE_TYPE};
//! use serde_json::json;
//!
//! # use hemmer_provider_sharing::{ProviderError, RecipientsApi};
//! # async fn run(api: Arc<dyn RecipientsApi>) -> Result<(), ProviderError> {
//! hemmer_provider_sharing::init_logging();
//!
//! let provider = SharingProvider::new(api);
//! provider.configure(json!({})).await?;
//!
//! let config = json!({"name": "partner", "authentication_type": "TOKEN"});
//! let plan = provider.plan(RESOURCE_TYPE, None, config.clone(), config).await?;
//! let state = provider.create(RESOURCE_TYPE, plan.planned_state).await?;
//! assert_eq!(state["id"], "partner");
//! # Ok(())
//! # }
//! ```
//!
//! # Owner updates
//!
//! The service changes a recipient's owner through a dedicated request, so
//! an update touching the owner and other fields takes two requests. When
//! the second one fails the owner change is undone once; see
//! [`RecipientResource::update`] and [`ProviderError::OwnerRollback`].

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod diff;
pub mod error;
pub mod logging;
pub mod provider;
pub mod schema;
pub mod sharing;
pub mod testing;
pub mod types;
pub mod validation;

// Re-export main types at crate root
pub use error::ProviderError;
pub use logging::{init_logging, init_logging_with_default, try_init_logging};
pub use provider::{ProviderService, SharingProvider};
pub use schema::ProviderSchema;
pub use sharing::{RecipientResource, RecipientsApi, RESOURCE_TYPE};
pub use types::{AttributeChange, ImportedResource, PlanResult, ProviderMetadata};
pub use validation::{is_valid, validate, validate_or_error, validate_result};

// Re-export async_trait for convenience
pub use async_trait::async_trait;

// Re-export commonly used external types
pub use serde_json;
pub use tracing;
