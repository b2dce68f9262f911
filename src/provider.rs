//! The host-facing provider surface.
//!
//! [`ProviderService`] is what a host drives: schema discovery,
//! configuration, planning and the resource lifecycle, all in terms of JSON
//! state. [`SharingProvider`] implements it for the resources in
//! [`sharing`](crate::sharing).

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, error, info, instrument};

use crate::error::ProviderError;
use crate::schema::{Diagnostic, ProviderSchema, Schema};
use crate::sharing::{RecipientResource, RecipientsApi, RESOURCE_TYPE};
use crate::types::{ImportedResource, PlanResult, ProviderMetadata};
use crate::validation;

/// Trait that provider implementations must implement.
///
/// # Example
///
/// ```ignore
/// use hemmer_provider_sharing::{ProviderService, ProviderError, PlanResult, ProviderSchema};
/// use hemmer_provider_sharing::schema::{Schema, Attribute, Diagnostic};
///
/// struct MyProvider;
///
/// #[async_trait::async_trait]
/// impl ProviderService for MyProvider {
///     fn schema(&self) -> ProviderSchema {
///         ProviderSchema::new()
///             .with_resource("example_resource", Schema::v0()
///                 .with_attribute("name", Attribute::required_string()))
///     }
///
///     async fn configure(
///         &self,
///         config: serde_json::Value,
///     ) -> Result<Vec<Diagnostic>, ProviderError> {
///         Ok(vec![])
///     }
///
///     // ... implement other methods
/// }
/// ```
#[async_trait]
pub trait ProviderService: Send + Sync + 'static {
    // =========================================================================
    // Schema & Metadata
    // =========================================================================

    /// Return the provider's schema including all resources.
    fn schema(&self) -> ProviderSchema;

    /// Return provider metadata, derived from the schema by default.
    fn metadata(&self) -> ProviderMetadata {
        let mut resources: Vec<String> = self.schema().resources.keys().cloned().collect();
        resources.sort();
        ProviderMetadata { resources }
    }

    // =========================================================================
    // Provider Lifecycle
    // =========================================================================

    /// Validate the provider configuration against the provider schema.
    async fn validate_provider_config(
        &self,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        Ok(validation::validate(&self.schema().provider, &config))
    }

    /// Configure the provider.
    /// Returns diagnostics (errors and warnings).
    async fn configure(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError>;

    // =========================================================================
    // Resource Operations
    // =========================================================================

    /// Validate a resource's configuration against its schema.
    async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        let schema = self.schema();
        let resource_schema: &Schema = schema
            .resources
            .get(resource_type)
            .ok_or_else(|| ProviderError::UnknownResource(resource_type.to_string()))?;
        Ok(validation::validate(resource_schema, &config))
    }

    /// Plan changes for a resource.
    async fn plan(
        &self,
        resource_type: &str,
        prior_state: Option<Value>,
        proposed_state: Value,
        config: Value,
    ) -> Result<PlanResult, ProviderError>;

    /// Create a new resource.
    async fn create(&self, resource_type: &str, planned_state: Value)
        -> Result<Value, ProviderError>;

    /// Read the current state of a resource.
    async fn read(&self, resource_type: &str, current_state: Value)
        -> Result<Value, ProviderError>;

    /// Update an existing resource.
    async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value, ProviderError>;

    /// Delete a resource.
    async fn delete(&self, resource_type: &str, current_state: Value)
        -> Result<(), ProviderError>;

    /// Import existing infrastructure into management.
    async fn import_resource(
        &self,
        resource_type: &str,
        _id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError> {
        Err(ProviderError::InvalidRequest(format!(
            "Import not supported for resource type: {}",
            resource_type
        )))
    }
}

/// Provider for data-sharing resources.
///
/// The API client is injected; the provider itself holds no connection
/// state, so `configure` only validates.
#[derive(Debug, Clone)]
pub struct SharingProvider {
    recipients: RecipientResource,
}

impl SharingProvider {
    /// Create a provider that talks to the service through `api`.
    pub fn new(api: Arc<dyn RecipientsApi>) -> Self {
        Self {
            recipients: RecipientResource::new(api),
        }
    }

    /// The recipient resource, for direct lifecycle calls.
    pub fn recipients(&self) -> &RecipientResource {
        &self.recipients
    }

    fn resource(&self, resource_type: &str) -> Result<&RecipientResource, ProviderError> {
        match resource_type {
            RESOURCE_TYPE => Ok(&self.recipients),
            other => Err(ProviderError::UnknownResource(other.to_string())),
        }
    }
}

fn logged<T>(
    operation: &str,
    resource_type: &str,
    result: Result<T, ProviderError>,
) -> Result<T, ProviderError> {
    match &result {
        Ok(_) => debug!(resource_type, operation, "Completed successfully"),
        Err(e) => error!(resource_type, operation, error = %e, "Failed"),
    }
    result
}

#[async_trait]
impl ProviderService for SharingProvider {
    fn schema(&self) -> ProviderSchema {
        ProviderSchema::new()
            .with_provider_config(Schema::v0())
            .with_resource(RESOURCE_TYPE, self.recipients.schema().clone())
    }

    #[instrument(skip_all, name = "provider.configure")]
    async fn configure(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
        let diagnostics = self.validate_provider_config(config).await?;
        info!(diagnostics = diagnostics.len(), "Provider configured");
        Ok(diagnostics)
    }

    #[instrument(skip(self, prior_state, proposed_state, _config), name = "provider.plan")]
    async fn plan(
        &self,
        resource_type: &str,
        prior_state: Option<Value>,
        proposed_state: Value,
        _config: Value,
    ) -> Result<PlanResult, ProviderError> {
        debug!(is_create = prior_state.is_none(), "Plan called");
        let result = self
            .resource(resource_type)
            .and_then(|r| r.plan(prior_state.as_ref(), &proposed_state));
        if let Ok(plan) = &result {
            info!(
                changes = plan.changes.len(),
                requires_replace = plan.requires_replace,
                "Plan completed"
            );
        }
        logged("plan", resource_type, result)
    }

    #[instrument(skip(self, planned_state), name = "provider.create")]
    async fn create(
        &self,
        resource_type: &str,
        planned_state: Value,
    ) -> Result<Value, ProviderError> {
        let result = match self.resource(resource_type) {
            Ok(resource) => resource.create(planned_state).await,
            Err(e) => Err(e),
        };
        logged("create", resource_type, result)
    }

    #[instrument(skip(self, current_state), name = "provider.read")]
    async fn read(
        &self,
        resource_type: &str,
        current_state: Value,
    ) -> Result<Value, ProviderError> {
        let result = match self.resource(resource_type) {
            Ok(resource) => resource.read(current_state).await,
            Err(e) => Err(e),
        };
        logged("read", resource_type, result)
    }

    #[instrument(skip(self, prior_state, planned_state), name = "provider.update")]
    async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value, ProviderError> {
        let result = match self.resource(resource_type) {
            Ok(resource) => resource.update(prior_state, planned_state).await,
            Err(e) => Err(e),
        };
        logged("update", resource_type, result)
    }

    #[instrument(skip(self, current_state), name = "provider.delete")]
    async fn delete(&self, resource_type: &str, current_state: Value) -> Result<(), ProviderError> {
        let result = match self.resource(resource_type) {
            Ok(resource) => resource.delete(current_state).await,
            Err(e) => Err(e),
        };
        logged("delete", resource_type, result)
    }

    #[instrument(skip(self), name = "provider.import_resource")]
    async fn import_resource(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError> {
        let result = match self.resource(resource_type) {
            Ok(resource) => resource.import(id).await.map(|imported| vec![imported]),
            Err(e) => Err(e),
        };
        logged("import", resource_type, result)
    }
}
