//! Test harness for providers.
//!
//! [`ProviderTester`] drives a [`ProviderService`] the way a host would,
//! without any transport in between. [`FakeRecipients`] is an in-memory
//! [`RecipientsApi`] that records every call and can be scripted to fail.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use hemmer_provider_sharing::testing::{FakeRecipients, ProviderTester};
//! use hemmer_provider_sharing::{SharingProvider, RESOURCE_TYPE};
//! use serde_json::json;
//!
//! #[tokio::test]
//! async fn test_create_recipient() {
//!     let fake = Arc::new(FakeRecipients::new());
//!     let tester = ProviderTester::new(SharingProvider::new(fake.clone()));
//!
//!     tester.configure(json!({})).await.unwrap();
//!
//!     let state = tester.lifecycle_create(RESOURCE_TYPE, json!({
//!         "name": "partner",
//!         "authentication_type": "TOKEN"
//!     })).await.unwrap();
//!
//!     assert_eq!(state["id"], "partner");
//! }
//! ```

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::error::ProviderError;
use crate::provider::ProviderService;
use crate::schema::{Diagnostic, DiagnosticSeverity, ProviderSchema};
use crate::sharing::{
    AuthenticationType, CreateRecipient, RecipientInfo, RecipientTokenInfo, RecipientsApi,
    SecurablePropertiesKvPairs, UpdateRecipient,
};
use crate::types::{ImportedResource, PlanResult};

/// Calls a provider the way a host does, one step or one lifecycle at a time.
///
/// Steps that return diagnostics fail with [`TestError::Diagnostics`] when any
/// of them is an error.
pub struct ProviderTester<P: ProviderService> {
    provider: P,
}

impl<P: ProviderService> ProviderTester<P> {
    #[allow(missing_docs)]
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    /// The wrapped provider.
    pub fn provider(&self) -> &P {
        &self.provider
    }

    #[allow(missing_docs)]
    pub fn schema(&self) -> ProviderSchema {
        self.provider.schema()
    }

    /// Resource type names, sorted.
    pub fn resource_types(&self) -> Vec<String> {
        self.provider.metadata().resources
    }

    #[allow(missing_docs)]
    pub async fn validate_provider_config(&self, config: Value) -> Result<(), TestError> {
        errors_only(self.provider.validate_provider_config(config).await?)
    }

    #[allow(missing_docs)]
    pub async fn configure(&self, config: Value) -> Result<(), TestError> {
        errors_only(self.provider.configure(config).await?)
    }

    #[allow(missing_docs)]
    pub async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<(), TestError> {
        errors_only(
            self.provider
                .validate_resource_config(resource_type, config)
                .await?,
        )
    }

    /// Plan with no prior state; `config` doubles as the proposed state.
    pub async fn plan_create(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<PlanResult, ProviderError> {
        self.plan(resource_type, None, config.clone(), config).await
    }

    /// Plan `config` against `prior_state`.
    pub async fn plan_update(
        &self,
        resource_type: &str,
        prior_state: Value,
        config: Value,
    ) -> Result<PlanResult, ProviderError> {
        self.plan(resource_type, Some(prior_state), config.clone(), config)
            .await
    }

    /// Plan a destroy: the configuration is null.
    pub async fn plan_delete(
        &self,
        resource_type: &str,
        prior_state: Value,
    ) -> Result<PlanResult, ProviderError> {
        self.plan(resource_type, Some(prior_state), Value::Null, Value::Null)
            .await
    }

    #[allow(missing_docs)]
    pub async fn plan(
        &self,
        resource_type: &str,
        prior_state: Option<Value>,
        proposed_state: Value,
        config: Value,
    ) -> Result<PlanResult, ProviderError> {
        self.provider
            .plan(resource_type, prior_state, proposed_state, config)
            .await
    }

    #[allow(missing_docs)]
    pub async fn create(
        &self,
        resource_type: &str,
        planned: Value,
    ) -> Result<Value, ProviderError> {
        self.provider.create(resource_type, planned).await
    }

    #[allow(missing_docs)]
    pub async fn read(&self, resource_type: &str, state: Value) -> Result<Value, ProviderError> {
        self.provider.read(resource_type, state).await
    }

    #[allow(missing_docs)]
    pub async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned: Value,
    ) -> Result<Value, ProviderError> {
        self.provider
            .update(resource_type, prior_state, planned)
            .await
    }

    #[allow(missing_docs)]
    pub async fn delete(&self, resource_type: &str, state: Value) -> Result<(), ProviderError> {
        self.provider.delete(resource_type, state).await
    }

    #[allow(missing_docs)]
    pub async fn import_resource(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError> {
        self.provider.import_resource(resource_type, id).await
    }

    /// Plan, create, then read back. Returns the refreshed state.
    pub async fn lifecycle_create(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Value, ProviderError> {
        let plan = self.plan_create(resource_type, config).await?;
        let created = self.create(resource_type, plan.planned_state).await?;
        self.read(resource_type, created).await
    }

    /// Plan against `prior_state` and apply the plan, then read back.
    ///
    /// A plan without changes applies nothing. A plan requiring replacement
    /// deletes the old resource and creates a new one.
    pub async fn lifecycle_update(
        &self,
        resource_type: &str,
        prior_state: Value,
        config: Value,
    ) -> Result<Value, ProviderError> {
        let plan = self
            .plan_update(resource_type, prior_state.clone(), config)
            .await?;

        let applied = if !plan.has_changes() {
            prior_state
        } else if plan.requires_replace {
            self.delete(resource_type, prior_state).await?;
            self.create(resource_type, plan.planned_state).await?
        } else {
            self.update(resource_type, prior_state, plan.planned_state)
                .await?
        };
        self.read(resource_type, applied).await
    }

    /// Plan a destroy, then delete.
    pub async fn lifecycle_delete(
        &self,
        resource_type: &str,
        state: Value,
    ) -> Result<(), ProviderError> {
        let plan = self.plan_delete(resource_type, state.clone()).await?;
        if !plan.planned_state.is_null() {
            return Err(ProviderError::InvalidRequest(format!(
                "destroy plan for {} kept a planned state",
                resource_type
            )));
        }
        self.delete(resource_type, state).await
    }

    /// Create, update, then delete. Returns the state after the update.
    pub async fn lifecycle_crud(
        &self,
        resource_type: &str,
        initial_config: Value,
        updated_config: Value,
    ) -> Result<Value, ProviderError> {
        let created = self.lifecycle_create(resource_type, initial_config).await?;
        let updated = self
            .lifecycle_update(resource_type, created, updated_config)
            .await?;
        self.lifecycle_delete(resource_type, updated.clone()).await?;
        Ok(updated)
    }
}

/// Failure of a [`ProviderTester`] step.
#[derive(Debug, thiserror::Error)]
pub enum TestError {
    /// Error diagnostics; warnings are dropped.
    #[error("{}", render_diagnostics(.0))]
    Diagnostics(Vec<Diagnostic>),
    #[allow(missing_docs)]
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),
}

fn render_diagnostics(diagnostics: &[Diagnostic]) -> String {
    let mut out = format!("{} error diagnostic(s):", diagnostics.len());
    for d in diagnostics {
        out.push_str("\n  ");
        out.push_str(&d.summary);
        if let Some(detail) = &d.detail {
            out.push_str(": ");
            out.push_str(detail);
        }
        if let Some(attribute) = &d.attribute {
            out.push_str(&format!(" (at {})", attribute));
        }
    }
    out
}

fn errors_only(diagnostics: Vec<Diagnostic>) -> Result<(), TestError> {
    let errors: Vec<_> = diagnostics.into_iter().filter(is_error).collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(TestError::Diagnostics(errors))
    }
}

fn is_error(d: &Diagnostic) -> bool {
    d.severity == DiagnosticSeverity::Error
}

fn error_summaries(diagnostics: &[Diagnostic]) -> Vec<&str> {
    diagnostics
        .iter()
        .filter(|d| is_error(d))
        .map(|d| d.summary.as_str())
        .collect()
}

fn changed_paths(plan: &PlanResult) -> Vec<&str> {
    plan.changes.iter().map(|c| c.path.as_str()).collect()
}

/// Panics unless the plan creates: some changes, no replacement.
pub fn assert_plan_creates(plan: &PlanResult) {
    assert!(plan.has_changes(), "plan has no changes, expected a create");
    assert!(!plan.requires_replace, "plan replaces, expected a create");
}

/// Panics if the plan changes anything.
pub fn assert_plan_no_changes(plan: &PlanResult) {
    assert!(
        !plan.has_changes(),
        "expected an empty plan, got changes at {:?}",
        changed_paths(plan)
    );
}

/// Panics unless the plan replaces the resource.
pub fn assert_plan_replaces(plan: &PlanResult) {
    assert!(plan.requires_replace, "expected the plan to replace the resource");
}

/// Panics if the plan replaces the resource.
pub fn assert_plan_updates_in_place(plan: &PlanResult) {
    assert!(
        !plan.requires_replace,
        "expected an in-place update, but the plan replaces the resource"
    );
}

/// Panics unless the plan has a change at `path` (a flattened path such as
/// `ip_access_list.0.allowed_ip_addresses.#`).
pub fn assert_plan_changes_attribute(plan: &PlanResult, path: &str) {
    let paths = changed_paths(plan);
    assert!(
        paths.contains(&path),
        "expected a change at '{}', changes are at {:?}",
        path,
        paths
    );
}

/// Panics if the plan has a change at `path`.
pub fn assert_plan_does_not_change_attribute(plan: &PlanResult, path: &str) {
    assert!(
        !changed_paths(plan).contains(&path),
        "expected no change at '{}'",
        path
    );
}

/// Panics if any diagnostic is an error.
pub fn assert_no_errors(diagnostics: &[Diagnostic]) {
    let errors = error_summaries(diagnostics);
    assert!(errors.is_empty(), "expected no errors, got {:?}", errors);
}

/// Panics unless some diagnostic is an error.
pub fn assert_has_errors(diagnostics: &[Diagnostic]) {
    assert!(
        !error_summaries(diagnostics).is_empty(),
        "expected at least one error diagnostic"
    );
}

/// Panics unless an error diagnostic's summary contains `substring`.
pub fn assert_error_contains(diagnostics: &[Diagnostic], substring: &str) {
    let errors = error_summaries(diagnostics);
    assert!(
        errors.iter().any(|s| s.contains(substring)),
        "expected an error containing '{}', got {:?}",
        substring,
        errors
    );
}


/// A [`RecipientsApi`] operation, used to script [`FakeRecipients`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecipientOp {
    /// [`RecipientsApi::create`]
    Create,
    /// [`RecipientsApi::get_by_name`]
    Get,
    /// [`RecipientsApi::update`]
    Update,
    /// [`RecipientsApi::delete_by_name`]
    Delete,
}

/// A call received by [`FakeRecipients`], with its request.
#[derive(Debug, Clone, PartialEq)]
pub enum RecipientCall {
    /// A create request.
    Create(CreateRecipient),
    /// A fetch by name.
    Get(String),
    /// An update request.
    Update(UpdateRecipient),
    /// A delete by name.
    Delete(String),
}

#[derive(Default)]
struct FakeState {
    recipients: HashMap<String, RecipientInfo>,
    calls: Vec<RecipientCall>,
    scripted: HashMap<RecipientOp, VecDeque<Result<(), ProviderError>>>,
    server_properties: HashMap<String, String>,
}

impl FakeState {
    fn next_result(&mut self, op: RecipientOp) -> Result<(), ProviderError> {
        self.scripted
            .get_mut(&op)
            .and_then(VecDeque::pop_front)
            .unwrap_or(Ok(()))
    }
}

/// In-memory recipients service.
///
/// Behaves like the real service closely enough for lifecycle tests: names
/// are unique, missing recipients are [`ProviderError::NotFound`], a new
/// recipient without an owner is owned by `admin`, token recipients get one
/// activation token, and the sharing code is never echoed back.
///
/// Every call is recorded before anything else happens, including calls that
/// fail. Results scripted with [`script`](Self::script) are consumed one per
/// call of that operation; an error result fails the call without touching
/// the stored recipients.
#[derive(Default)]
pub struct FakeRecipients {
    state: Mutex<FakeState>,
}

impl FakeRecipients {
    /// An empty service.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a stored recipient.
    pub fn with_recipient(mut self, info: RecipientInfo) -> Self {
        self.state
            .get_mut()
            .recipients
            .insert(info.name.clone(), info);
        self
    }

    /// Add a property the server attaches to every recipient it creates or
    /// updates, like the `databricks.`-prefixed keys of the real service.
    pub fn with_server_property(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.state
            .get_mut()
            .server_properties
            .insert(key.into(), value.into());
        self
    }

    /// Queue the result of the next not yet scripted call of `op`.
    pub async fn script(&self, op: RecipientOp, result: Result<(), ProviderError>) {
        self.state
            .lock()
            .await
            .scripted
            .entry(op)
            .or_default()
            .push_back(result);
    }

    /// Every call received so far, in order.
    pub async fn calls(&self) -> Vec<RecipientCall> {
        self.state.lock().await.calls.clone()
    }

    /// The stored recipient named `name`.
    pub async fn recipient(&self, name: &str) -> Option<RecipientInfo> {
        self.state.lock().await.recipients.get(name).cloned()
    }
}

fn attach_server_properties(
    server_properties: &HashMap<String, String>,
    properties: Option<SecurablePropertiesKvPairs>,
) -> Option<SecurablePropertiesKvPairs> {
    if server_properties.is_empty() {
        return properties;
    }
    let mut properties = properties.unwrap_or_default();
    properties
        .properties
        .extend(server_properties.iter().map(|(k, v)| (k.clone(), v.clone())));
    Some(properties)
}

fn not_found(name: &str) -> ProviderError {
    ProviderError::NotFound(format!("Recipient '{}' does not exist.", name))
}

#[async_trait]
impl RecipientsApi for FakeRecipients {
    async fn create(&self, request: CreateRecipient) -> Result<RecipientInfo, ProviderError> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        state.calls.push(RecipientCall::Create(request.clone()));
        state.next_result(RecipientOp::Create)?;

        if state.recipients.contains_key(&request.name) {
            return Err(ProviderError::AlreadyExists(format!(
                "Recipient '{}' already exists.",
                request.name
            )));
        }

        let tokens = match request.authentication_type {
            AuthenticationType::Token => vec![RecipientTokenInfo {
                id: Some(format!("{}-token", request.name)),
                activation_url: Some(format!(
                    "https://sharing.example.com/activate/{}",
                    request.name
                )),
                ..Default::default()
            }],
            AuthenticationType::Databricks => Vec::new(),
        };
        let info = RecipientInfo {
            name: request.name.clone(),
            authentication_type: Some(request.authentication_type),
            owner: Some(request.owner.unwrap_or_else(|| "admin".to_string())),
            comment: request.comment,
            data_recipient_global_metastore_id: request.data_recipient_global_metastore_id,
            ip_access_list: request.ip_access_list,
            properties_kvpairs: attach_server_properties(
                &state.server_properties,
                request.properties_kvpairs,
            ),
            activated: Some(false),
            tokens,
            ..Default::default()
        };
        state.recipients.insert(info.name.clone(), info.clone());
        Ok(info)
    }

    async fn get_by_name(&self, name: &str) -> Result<RecipientInfo, ProviderError> {
        let mut state = self.state.lock().await;
        state.calls.push(RecipientCall::Get(name.to_string()));
        state.next_result(RecipientOp::Get)?;
        state.recipients.get(name).cloned().ok_or_else(|| not_found(name))
    }

    async fn update(&self, request: UpdateRecipient) -> Result<(), ProviderError> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        state.calls.push(RecipientCall::Update(request.clone()));
        state.next_result(RecipientOp::Update)?;

        let owner_only = request.is_owner_only();
        let recipient = state
            .recipients
            .get_mut(&request.name)
            .ok_or_else(|| not_found(&request.name))?;
        if let Some(owner) = request.owner {
            recipient.owner = Some(owner);
        }
        if owner_only {
            return Ok(());
        }
        if let Some(comment) = request.comment {
            recipient.comment = Some(comment);
        }
        if let Some(ip_access_list) = request.ip_access_list {
            recipient.ip_access_list = Some(ip_access_list);
        }
        if request.properties_kvpairs.is_some() {
            recipient.properties_kvpairs =
                attach_server_properties(&state.server_properties, request.properties_kvpairs);
        }
        Ok(())
    }

    async fn delete_by_name(&self, name: &str) -> Result<(), ProviderError> {
        let mut state = self.state.lock().await;
        state.calls.push(RecipientCall::Delete(name.to_string()));
        state.next_result(RecipientOp::Delete)?;
        state
            .recipients
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| not_found(name))
    }
}
