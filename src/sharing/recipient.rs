//! The `sharing_recipient` resource.
//!
//! A recipient is identified by its name, which is also stored as the state
//! `id`. Properties whose key starts with [`SERVER_MANAGED_PREFIX`] belong to
//! the server: they are never sent, never recorded and never reported as
//! drift.
//!
//! Updates are applied in two steps because the server handles owner
//! transfers separately from every other field. See [`RecipientResource::update`].

use std::sync::{Arc, OnceLock};

use serde_json::Value;
use tracing::{debug, error, info, instrument, warn};

use crate::diff::{self, Diff};
use crate::error::ProviderError;
use crate::schema::{
    Attribute, AttributeFlags, AttributeType, Block, DiffSuppress, NestedBlock, Schema,
    SuppressFn, ValueValidator,
};
use crate::sharing::api::RecipientsApi;
use crate::sharing::model::{
    AuthenticationType, CreateRecipient, RecipientInfo, SecurablePropertiesKvPairs,
    UpdateRecipient, SERVER_MANAGED_PREFIX,
};
use crate::types::{ImportedResource, PlanResult};
use crate::validation;

/// Resource type name under which recipients are managed.
pub const RESOURCE_TYPE: &str = "sharing_recipient";

const PROPERTIES_COUNT_PATH: &str = "properties_kvpairs.0.properties.%";

/// Diff suppression for the entries of `properties_kvpairs.properties`.
///
/// Suppresses the count dropping from one to zero, which is what a state
/// holding a single server-managed key looks like against a configuration
/// without properties, and the removal of any server-managed key.
pub fn recipient_properties_suppress(path: &str, old: &str, new: &str) -> bool {
    if path == PROPERTIES_COUNT_PATH && old == "1" && new == "0" {
        debug!(path, old, new, "Suppressing property count diff");
        return true;
    }
    if new.is_empty()
        && path
            .strip_prefix("properties_kvpairs.0.properties.")
            .is_some_and(|key| key.starts_with(SERVER_MANAGED_PREFIX))
    {
        debug!(path, old, "Suppressing server-managed property diff");
        return true;
    }
    false
}

/// The recipient schema, built on first use.
pub fn recipient_schema() -> &'static Schema {
    static SCHEMA: OnceLock<Schema> = OnceLock::new();
    SCHEMA.get_or_init(build_schema)
}

fn build_schema() -> Schema {
    let string_list = || AttributeType::list(AttributeType::String);

    let token = Block::new()
        .with_attribute("id", Attribute::computed_string())
        .with_attribute("created_at", Attribute::computed_int64())
        .with_attribute("created_by", Attribute::computed_string())
        .with_attribute("activation_url", Attribute::computed_string())
        .with_attribute("expiration_time", Attribute::computed_int64())
        .with_attribute("updated_at", Attribute::computed_int64())
        .with_attribute("updated_by", Attribute::computed_string());

    Schema::v0()
        .with_attribute(
            "id",
            Attribute::computed_string().with_description("Name of the recipient"),
        )
        .with_attribute(
            "name",
            Attribute::required_string()
                .with_description("Unique name of the recipient")
                .with_force_new()
                .with_diff_suppress(DiffSuppress::EqualFold),
        )
        .with_attribute(
            "authentication_type",
            Attribute::required_string()
                .with_force_new()
                .with_validator(ValueValidator::one_of(AuthenticationType::VALUES)),
        )
        .with_attribute(
            "sharing_code",
            Attribute::optional_string()
                .sensitive()
                .with_force_new()
                .with_diff_suppress(DiffSuppress::Always),
        )
        .with_attribute(
            "owner",
            Attribute::optional_string().with_diff_suppress(DiffSuppress::WhenUnset),
        )
        .with_attribute("comment", Attribute::optional_string())
        .with_attribute(
            "data_recipient_global_metastore_id",
            Attribute::optional_string()
                .with_force_new()
                .with_conflicts_with(["ip_access_list"]),
        )
        .with_block(
            "ip_access_list",
            NestedBlock::single(Block::new().with_attribute(
                "allowed_ip_addresses",
                Attribute::new(string_list(), AttributeFlags::optional()),
            ))
            .with_conflicts_with(["data_recipient_global_metastore_id"]),
        )
        .with_block(
            "properties_kvpairs",
            NestedBlock::single(
                Block::new().with_attribute(
                    "properties",
                    Attribute::new(
                        AttributeType::map(AttributeType::String),
                        AttributeFlags::required(),
                    )
                    .with_diff_suppress(DiffSuppress::Custom(SuppressFn::new(
                        "recipient_properties",
                        recipient_properties_suppress,
                    ))),
                ),
            )
            .with_diff_suppress(DiffSuppress::WhenUnset),
        )
        .with_block("tokens", NestedBlock::list(token).computed())
        .with_attribute("created_at", Attribute::computed_int64())
        .with_attribute("created_by", Attribute::computed_string())
        .with_attribute("updated_at", Attribute::computed_int64())
        .with_attribute("updated_by", Attribute::computed_string())
        .with_attribute("metastore_id", Attribute::computed_string())
        .with_attribute("region", Attribute::computed_string())
        .with_attribute("cloud", Attribute::computed_string())
        .with_attribute("activated", Attribute::computed_bool())
        .with_attribute("activation_url", Attribute::computed_string())
}

/// Manages recipients through an injected [`RecipientsApi`].
#[derive(Clone)]
pub struct RecipientResource {
    api: Arc<dyn RecipientsApi>,
}

impl std::fmt::Debug for RecipientResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecipientResource").finish_non_exhaustive()
    }
}

impl RecipientResource {
    /// Create a resource backed by `api`.
    pub fn new(api: Arc<dyn RecipientsApi>) -> Self {
        Self { api }
    }

    /// The resource schema.
    pub fn schema(&self) -> &'static Schema {
        recipient_schema()
    }

    /// Plan the transition from `prior` to `proposed`.
    pub fn plan(
        &self,
        prior: Option<&Value>,
        proposed: &Value,
    ) -> Result<PlanResult, ProviderError> {
        diff::plan(recipient_schema(), prior, proposed)
    }

    /// Create the recipient described by `planned_state`.
    ///
    /// The configuration is validated before anything is sent. The returned
    /// state carries the server's view of the recipient with `id` set to the
    /// name the server returned.
    #[instrument(skip_all, name = "recipient.create")]
    pub async fn create(&self, planned_state: Value) -> Result<Value, ProviderError> {
        validation::validate_or_error(recipient_schema(), &planned_state)?;

        let mut request: CreateRecipient = serde_json::from_value(planned_state.clone())?;
        strip_request_properties(&mut request.properties_kvpairs);

        info!(
            name = %request.name,
            authentication_type = %request.authentication_type,
            "Creating recipient"
        );
        let created = self.api.create(request).await?;
        let id = created.name.clone();
        info!(id = %id, "Recipient created");

        let reported = to_state(created, &id, &planned_state)?;
        Ok(overlay(planned_state, reported))
    }

    /// Refresh `current_state` from the server.
    ///
    /// Server-managed properties are dropped. A not-found error is returned
    /// as is so the host can forget the resource.
    #[instrument(skip_all, name = "recipient.read")]
    pub async fn read(&self, current_state: Value) -> Result<Value, ProviderError> {
        let id = state_id(&current_state)?;
        debug!(id, "Reading recipient");
        let info = self.api.get_by_name(id).await?;
        to_state(info, id, &current_state)
    }

    /// Apply `planned_state` to the recipient recorded in `prior_state`.
    ///
    /// An owner change is sent on its own first. The remaining fields follow
    /// in a second request with the owner left out. If that second request
    /// fails after the owner was changed, one attempt is made to restore the
    /// previous owner; when that attempt fails too, the result is
    /// [`ProviderError::OwnerRollback`] and the remote owner is unknown.
    #[instrument(skip_all, name = "recipient.update")]
    pub async fn update(
        &self,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value, ProviderError> {
        let id = state_id(&prior_state)?.to_string();
        let changes = diff::diff(recipient_schema(), &prior_state, &planned_state);

        let mut request: UpdateRecipient = serde_json::from_value(planned_state.clone())?;
        request.name = id.clone();
        strip_request_properties(&mut request.properties_kvpairs);

        let previous_owner = prior_state
            .get("owner")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        info!(id = %id, changed = ?changes.changed_fields, "Updating recipient");
        self.apply_update(request, previous_owner, &changes)
            .await
            .into_result()?;

        let mut state = planned_state;
        set_id(&mut state, &id);
        Ok(state)
    }

    /// Delete the recipient recorded in `current_state`.
    #[instrument(skip_all, name = "recipient.delete")]
    pub async fn delete(&self, current_state: Value) -> Result<(), ProviderError> {
        let id = state_id(&current_state)?;
        info!(id, "Deleting recipient");
        self.api.delete_by_name(id).await
    }

    /// Bring an existing recipient under management by name.
    #[instrument(skip(self), name = "recipient.import")]
    pub async fn import(&self, name: &str) -> Result<ImportedResource, ProviderError> {
        let state = self.read(serde_json::json!({ "id": name })).await?;
        Ok(ImportedResource::new(RESOURCE_TYPE, state))
    }

    async fn apply_update(
        &self,
        mut request: UpdateRecipient,
        previous_owner: String,
        changes: &Diff,
    ) -> UpdateOutcome {
        let mut phase = UpdatePhase::NoChange;

        if changes.has_change("owner") {
            let change = OwnerChange {
                previous: previous_owner,
                desired: request.owner.clone().unwrap_or_default(),
            };
            debug!(from = %change.previous, to = %change.desired, "Transferring ownership");
            let owner_request = UpdateRecipient::owner_only(&request.name, &change.desired);
            if let Err(err) = self.api.update(owner_request).await {
                return UpdateOutcome::Failed(err);
            }
            phase = UpdatePhase::OwnerApplied(change);
        }

        if !changes.has_change_except("owner") {
            return UpdateOutcome::Applied;
        }

        request.owner = None;
        let name = request.name.clone();
        let err = match self.api.update(request).await {
            Ok(()) => return UpdateOutcome::Applied,
            Err(err) => err,
        };

        match phase {
            UpdatePhase::NoChange => UpdateOutcome::Failed(err),
            UpdatePhase::OwnerApplied(change) => self.roll_back_owner(&name, change, err).await,
        }
    }

    async fn roll_back_owner(
        &self,
        name: &str,
        change: OwnerChange,
        err: ProviderError,
    ) -> UpdateOutcome {
        warn!(
            name,
            error = %err,
            owner = %change.previous,
            "Update failed after owner change, restoring previous owner"
        );
        if change.previous.is_empty() {
            // An empty owner is never sent, so the request below changes nothing.
            warn!(
                name,
                owner = %change.desired,
                "Previous owner is unknown and could not be restored, owner remains changed"
            );
        }
        match self
            .api
            .update(UpdateRecipient::owner_only(name, &change.previous))
            .await
        {
            Ok(()) => UpdateOutcome::Failed(err),
            Err(rollback) => {
                error!(
                    name,
                    error = %err,
                    rollback_error = %rollback,
                    previous_owner = %change.previous,
                    desired_owner = %change.desired,
                    "Restoring previous owner failed"
                );
                UpdateOutcome::Inconsistent {
                    source: err,
                    rollback,
                    change,
                }
            },
        }
    }
}

#[derive(Debug)]
struct OwnerChange {
    previous: String,
    desired: String,
}

/// How far an update has progressed on the remote side.
#[derive(Debug)]
enum UpdatePhase {
    NoChange,
    OwnerApplied(OwnerChange),
}

#[derive(Debug)]
enum UpdateOutcome {
    Applied,
    Failed(ProviderError),
    /// The owner change stuck while the rest of the update did not.
    Inconsistent {
        source: ProviderError,
        rollback: ProviderError,
        change: OwnerChange,
    },
}

impl UpdateOutcome {
    fn into_result(self) -> Result<(), ProviderError> {
        match self {
            Self::Applied => Ok(()),
            Self::Failed(err) => Err(err),
            Self::Inconsistent {
                source,
                rollback,
                change,
            } => Err(ProviderError::OwnerRollback {
                source: Box::new(source),
                rollback: Box::new(rollback),
                previous_owner: change.previous,
                desired_owner: change.desired,
            }),
        }
    }
}

fn state_id(state: &Value) -> Result<&str, ProviderError> {
    state
        .get("id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ProviderError::InvalidRequest("state has no \"id\"".to_string()))
}

fn set_id(state: &mut Value, id: &str) {
    if let Value::Object(map) = state {
        map.insert("id".to_string(), Value::String(id.to_string()));
    }
}

fn strip_request_properties(properties: &mut Option<SecurablePropertiesKvPairs>) {
    if let Some(props) = properties {
        let stripped = props.strip_server_managed();
        if stripped > 0 {
            debug!(stripped, "Left server-managed properties out of request");
        }
    }
}

/// Map a fetched recipient to state, keeping `id` and the write-only
/// sharing code.
fn to_state(mut info: RecipientInfo, id: &str, current: &Value) -> Result<Value, ProviderError> {
    if let Some(props) = info.properties_kvpairs.as_mut() {
        let stripped = props.strip_server_managed();
        if stripped > 0 {
            debug!(name = %info.name, stripped, "Dropped server-managed properties");
        }
    }

    let mut state = serde_json::to_value(&info)?;
    if let Value::Object(map) = &mut state {
        map.insert("id".to_string(), Value::String(id.to_string()));
        if !map.contains_key("sharing_code") {
            if let Some(code) = current.get("sharing_code").filter(|v| !v.is_null()) {
                map.insert("sharing_code".to_string(), code.clone());
            }
        }
    }
    Ok(state)
}

fn overlay(base: Value, reported: Value) -> Value {
    match (base, reported) {
        (Value::Object(mut base), Value::Object(reported)) => {
            base.extend(reported);
            Value::Object(base)
        },
        (_, reported) => reported,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sharing::model::{IpAccessList, RecipientTokenInfo};
    use crate::testing::{FakeRecipients, RecipientCall, RecipientOp};
    use serde_json::json;
    use std::collections::HashMap;
    use tokio_test::{assert_err, assert_ok};

    fn resource(fake: &Arc<FakeRecipients>) -> RecipientResource {
        RecipientResource::new(fake.clone())
    }

    fn recorded(owner: &str) -> RecipientInfo {
        RecipientInfo {
            name: "partner".to_string(),
            authentication_type: Some(AuthenticationType::Token),
            owner: Some(owner.to_string()),
            comment: Some("old".to_string()),
            ..Default::default()
        }
    }

    fn prior_state(owner: &str) -> Value {
        json!({
            "id": "partner",
            "name": "partner",
            "authentication_type": "TOKEN",
            "owner": owner,
            "comment": "old"
        })
    }

    fn update_calls(calls: &[RecipientCall]) -> Vec<&UpdateRecipient> {
        calls
            .iter()
            .filter_map(|c| match c {
                RecipientCall::Update(request) => Some(request),
                _ => None,
            })
            .collect()
    }

    struct RenamingApi;

    #[async_trait::async_trait]
    impl RecipientsApi for RenamingApi {
        async fn create(&self, request: CreateRecipient) -> Result<RecipientInfo, ProviderError> {
            Ok(RecipientInfo {
                name: format!("{}-assigned", request.name),
                authentication_type: Some(request.authentication_type),
                ..Default::default()
            })
        }

        async fn get_by_name(&self, name: &str) -> Result<RecipientInfo, ProviderError> {
            Err(ProviderError::NotFound(name.to_string()))
        }

        async fn update(&self, _request: UpdateRecipient) -> Result<(), ProviderError> {
            Ok(())
        }

        async fn delete_by_name(&self, _name: &str) -> Result<(), ProviderError> {
            Ok(())
        }
    }

    // -- suppression predicate --

    #[test]
    fn test_properties_suppress_truth_table() {
        let count = "properties_kvpairs.0.properties.%";
        assert!(recipient_properties_suppress(count, "1", "0"));
        assert!(!recipient_properties_suppress(count, "2", "0"));
        assert!(!recipient_properties_suppress(count, "1", "2"));
        assert!(!recipient_properties_suppress(count, "0", "1"));

        let managed = "properties_kvpairs.0.properties.databricks.accountId";
        assert!(recipient_properties_suppress(managed, "123", ""));
        assert!(!recipient_properties_suppress(managed, "123", "456"));

        let user = "properties_kvpairs.0.properties.team";
        assert!(!recipient_properties_suppress(user, "finance", ""));
        assert!(!recipient_properties_suppress("comment", "x", ""));
    }

    // -- schema --

    #[test]
    fn test_schema_annotations() {
        let schema = recipient_schema();
        let attrs = &schema.block.attributes;

        assert!(attrs["name"].force_new);
        assert_eq!(attrs["name"].diff_suppress, DiffSuppress::EqualFold);
        assert!(attrs["authentication_type"].force_new);
        assert!(attrs["sharing_code"].flags.sensitive);
        assert_eq!(attrs["sharing_code"].diff_suppress, DiffSuppress::Always);
        assert_eq!(attrs["owner"].diff_suppress, DiffSuppress::WhenUnset);
        assert!(attrs["activated"].is_read_only());
        assert_eq!(
            attrs["data_recipient_global_metastore_id"].conflicts_with,
            vec!["ip_access_list".to_string()]
        );

        let blocks = &schema.block.blocks;
        assert_eq!(
            blocks["properties_kvpairs"].diff_suppress,
            DiffSuppress::WhenUnset
        );
        assert!(blocks["tokens"].computed);
        assert!(std::ptr::eq(schema, recipient_schema()));
    }

    #[test]
    fn test_case_only_rename_is_not_a_change() {
        let fake = Arc::new(FakeRecipients::new());
        let plan = resource(&fake)
            .plan(
                Some(&json!({"id": "Partner", "name": "Partner", "authentication_type": "TOKEN"})),
                &json!({"name": "partner", "authentication_type": "TOKEN"}),
            )
            .unwrap();
        assert!(!plan.has_changes());
        assert!(!plan.requires_replace);
    }

    #[test]
    fn test_plan_ignores_server_filled_fields() {
        let fake = Arc::new(FakeRecipients::new());
        let prior = json!({
            "id": "partner",
            "name": "partner",
            "authentication_type": "TOKEN",
            "owner": "alice",
            "sharing_code": "s3cr3t",
            "properties_kvpairs": {"properties": {}},
            "tokens": [{"id": "t1"}],
            "activated": true
        });
        let plan = resource(&fake)
            .plan(
                Some(&prior),
                &json!({"name": "partner", "authentication_type": "TOKEN"}),
            )
            .unwrap();
        assert!(!plan.has_changes());
    }

    #[test]
    fn test_plan_rejects_unknown_authentication_type() {
        let fake = Arc::new(FakeRecipients::new());
        let err = resource(&fake)
            .plan(None, &json!({"name": "partner", "authentication_type": "PASSWORD"}))
            .unwrap_err();
        assert!(err.message().contains("authentication_type"));
    }

    // -- create --

    #[tokio::test]
    async fn test_create_uses_returned_name() {
        let resource = RecipientResource::new(Arc::new(RenamingApi));
        let state = resource
            .create(json!({"name": "partner", "authentication_type": "TOKEN"}))
            .await
            .unwrap();
        assert_eq!(state["id"], "partner-assigned");
    }

    #[tokio::test]
    async fn test_create_maps_state_to_request() {
        let fake = Arc::new(FakeRecipients::new());
        let state = resource(&fake)
            .create(json!({
                "name": "partner",
                "authentication_type": "TOKEN",
                "sharing_code": "s3cr3t",
                "comment": "for partners",
                "ip_access_list": {"allowed_ip_addresses": ["10.0.0.0/8"]},
                "properties_kvpairs": {"properties": {"team": "finance", "databricks.name": "x"}}
            }))
            .await
            .unwrap();

        assert_eq!(state["id"], "partner");
        assert_eq!(state["sharing_code"], "s3cr3t");
        assert_eq!(state["comment"], "for partners");

        let calls = fake.calls().await;
        let RecipientCall::Create(request) = &calls[0] else {
            panic!("expected a create call, got {:?}", calls);
        };
        assert_eq!(request.authentication_type, AuthenticationType::Token);
        assert_eq!(request.sharing_code.as_deref(), Some("s3cr3t"));
        assert_eq!(
            request.ip_access_list,
            Some(IpAccessList {
                allowed_ip_addresses: vec!["10.0.0.0/8".to_string()],
            })
        );
        let props = &request.properties_kvpairs.as_ref().unwrap().properties;
        assert_eq!(props.len(), 1);
        assert_eq!(props["team"], "finance");
    }

    #[tokio::test]
    async fn test_conflicting_config_makes_no_remote_calls() {
        let fake = Arc::new(FakeRecipients::new());
        let err = resource(&fake)
            .create(json!({
                "name": "partner",
                "authentication_type": "DATABRICKS",
                "data_recipient_global_metastore_id": "aws:us-west-2:abc",
                "ip_access_list": {"allowed_ip_addresses": ["10.0.0.1"]}
            }))
            .await
            .unwrap_err();

        assert!(matches!(err, ProviderError::Validation(_)));
        assert!(err.message().contains("conflicts with"));
        assert!(fake.calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_empty_ip_access_list_still_conflicts() {
        let fake = Arc::new(FakeRecipients::new());
        let err = resource(&fake)
            .create(json!({
                "name": "partner",
                "authentication_type": "DATABRICKS",
                "data_recipient_global_metastore_id": "aws:us-west-2:abc",
                "ip_access_list": {}
            }))
            .await
            .unwrap_err();

        assert!(matches!(err, ProviderError::Validation(_)));
        assert!(err.message().contains("conflicts with"));
        assert!(fake.calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_create_surfaces_remote_error() {
        let fake = Arc::new(FakeRecipients::new());
        fake.script(
            RecipientOp::Create,
            Err(ProviderError::PermissionDenied("not a metastore admin".to_string())),
        )
        .await;

        let err = resource(&fake)
            .create(json!({"name": "partner", "authentication_type": "TOKEN"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::PermissionDenied(_)));
        assert_eq!(fake.calls().await.len(), 1);
    }

    // -- read --

    #[tokio::test]
    async fn test_read_strips_server_managed_properties() {
        let mut info = recorded("alice");
        info.properties_kvpairs = Some(SecurablePropertiesKvPairs {
            properties: HashMap::from([
                ("team".to_string(), "finance".to_string()),
                ("databricks.name".to_string(), "x".to_string()),
                ("databricks.accountId".to_string(), "1".to_string()),
            ]),
        });
        info.tokens = vec![RecipientTokenInfo {
            id: Some("t1".to_string()),
            ..Default::default()
        }];
        let fake = Arc::new(FakeRecipients::new().with_recipient(info));

        let state = resource(&fake)
            .read(json!({"id": "partner", "sharing_code": "s3cr3t"}))
            .await
            .unwrap();

        assert_eq!(
            state["properties_kvpairs"]["properties"],
            json!({"team": "finance"})
        );
        assert_eq!(state["id"], "partner");
        assert_eq!(state["owner"], "alice");
        assert_eq!(state["sharing_code"], "s3cr3t");
        assert_eq!(state["tokens"][0]["id"], "t1");
    }

    #[tokio::test]
    async fn test_read_propagates_not_found() {
        let fake = Arc::new(FakeRecipients::new());
        let result = resource(&fake).read(json!({"id": "gone"})).await;
        let err = assert_err!(result);
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_read_requires_id() {
        let fake = Arc::new(FakeRecipients::new());
        let err = resource(&fake)
            .read(json!({"name": "partner"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::InvalidRequest(_)));
        assert!(fake.calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_import_reads_by_name() {
        let fake = Arc::new(FakeRecipients::new().with_recipient(recorded("alice")));
        let imported = assert_ok!(resource(&fake).import("partner").await);
        assert_eq!(imported.resource_type, RESOURCE_TYPE);
        assert_eq!(imported.state["id"], "partner");
        assert_eq!(imported.state["comment"], "old");
    }

    // -- update --

    #[tokio::test]
    async fn test_update_owner_only_makes_one_call() {
        let fake = Arc::new(FakeRecipients::new().with_recipient(recorded("alice")));
        let mut planned = prior_state("alice");
        planned["owner"] = json!("bob");

        let state = resource(&fake)
            .update(prior_state("alice"), planned)
            .await
            .unwrap();

        assert_eq!(state["owner"], "bob");
        let calls = fake.calls().await;
        assert_eq!(
            update_calls(&calls),
            vec![&UpdateRecipient::owner_only("partner", "bob")]
        );
        assert_eq!(fake.recipient("partner").await.unwrap().owner.as_deref(), Some("bob"));
    }

    #[tokio::test]
    async fn test_update_owner_and_comment_makes_two_calls() {
        let fake = Arc::new(FakeRecipients::new().with_recipient(recorded("alice")));
        let mut planned = prior_state("alice");
        planned["owner"] = json!("bob");
        planned["comment"] = json!("new");

        assert_ok!(resource(&fake).update(prior_state("alice"), planned).await);

        let calls = fake.calls().await;
        let updates = update_calls(&calls);
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0], &UpdateRecipient::owner_only("partner", "bob"));
        assert_eq!(updates[1].owner, None);
        assert_eq!(updates[1].comment.as_deref(), Some("new"));
        assert_eq!(updates[1].name, "partner");
    }

    #[tokio::test]
    async fn test_update_without_owner_change_skips_owner_call() {
        let fake = Arc::new(FakeRecipients::new().with_recipient(recorded("alice")));
        let mut planned = prior_state("alice");
        planned["comment"] = json!("new");

        assert_ok!(resource(&fake).update(prior_state("alice"), planned).await);

        let calls = fake.calls().await;
        let updates = update_calls(&calls);
        assert_eq!(updates.len(), 1);
        assert!(updates[0].owner.is_none());
        assert_eq!(updates[0].comment.as_deref(), Some("new"));
    }

    #[tokio::test]
    async fn test_update_forces_name_to_id() {
        let fake = Arc::new(FakeRecipients::new().with_recipient(recorded("alice")));
        let mut planned = prior_state("alice");
        planned["name"] = json!("PARTNER");
        planned["comment"] = json!("new");

        assert_ok!(resource(&fake).update(prior_state("alice"), planned).await);
        let calls = fake.calls().await;
        assert_eq!(update_calls(&calls)[0].name, "partner");
    }

    #[tokio::test]
    async fn test_update_strips_server_managed_properties() {
        let fake = Arc::new(FakeRecipients::new().with_recipient(recorded("alice")));
        let mut planned = prior_state("alice");
        planned["properties_kvpairs"] =
            json!({"properties": {"team": "finance", "databricks.name": "x"}});

        assert_ok!(resource(&fake).update(prior_state("alice"), planned).await);
        let calls = fake.calls().await;
        let props = &update_calls(&calls)[0]
            .properties_kvpairs
            .as_ref()
            .unwrap()
            .properties;
        assert_eq!(props.len(), 1);
        assert!(props.contains_key("team"));
    }

    #[tokio::test]
    async fn test_update_owner_failure_stops() {
        let fake = Arc::new(FakeRecipients::new().with_recipient(recorded("alice")));
        fake.script(
            RecipientOp::Update,
            Err(ProviderError::PermissionDenied("bob cannot own".to_string())),
        )
        .await;
        let mut planned = prior_state("alice");
        planned["owner"] = json!("bob");
        planned["comment"] = json!("new");

        let err = resource(&fake)
            .update(prior_state("alice"), planned)
            .await
            .unwrap_err();

        assert!(matches!(err, ProviderError::PermissionDenied(_)));
        assert_eq!(update_calls(&fake.calls().await).len(), 1);
    }

    #[tokio::test]
    async fn test_update_rolls_back_owner() {
        let fake = Arc::new(FakeRecipients::new().with_recipient(recorded("alice")));
        fake.script(RecipientOp::Update, Ok(())).await;
        fake.script(
            RecipientOp::Update,
            Err(ProviderError::Api("comment too long".to_string())),
        )
        .await;
        let mut planned = prior_state("alice");
        planned["owner"] = json!("bob");
        planned["comment"] = json!("new");

        let err = resource(&fake)
            .update(prior_state("alice"), planned)
            .await
            .unwrap_err();

        assert!(matches!(&err, ProviderError::Api(msg) if msg == "comment too long"));
        let calls = fake.calls().await;
        let updates = update_calls(&calls);
        assert_eq!(updates.len(), 3);
        assert_eq!(updates[2], &UpdateRecipient::owner_only("partner", "alice"));
        assert_eq!(fake.recipient("partner").await.unwrap().owner.as_deref(), Some("alice"));
    }

    #[tokio::test]
    async fn test_update_reports_failed_rollback() {
        let fake = Arc::new(FakeRecipients::new().with_recipient(recorded("alice")));
        fake.script(RecipientOp::Update, Ok(())).await;
        fake.script(
            RecipientOp::Update,
            Err(ProviderError::Api("comment too long".to_string())),
        )
        .await;
        fake.script(
            RecipientOp::Update,
            Err(ProviderError::Unavailable("try again later".to_string())),
        )
        .await;
        let mut planned = prior_state("alice");
        planned["owner"] = json!("bob");
        planned["comment"] = json!("new");

        let err = resource(&fake)
            .update(prior_state("alice"), planned)
            .await
            .unwrap_err();

        match &err {
            ProviderError::OwnerRollback {
                source,
                rollback,
                previous_owner,
                desired_owner,
            } => {
                assert!(matches!(**source, ProviderError::Api(_)));
                assert!(matches!(**rollback, ProviderError::Unavailable(_)));
                assert_eq!(previous_owner, "alice");
                assert_eq!(desired_owner, "bob");
            },
            other => panic!("expected OwnerRollback, got {:?}", other),
        }
        let message = err.to_string();
        assert!(message.contains("comment too long"));
        assert!(message.contains("try again later"));
        assert!(message.contains("\"alice\""));
        assert!(message.contains("\"bob\""));
        assert_eq!(update_calls(&fake.calls().await).len(), 3);
    }

    /// Collects formatted log output for assertions.
    #[derive(Clone, Default)]
    struct LogCapture(Arc<std::sync::Mutex<Vec<u8>>>);

    impl LogCapture {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl std::io::Write for LogCapture {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for LogCapture {
        type Writer = LogCapture;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[tokio::test]
    async fn test_update_rollback_without_previous_owner_is_logged() {
        let logs = LogCapture::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(logs.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::WARN)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let fake = Arc::new(FakeRecipients::new().with_recipient(recorded("")));
        fake.script(RecipientOp::Update, Ok(())).await;
        fake.script(
            RecipientOp::Update,
            Err(ProviderError::Api("comment too long".to_string())),
        )
        .await;
        let mut planned = prior_state("");
        planned["owner"] = json!("bob");
        planned["comment"] = json!("new");

        let err = resource(&fake)
            .update(prior_state(""), planned)
            .await
            .unwrap_err();

        assert!(matches!(&err, ProviderError::Api(msg) if msg == "comment too long"));
        let calls = fake.calls().await;
        let updates = update_calls(&calls);
        assert_eq!(updates.len(), 3);
        assert_eq!(updates[2].owner, None);
        assert_eq!(
            fake.recipient("partner").await.unwrap().owner.as_deref(),
            Some("bob")
        );
        assert!(logs.contents().contains("could not be restored"));
    }

    #[tokio::test]
    async fn test_update_failure_without_owner_change() {
        let fake = Arc::new(FakeRecipients::new().with_recipient(recorded("alice")));
        fake.script(
            RecipientOp::Update,
            Err(ProviderError::Api("comment too long".to_string())),
        )
        .await;
        let mut planned = prior_state("alice");
        planned["comment"] = json!("new");

        let err = resource(&fake)
            .update(prior_state("alice"), planned)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Api(_)));
        assert_eq!(update_calls(&fake.calls().await).len(), 1);
    }

    // -- delete --

    #[tokio::test]
    async fn test_delete() {
        let fake = Arc::new(FakeRecipients::new().with_recipient(recorded("alice")));
        assert_ok!(resource(&fake).delete(json!({"id": "partner"})).await);
        assert!(fake.recipient("partner").await.is_none());
        assert_eq!(
            fake.calls().await,
            vec![RecipientCall::Delete("partner".to_string())]
        );
    }

    #[tokio::test]
    async fn test_delete_propagates_not_found() {
        let fake = Arc::new(FakeRecipients::new());
        let err = resource(&fake)
            .delete(json!({"id": "gone"}))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
