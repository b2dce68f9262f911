//! Plan, import and metadata types exchanged with the host.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A change to a single flattened attribute path during a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeChange {
    /// Flattened path, e.g. `properties_kvpairs.0.properties.team`.
    pub path: String,
    /// `None` when the path is new.
    pub before: Option<Value>,
    /// `None` when the path goes away.
    pub after: Option<Value>,
}

impl AttributeChange {
    #[allow(missing_docs)]
    pub fn new(
        path: impl Into<String>,
        before: Option<Value>,
        after: Option<Value>,
    ) -> Self {
        Self {
            path: path.into(),
            before,
            after,
        }
    }

    /// `path` appears with `value`.
    pub fn added(path: impl Into<String>, value: Value) -> Self {
        Self::new(path, None, Some(value))
    }

    /// `path` disappears.
    pub fn removed(path: impl Into<String>, value: Value) -> Self {
        Self::new(path, Some(value), None)
    }

    /// `path` goes from `before` to `after`.
    pub fn modified(
        path: impl Into<String>,
        before: Value,
        after: Value,
    ) -> Self {
        Self::new(path, Some(before), Some(after))
    }
}

/// What applying a configuration would do to one resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanResult {
    /// The planned state after the operation (`Null` when destroying).
    pub planned_state: Value,
    /// Unsuppressed changes, ordered by path.
    pub changes: Vec<AttributeChange>,
    /// A force-new field changed: delete and create instead of update.
    pub requires_replace: bool,
}

impl PlanResult {
    /// Keep `state` as it is.
    pub fn no_change(state: Value) -> Self {
        Self {
            planned_state: state,
            changes: Vec::new(),
            requires_replace: false,
        }
    }

    #[allow(missing_docs)]
    pub fn with_changes(
        planned_state: Value,
        changes: Vec<AttributeChange>,
        requires_replace: bool,
    ) -> Self {
        Self {
            planned_state,
            changes,
            requires_replace,
        }
    }

    /// Whether applying this plan would touch the resource at all.
    pub fn has_changes(&self) -> bool {
        !self.changes.is_empty()
    }
}

/// A resource brought under management by import.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportedResource {
    /// Type name, e.g. `sharing_recipient`.
    pub resource_type: String,
    /// State as read from the remote service.
    pub state: Value,
}

impl ImportedResource {
    #[allow(missing_docs)]
    pub fn new(resource_type: impl Into<String>, state: Value) -> Self {
        Self {
            resource_type: resource_type.into(),
            state,
        }
    }
}

/// Provider metadata: the resource types it manages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ProviderMetadata {
    /// Resource type names, sorted.
    pub resources: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_attribute_change_constructors() {
        let added = AttributeChange::added("comment", json!("for partners"));
        assert!(added.before.is_none());
        assert_eq!(added.after, Some(json!("for partners")));

        let removed = AttributeChange::removed("owner", json!("alice"));
        assert_eq!(removed.before, Some(json!("alice")));
        assert!(removed.after.is_none());

        let modified = AttributeChange::modified("owner", json!("alice"), json!("bob"));
        assert_eq!(modified.before, Some(json!("alice")));
        assert_eq!(modified.after, Some(json!("bob")));
    }

    #[test]
    fn test_plan_result() {
        let no_change = PlanResult::no_change(json!({"id": "partner"}));
        assert!(!no_change.has_changes());
        assert!(!no_change.requires_replace);

        let with_changes = PlanResult::with_changes(
            json!({"id": "partner", "owner": "bob"}),
            vec![AttributeChange::modified("owner", json!("alice"), json!("bob"))],
            false,
        );
        assert!(with_changes.has_changes());
        assert_eq!(with_changes.changes.len(), 1);
    }

    #[test]
    fn test_plan_result_serialization() {
        let plan = PlanResult::with_changes(
            json!({"name": "partner"}),
            vec![AttributeChange::added("name", json!("partner"))],
            true,
        );
        let value = serde_json::to_value(&plan).unwrap();
        assert_eq!(value["requires_replace"], true);
        assert_eq!(value["changes"][0]["path"], "name");
        assert!(value["changes"][0]["before"].is_null());
    }

    #[test]
    fn test_imported_resource() {
        let imported = ImportedResource::new("sharing_recipient", json!({"id": "partner"}));
        assert_eq!(imported.resource_type, "sharing_recipient");
        assert_eq!(imported.state["id"], "partner");
    }
}
