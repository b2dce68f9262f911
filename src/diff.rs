//! Drift detection driven by schema annotations.
//!
//! States are flattened into `path -> string` pairs the way Terraform's
//! flatmap does it, so suppression predicates see familiar paths:
//!
//! | Shape | Paths |
//! |---|---|
//! | scalar `a` | `a` |
//! | list or set attribute | `a.#`, `a.0`, `a.1`, … |
//! | map attribute | `a.%`, `a.<key>` (keys are used verbatim and may contain dots) |
//! | single block | `a.#` = `1`, `a.0.<field>` |
//! | list or set block | `a.#`, `a.<n>.<field>` |
//! | map block | `a.%`, `a.<key>.<field>` |
//!
//! A missing count reads as `"0"`, any other missing value as `""`.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;
use tracing::trace;

use crate::error::ProviderError;
use crate::schema::{AttributeType, Block, BlockNestingMode, DiffSuppress, Schema};
use crate::types::{AttributeChange, PlanResult};
use crate::validation;

/// Shown in place of sensitive values in plan output.
pub const SENSITIVE_PLACEHOLDER: &str = "(sensitive value)";

/// Annotations inherited by every flattened path beneath a schema element.
#[derive(Debug, Clone)]
struct Lineage<'s> {
    field: &'s str,
    force_new: bool,
    read_only: bool,
    sensitive: bool,
    suppressors: Vec<&'s DiffSuppress>,
}

impl<'s> Lineage<'s> {
    fn descend(
        parent: Option<&Lineage<'s>>,
        name: &'s str,
        force_new: bool,
        read_only: bool,
        sensitive: bool,
        suppress: &'s DiffSuppress,
    ) -> Self {
        let mut lineage = parent.cloned().unwrap_or(Lineage {
            field: name,
            force_new: false,
            read_only: false,
            sensitive: false,
            suppressors: Vec::new(),
        });
        lineage.force_new |= force_new;
        lineage.read_only |= read_only;
        lineage.sensitive |= sensitive;
        if *suppress != DiffSuppress::Never {
            lineage.suppressors.push(suppress);
        }
        lineage
    }
}

#[derive(Debug)]
struct FlatValue<'s> {
    value: String,
    lineage: Lineage<'s>,
}

/// A state flattened into `path -> value` pairs.
#[derive(Debug, Default)]
pub struct FlatState<'s> {
    entries: BTreeMap<String, FlatValue<'s>>,
}

impl FlatState<'_> {
    /// The flattened value at `path`, if present.
    pub fn get(&self, path: &str) -> Option<&str> {
        self.entries.get(path).map(|e| e.value.as_str())
    }

    /// All flattened paths in order.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Number of flattened paths.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing was flattened.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn value_or_zero(&self, path: &str) -> &str {
        match self.get(path) {
            Some(value) => value,
            None if is_count(path) => "0",
            None => "",
        }
    }
}

impl<'s> FlatState<'s> {
    fn insert(&mut self, path: String, value: String, lineage: &Lineage<'s>) {
        let lineage = lineage.clone();
        self.entries.insert(path, FlatValue { value, lineage });
    }
}

/// Flatten a state according to `schema`.
///
/// Values the schema does not describe are ignored, as are nulls.
pub fn flatten<'s>(schema: &'s Schema, state: &Value) -> FlatState<'s> {
    let mut out = FlatState::default();
    flatten_block(&schema.block, state, "", None, &mut out);
    out
}

fn flatten_block<'s>(
    block: &'s Block,
    value: &Value,
    prefix: &str,
    parent: Option<&Lineage<'s>>,
    out: &mut FlatState<'s>,
) {
    let Some(obj) = value.as_object() else {
        return;
    };

    for (name, attr) in &block.attributes {
        let Some(v) = obj.get(name).filter(|v| !v.is_null()) else {
            continue;
        };
        let lineage = Lineage::descend(
            parent,
            name,
            attr.force_new,
            attr.is_read_only(),
            attr.flags.sensitive,
            &attr.diff_suppress,
        );
        flatten_value(&attr.attr_type, v, &join_path(prefix, name), &lineage, out);
    }

    for (name, nested) in &block.blocks {
        let Some(v) = obj.get(name).filter(|v| !v.is_null()) else {
            continue;
        };
        let lineage = Lineage::descend(
            parent,
            name,
            false,
            nested.computed,
            false,
            &nested.diff_suppress,
        );
        let path = join_path(prefix, name);
        match (nested.nesting_mode, v) {
            (BlockNestingMode::Single, Value::Object(_)) => {
                out.insert(format!("{}.#", path), "1".to_string(), &lineage);
                flatten_block(&nested.block, v, &format!("{}.0", path), Some(&lineage), out);
            },
            (BlockNestingMode::List, Value::Array(items)) => {
                out.insert(format!("{}.#", path), items.len().to_string(), &lineage);
                for (i, item) in items.iter().enumerate() {
                    let item_path = format!("{}.{}", path, i);
                    flatten_block(&nested.block, item, &item_path, Some(&lineage), out);
                }
            },
            // Shape mismatches are reported by validation, not here.
            _ => {},
        }
    }
}

fn flatten_value<'s>(
    attr_type: &AttributeType,
    value: &Value,
    path: &str,
    lineage: &Lineage<'s>,
    out: &mut FlatState<'s>,
) {
    match (attr_type, value) {
        (_, Value::Null) => {},
        (AttributeType::List(element), Value::Array(items)) => {
            out.insert(format!("{}.#", path), items.len().to_string(), lineage);
            for (i, item) in items.iter().enumerate() {
                flatten_value(element, item, &format!("{}.{}", path, i), lineage, out);
            }
        },
        (AttributeType::Map(element), Value::Object(items)) => {
            out.insert(format!("{}.%", path), items.len().to_string(), lineage);
            for (key, item) in items {
                flatten_value(element, item, &format!("{}.{}", path, key), lineage, out);
            }
        },
        _ => out.insert(path.to_string(), scalar_string(value), lineage),
    }
}

/// The outcome of comparing a recorded state with a desired one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Diff {
    /// Every unsuppressed change, ordered by path.
    pub changes: Vec<AttributeChange>,
    /// Top-level fields with at least one unsuppressed change.
    pub changed_fields: BTreeSet<String>,
    /// Whether a force-new path changed.
    pub requires_replace: bool,
}

impl Diff {
    /// Whether `field` has an unsuppressed change.
    pub fn has_change(&self, field: &str) -> bool {
        self.changed_fields.contains(field)
    }

    /// Whether any field other than `field` has an unsuppressed change.
    pub fn has_change_except(&self, field: &str) -> bool {
        self.changed_fields.iter().any(|f| f != field)
    }
}

/// Compare `prior` with `desired`, applying the schema's suppressions.
///
/// Read-only paths never produce changes.
pub fn diff(schema: &Schema, prior: &Value, desired: &Value) -> Diff {
    let old = flatten(schema, prior);
    let new = flatten(schema, desired);
    let paths: BTreeSet<&str> = old.paths().chain(new.paths()).collect();

    let mut result = Diff::default();
    for path in paths {
        let Some(entry) = new.entries.get(path).or_else(|| old.entries.get(path)) else {
            continue;
        };
        let lineage = &entry.lineage;
        if lineage.read_only {
            continue;
        }

        let before = old.value_or_zero(path);
        let after = new.value_or_zero(path);
        if before == after {
            continue;
        }

        if lineage
            .suppressors
            .iter()
            .any(|s| s.suppresses(path, before, after))
        {
            if lineage.sensitive {
                trace!(path, "Difference suppressed");
            } else {
                trace!(path, old = before, new = after, "Difference suppressed");
            }
            continue;
        }

        result
            .changes
            .push(attribute_change(path, before, after, lineage.sensitive));
        result.requires_replace |= lineage.force_new;
        result.changed_fields.insert(lineage.field.to_string());
    }
    result
}

/// Plan the transition from `prior` (absent on create) to `proposed`.
///
/// The proposed state is validated first; an invalid configuration yields
/// [`ProviderError::Validation`]. A `Null` proposal plans a destroy. For an
/// in-place update the planned state is the prior state with every changed
/// top-level field taken from the proposal, so suppressed and read-only
/// values keep what the server reported.
pub fn plan(
    schema: &Schema,
    prior: Option<&Value>,
    proposed: &Value,
) -> Result<PlanResult, ProviderError> {
    let prior = prior.filter(|p| !p.is_null());

    if proposed.is_null() {
        let changes = prior
            .map(|p| {
                let flat = flatten(schema, p);
                flat.entries
                    .iter()
                    .filter(|(_, e)| !e.lineage.read_only)
                    .map(|(path, e)| {
                        AttributeChange::removed(path, display_value(&e.value, e.lineage.sensitive))
                    })
                    .collect()
            })
            .unwrap_or_default();
        return Ok(PlanResult::with_changes(Value::Null, changes, false));
    }

    validation::validate_or_error(schema, proposed)?;

    let Some(prior) = prior else {
        let flat = flatten(schema, proposed);
        let changes = flat
            .entries
            .iter()
            .filter(|(_, e)| !e.lineage.read_only)
            .map(|(path, e)| {
                AttributeChange::added(path, display_value(&e.value, e.lineage.sensitive))
            })
            .collect();
        return Ok(PlanResult::with_changes(proposed.clone(), changes, false));
    };

    let diff = diff(schema, prior, proposed);
    if diff.requires_replace {
        return Ok(PlanResult::with_changes(proposed.clone(), diff.changes, true));
    }
    if diff.changes.is_empty() {
        return Ok(PlanResult::no_change(prior.clone()));
    }

    let mut planned = prior.clone();
    if let Value::Object(map) = &mut planned {
        for field in &diff.changed_fields {
            match proposed.get(field).filter(|v| !v.is_null()) {
                Some(value) => {
                    map.insert(field.clone(), value.clone());
                },
                None => {
                    map.remove(field);
                },
            }
        }
    }
    Ok(PlanResult::with_changes(planned, diff.changes, false))
}

fn attribute_change(path: &str, before: &str, after: &str, sensitive: bool) -> AttributeChange {
    let side = |v: &str| (!v.is_empty()).then(|| display_value(v, sensitive));
    AttributeChange::new(path, side(before), side(after))
}

fn display_value(value: &str, sensitive: bool) -> Value {
    if sensitive {
        Value::String(SENSITIVE_PLACEHOLDER.to_string())
    } else {
        Value::String(value.to_string())
    }
}

fn scalar_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

fn is_count(path: &str) -> bool {
    path.ends_with(".#") || path.ends_with(".%")
}

fn join_path(base: &str, name: &str) -> String {
    if base.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", base, name)
    }
}
