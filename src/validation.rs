//! Schema validation helpers.
//!
//! Validates a configuration (`serde_json::Value`) against a [`Schema`] before
//! anything is sent to the remote service: types, required attributes, block
//! item counts, value validators and mutually exclusive attributes.
//!
//! # Example
//!
//! ```
//! use hemmer_provider_sharing::schema::{Attribute, Schema};
//! use hemmer_provider_sharing::validation::validate;
//! use serde_json::json;
//!
//! let schema = Schema::v0()
//!     .with_attribute("metastore_id", Attribute::optional_string().with_conflicts_with(["ip"]))
//!     .with_attribute("ip", Attribute::optional_string().with_conflicts_with(["metastore_id"]));
//!
//! assert!(validate(&schema, &json!({"ip": "10.0.0.1"})).is_empty());
//!
//! let diagnostics = validate(&schema, &json!({"ip": "10.0.0.1", "metastore_id": "aws:1"}));
//! assert_eq!(diagnostics.len(), 2);
//! assert_eq!(diagnostics[0].summary, "Conflicting configuration arguments");
//! ```

use serde_json::Value;

use crate::error::ProviderError;
use crate::schema::{
    Attribute, AttributeType, Block, BlockNestingMode, Diagnostic, DiagnosticSeverity, NestedBlock,
    Schema,
};

/// Validate a configuration against a schema.
///
/// Returns every problem found as an error [`Diagnostic`]; an empty vector
/// means the configuration is valid.
///
/// - Required attributes must be present and non-null
/// - Read-only attributes are skipped (the provider sets them)
/// - Attribute types must match the schema
/// - Attribute values must satisfy the attribute's validator
/// - A set attribute or block must not coexist with any of its `conflicts_with` paths
/// - Nested blocks are validated recursively with min/max item constraints
pub fn validate(schema: &Schema, value: &Value) -> Vec<Diagnostic> {
    let mut walker = Walker {
        root: value,
        schema: &schema.block,
        diagnostics: Vec::new(),
    };
    walker.block(&schema.block, value, "");
    walker.diagnostics
}

/// Validate a configuration, returning the diagnostics as the error.
pub fn validate_result(schema: &Schema, value: &Value) -> Result<(), Vec<Diagnostic>> {
    let diagnostics = validate(schema, value);
    if diagnostics.is_empty() {
        Ok(())
    } else {
        Err(diagnostics)
    }
}

/// Validate a configuration, folding error diagnostics into a single
/// [`ProviderError::Validation`].
///
/// Used where a configuration must be rejected before anything is sent to
/// the remote service.
pub fn validate_or_error(schema: &Schema, value: &Value) -> Result<(), ProviderError> {
    let errors: Vec<String> = validate(schema, value)
        .into_iter()
        .filter(|d| matches!(d.severity, DiagnosticSeverity::Error))
        .map(|d| match d.detail {
            Some(detail) => format!("{}: {}", d.summary, detail),
            None => d.summary,
        })
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ProviderError::Validation(errors.join("; ")))
    }
}

/// Whether a configuration is valid. Use [`validate`] for the reasons.
pub fn is_valid(schema: &Schema, value: &Value) -> bool {
    validate(schema, value).is_empty()
}

/// Walks a configuration alongside its schema, collecting diagnostics.
///
/// `root` and `schema` are kept for resolving absolute `conflicts_with` paths.
struct Walker<'v> {
    root: &'v Value,
    schema: &'v Block,
    diagnostics: Vec<Diagnostic>,
}

impl Walker<'_> {
    fn error(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    fn block(&mut self, block: &Block, value: &Value, path: &str) {
        let obj = match value {
            Value::Object(map) => map,
            Value::Null => return,
            other => {
                let mut diagnostic = Diagnostic::error("Expected object")
                    .with_detail(format!("Got {}", type_name(other)));
                if !path.is_empty() {
                    diagnostic = diagnostic.with_attribute(path);
                }
                self.error(diagnostic);
                return;
            },
        };

        for (name, attr) in &block.attributes {
            self.attribute(attr, obj.get(name), &join_path(path, name));
        }

        for (name, nested) in &block.blocks {
            let block_path = join_path(path, name);
            let block_value = obj.get(name).filter(|v| !v.is_null());
            if block_value.is_some() {
                self.conflicts(&nested.conflicts_with, &block_path);
            }
            self.nested_block(nested, block_value, &block_path);
        }
    }

    fn attribute(&mut self, attr: &Attribute, value: Option<&Value>, path: &str) {
        if attr.is_read_only() {
            return;
        }

        let Some(value) = value.filter(|v| !v.is_null()) else {
            if attr.flags.required {
                self.error(
                    Diagnostic::error(format!("Missing required attribute '{}'", path))
                        .with_detail("This attribute is required and must be provided")
                        .with_attribute(path),
                );
            }
            return;
        };

        let before = self.diagnostics.len();
        self.value_type(&attr.attr_type, value, path);
        if self.diagnostics.len() == before {
            if let Some(Err(detail)) = attr.validator.as_ref().map(|v| v.check(path, value)) {
                self.error(
                    Diagnostic::error(format!("Invalid value for attribute '{}'", path))
                        .with_detail(detail)
                        .with_attribute(path),
                );
            }
        }
        if is_set(value) {
            self.conflicts(&attr.conflicts_with, path);
        }
    }

    fn conflicts(&mut self, conflicts_with: &[String], path: &str) {
        for other in conflicts_with {
            let set = match lookup(self.root, other) {
                Some(v) if names_block(self.schema, other) => !v.is_null(),
                Some(v) => is_set(v),
                None => false,
            };
            if set {
                self.error(
                    Diagnostic::error("Conflicting configuration arguments")
                        .with_detail(format!("\"{}\": conflicts with {}", path, other))
                        .with_attribute(path),
                );
            }
        }
    }

    fn value_type(&mut self, attr_type: &AttributeType, value: &Value, path: &str) {
        let expected = match (attr_type, value) {
            (AttributeType::String, Value::String(_)) | (AttributeType::Bool, Value::Bool(_)) => {
                return;
            },
            (AttributeType::Int64, v) if is_int64(v) => return,
            (AttributeType::List(element), Value::Array(items)) => {
                for (i, item) in items.iter().enumerate() {
                    self.value_type(element, item, &format!("{}.{}", path, i));
                }
                return;
            },
            (AttributeType::Map(element), Value::Object(entries)) => {
                for (key, item) in entries {
                    self.value_type(element, item, &format!("{}.{}", path, key));
                }
                return;
            },
            (AttributeType::String, _) => "string",
            (AttributeType::Int64, _) => "int64",
            (AttributeType::Bool, _) => "bool",
            (AttributeType::List(_), _) => "list",
            (AttributeType::Map(_), _) => "map",
        };
        self.error(
            Diagnostic::error(format!("Invalid type for attribute '{}'", path))
                .with_detail(format!("Expected {}, got {}", expected, type_name(value)))
                .with_attribute(path),
        );
    }

    fn nested_block(&mut self, nested: &NestedBlock, value: Option<&Value>, path: &str) {
        match (nested.nesting_mode, value) {
            (_, None) => self.item_count(nested, 0, path),
            (BlockNestingMode::Single, Some(v)) => self.block(&nested.block, v, path),
            (BlockNestingMode::List, Some(Value::Array(items))) => {
                self.item_count(nested, items.len(), path);
                for (i, item) in items.iter().enumerate() {
                    self.block(&nested.block, item, &format!("{}.{}", path, i));
                }
            },
            (BlockNestingMode::List, Some(other)) => self.error(
                Diagnostic::error(format!("Expected list for block '{}'", path))
                    .with_detail(format!("Got {}", type_name(other)))
                    .with_attribute(path),
            ),
        }
    }

    /// `max_items` of zero means unlimited.
    fn item_count(&mut self, nested: &NestedBlock, len: usize, path: &str) {
        let len = len as u32;
        if len < nested.min_items {
            let summary = if len == 0 {
                format!("Block '{}' requires at least {} item(s)", path, nested.min_items)
            } else {
                format!(
                    "Block '{}' requires at least {} item(s), got {}",
                    path, nested.min_items, len
                )
            };
            self.error(Diagnostic::error(summary).with_attribute(path));
        }
        if nested.max_items > 0 && len > nested.max_items {
            self.error(
                Diagnostic::error(format!(
                    "Block '{}' allows at most {} item(s), got {}",
                    path, nested.max_items, len
                ))
                .with_attribute(path),
            );
        }
    }
}

/// Whether a configured attribute value counts as set: zero values do not.
/// Declared blocks always count, even when empty.
fn is_set(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
        _ => true,
    }
}

/// Whether an absolute dotted path ends at a nested block (or one of its
/// list items) rather than an attribute.
fn names_block(root: &Block, path: &str) -> bool {
    let mut current = root;
    let mut at_block = false;
    for segment in path.split('.') {
        if at_block && segment.parse::<usize>().is_ok() {
            continue;
        }
        match current.blocks.get(segment) {
            Some(nested) => {
                current = &nested.block;
                at_block = true;
            },
            None => return false,
        }
    }
    at_block
}

/// Resolve an absolute dotted path (`a.0.b`) against a configuration.
fn lookup<'v>(root: &'v Value, path: &str) -> Option<&'v Value> {
    path.split('.').try_fold(root, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

fn join_path(base: &str, name: &str) -> String {
    if base.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", base, name)
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Integers, including floats without a fractional part (`42.0`).
fn is_int64(value: &Value) -> bool {
    let Value::Number(n) = value else {
        return false;
    };
    n.is_i64()
        || n
            .as_f64()
            .is_some_and(|f| f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64)
}
