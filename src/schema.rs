//! Declarative resource schemas.
//!
//! A schema is a per-field description of a resource: its type, whether it is
//! required, optional or read-only, whether changing it forces replacement,
//! how differences are compared, which fields exclude each other and which
//! values are accepted. Schemas are built once with the `with_*` builders and
//! only read afterwards by [`validation`](crate::validation) and
//! [`diff`](crate::diff).
//!
//! Only the serializable part of a schema (types, flags, constraints) survives
//! a round trip through serde; diff suppressors are code and are skipped.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Value type of an attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeType {
    /// UTF-8 text.
    String,
    /// Signed 64-bit integer (timestamps are epoch milliseconds).
    Int64,
    /// `true` or `false`.
    Bool,
    /// Ordered values of one element type.
    List(Box<AttributeType>),
    /// String-keyed values of one element type.
    Map(Box<AttributeType>),
}

impl AttributeType {
    /// `List` of `element`.
    pub fn list(element: AttributeType) -> Self {
        Self::List(Box::new(element))
    }

    /// `Map` of `element`.
    pub fn map(element: AttributeType) -> Self {
        Self::Map(Box::new(element))
    }
}

/// Who may set an attribute, and whether its value is secret.
///
/// An attribute that is `computed` but neither `required` nor `optional` is
/// read-only: only the provider writes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AttributeFlags {
    /// Must appear in configuration.
    pub required: bool,
    /// May appear in configuration.
    pub optional: bool,
    /// Filled in by the provider.
    pub computed: bool,
    /// Masked in plan output.
    pub sensitive: bool,
}

impl AttributeFlags {
    /// Flags of a required attribute.
    pub fn required() -> Self {
        Self {
            required: true,
            ..Self::default()
        }
    }

    /// Flags of an optional attribute.
    pub fn optional() -> Self {
        Self {
            optional: true,
            ..Self::default()
        }
    }

    /// Flags of a read-only attribute.
    pub fn computed() -> Self {
        Self {
            computed: true,
            ..Self::default()
        }
    }
}

/// Signature of a custom diff-suppression predicate: `(path, old, new)`.
pub type SuppressPredicate = fn(&str, &str, &str) -> bool;

/// A named custom diff-suppression predicate.
///
/// The name identifies the predicate in comparisons and debug output.
#[derive(Clone, Copy)]
pub struct SuppressFn {
    name: &'static str,
    predicate: SuppressPredicate,
}

impl SuppressFn {
    /// Wrap a predicate under the given name.
    pub const fn new(name: &'static str, predicate: SuppressPredicate) -> Self {
        Self { name, predicate }
    }

    /// The predicate's name.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for SuppressFn {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl fmt::Debug for SuppressFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SuppressFn").field(&self.name).finish()
    }
}

/// How a difference between the recorded and the configured value is judged.
///
/// A suppressor declared on a nested block applies to every flattened path
/// beneath that block.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum DiffSuppress {
    /// Every difference is reported.
    #[default]
    Never,
    /// No difference is ever reported.
    Always,
    /// Differences are ignored when the configured value is the zero value
    /// (`""`, `"0"` or `"false"`) while the recorded one is not, i.e. the
    /// server filled in a value the configuration leaves unset.
    WhenUnset,
    /// Values are compared case-insensitively.
    EqualFold,
    /// A custom predicate decides.
    Custom(SuppressFn),
}

impl DiffSuppress {
    /// Returns `true` if the change of `path` from `old` to `new` is not drift.
    pub fn suppresses(&self, path: &str, old: &str, new: &str) -> bool {
        match self {
            Self::Never => false,
            Self::Always => true,
            Self::WhenUnset => is_zero(new) && !is_zero(old),
            Self::EqualFold => old.to_lowercase() == new.to_lowercase(),
            Self::Custom(f) => (f.predicate)(path, old, new),
        }
    }
}

fn is_zero(value: &str) -> bool {
    matches!(value, "" | "0" | "false")
}

/// A constraint on the values an attribute accepts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ValueValidator {
    /// The value must be one of the listed strings.
    OneOf {
        /// The accepted values.
        values: Vec<String>,
        /// Whether the comparison ignores case.
        #[serde(default)]
        ignore_case: bool,
    },
}

impl ValueValidator {
    /// Accept exactly the given strings, compared case-sensitively.
    pub fn one_of<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::OneOf {
            values: values.into_iter().map(Into::into).collect(),
            ignore_case: false,
        }
    }

    /// Check a value, returning the reason it was rejected.
    pub fn check(&self, path: &str, value: &serde_json::Value) -> Result<(), String> {
        match self {
            Self::OneOf {
                values,
                ignore_case,
            } => {
                let Some(got) = value.as_str() else {
                    return Err(format!("expected type of {} to be string", path));
                };
                let accepted = values.iter().any(|v| {
                    if *ignore_case {
                        v.eq_ignore_ascii_case(got)
                    } else {
                        v == got
                    }
                });
                if accepted {
                    Ok(())
                } else {
                    Err(format!(
                        "expected {} to be one of {:?}, got {}",
                        path, values, got
                    ))
                }
            },
        }
    }
}

/// One field of a resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    /// Value type.
    #[serde(rename = "type")]
    pub attr_type: AttributeType,
    /// Usage flags.
    #[serde(flatten)]
    pub flags: AttributeFlags,
    /// Free-form documentation shown to users.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// A change to this field replaces the resource instead of updating it.
    #[serde(default)]
    pub force_new: bool,
    /// How differences in this attribute are judged.
    #[serde(skip)]
    pub diff_suppress: DiffSuppress,
    /// Absolute paths of attributes that may not be set together with this one.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conflicts_with: Vec<String>,
    /// Constraint on accepted values.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validator: Option<ValueValidator>,
}

impl Attribute {
    /// An attribute with no annotations beyond its type and flags.
    pub fn new(attr_type: AttributeType, flags: AttributeFlags) -> Self {
        Self {
            attr_type,
            flags,
            description: None,
            force_new: false,
            diff_suppress: DiffSuppress::Never,
            conflicts_with: Vec::new(),
            validator: None,
        }
    }

    /// Required string.
    pub fn required_string() -> Self {
        Self::new(AttributeType::String, AttributeFlags::required())
    }

    /// Optional string.
    pub fn optional_string() -> Self {
        Self::new(AttributeType::String, AttributeFlags::optional())
    }

    /// Read-only string.
    pub fn computed_string() -> Self {
        Self::new(AttributeType::String, AttributeFlags::computed())
    }

    /// Read-only int64.
    pub fn computed_int64() -> Self {
        Self::new(AttributeType::Int64, AttributeFlags::computed())
    }

    /// Read-only bool.
    pub fn computed_bool() -> Self {
        Self::new(AttributeType::Bool, AttributeFlags::computed())
    }

    /// Attach user-facing documentation.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Replace the resource whenever this field changes.
    pub fn with_force_new(mut self) -> Self {
        self.force_new = true;
        self
    }

    /// Mask the value in plan output.
    pub fn sensitive(mut self) -> Self {
        self.flags.sensitive = true;
        self
    }

    /// Set how differences in this attribute are judged.
    pub fn with_diff_suppress(mut self, suppress: DiffSuppress) -> Self {
        self.diff_suppress = suppress;
        self
    }

    /// Declare attributes that may not be set together with this one.
    pub fn with_conflicts_with<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.conflicts_with = paths.into_iter().map(Into::into).collect();
        self
    }

    /// Constrain the values this attribute accepts.
    pub fn with_validator(mut self, validator: ValueValidator) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Whether the attribute is set only by the provider.
    pub fn is_read_only(&self) -> bool {
        self.flags.computed && !self.flags.optional && !self.flags.required
    }
}

/// How many instances of a nested block may appear.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BlockNestingMode {
    /// At most one, written as an object.
    #[default]
    Single,
    /// Any number, written as an array.
    List,
}

/// A group of attributes and further blocks, such as a recipient's
/// `ip_access_list`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Block {
    #[allow(missing_docs)]
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub attributes: HashMap<String, Attribute>,
    #[allow(missing_docs)]
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub blocks: HashMap<String, NestedBlock>,
}

impl Block {
    /// An empty block.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an attribute.
    pub fn with_attribute(mut self, name: impl Into<String>, attr: Attribute) -> Self {
        self.attributes.insert(name.into(), attr);
        self
    }

    /// Add a nested block.
    pub fn with_block(mut self, name: impl Into<String>, block: NestedBlock) -> Self {
        self.blocks.insert(name.into(), block);
        self
    }
}

/// A block placed inside another, with its nesting and item constraints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NestedBlock {
    /// Contents of each instance.
    #[serde(flatten)]
    pub block: Block,
    /// Single or list.
    #[serde(default)]
    pub nesting_mode: BlockNestingMode,
    /// Fewest instances accepted.
    #[serde(default)]
    pub min_items: u32,
    /// Most instances accepted; zero means no limit.
    #[serde(default)]
    pub max_items: u32,
    /// The block is populated only by the provider.
    #[serde(default)]
    pub computed: bool,
    /// How differences anywhere beneath this block are judged.
    #[serde(skip)]
    pub diff_suppress: DiffSuppress,
    /// Absolute paths of attributes that may not be set together with this block.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conflicts_with: Vec<String>,
}

impl NestedBlock {
    fn with_mode(block: Block, nesting_mode: BlockNestingMode, max_items: u32) -> Self {
        Self {
            block,
            nesting_mode,
            min_items: 0,
            max_items,
            computed: false,
            diff_suppress: DiffSuppress::Never,
            conflicts_with: Vec::new(),
        }
    }

    /// Zero or one instance.
    pub fn single(block: Block) -> Self {
        Self::with_mode(block, BlockNestingMode::Single, 1)
    }

    /// Any number of instances.
    pub fn list(block: Block) -> Self {
        Self::with_mode(block, BlockNestingMode::List, 0)
    }

    #[allow(missing_docs)]
    pub fn with_min_items(mut self, min: u32) -> Self {
        self.min_items = min;
        self
    }

    #[allow(missing_docs)]
    pub fn with_max_items(mut self, max: u32) -> Self {
        self.max_items = max;
        self
    }

    /// Mark the block as populated only by the provider.
    pub fn computed(mut self) -> Self {
        self.computed = true;
        self
    }

    /// Set how differences beneath this block are judged.
    pub fn with_diff_suppress(mut self, suppress: DiffSuppress) -> Self {
        self.diff_suppress = suppress;
        self
    }

    /// Declare attributes that may not be set together with this block.
    pub fn with_conflicts_with<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.conflicts_with = paths.into_iter().map(Into::into).collect();
        self
    }
}

/// A versioned root block describing one resource type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    /// Bumped when the stored state shape changes.
    #[serde(default)]
    pub version: u64,
    /// Top-level attributes and blocks.
    #[serde(flatten)]
    pub block: Block,
}

impl Schema {
    /// An empty schema at `version`.
    pub fn new(version: u64) -> Self {
        Self {
            version,
            block: Block::new(),
        }
    }

    /// An empty schema at version 0.
    pub fn v0() -> Self {
        Self::new(0)
    }

    /// Add a top-level attribute.
    pub fn with_attribute(mut self, name: impl Into<String>, attr: Attribute) -> Self {
        self.block.attributes.insert(name.into(), attr);
        self
    }

    /// Add a top-level nested block.
    pub fn with_block(mut self, name: impl Into<String>, block: NestedBlock) -> Self {
        self.block.blocks.insert(name.into(), block);
        self
    }
}

impl Default for Schema {
    fn default() -> Self {
        Self::v0()
    }
}

/// Everything a host needs to know about a provider's shapes: its own
/// configuration and one schema per resource type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ProviderSchema {
    #[allow(missing_docs)]
    #[serde(default)]
    pub provider: Schema,
    /// Keyed by resource type name.
    #[serde(default)]
    pub resources: HashMap<String, Schema>,
}

impl ProviderSchema {
    #[allow(missing_docs)]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the provider configuration schema.
    pub fn with_provider_config(mut self, schema: Schema) -> Self {
        self.provider = schema;
        self
    }

    /// Register a resource type.
    pub fn with_resource(mut self, name: impl Into<String>, schema: Schema) -> Self {
        self.resources.insert(name.into(), schema);
        self
    }
}

#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticSeverity {
    Error,
    Warning,
}

/// A problem found in a configuration, optionally tied to an attribute path
/// such as `ip_access_list.0.allowed_ip_addresses`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    #[allow(missing_docs)]
    pub severity: DiagnosticSeverity,
    /// One-line description.
    pub summary: String,
    /// Longer explanation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// Dotted path of the offending attribute.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,
}

impl Diagnostic {
    fn with_severity(severity: DiagnosticSeverity, summary: impl Into<String>) -> Self {
        Self {
            severity,
            summary: summary.into(),
            detail: None,
            attribute: None,
        }
    }

    #[allow(missing_docs)]
    pub fn error(summary: impl Into<String>) -> Self {
        Self::with_severity(DiagnosticSeverity::Error, summary)
    }

    #[allow(missing_docs)]
    pub fn warning(summary: impl Into<String>) -> Self {
        Self::with_severity(DiagnosticSeverity::Warning, summary)
    }

    #[allow(missing_docs)]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Point the diagnostic at an attribute path.
    pub fn with_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.attribute = Some(attribute.into());
        self
    }
}
