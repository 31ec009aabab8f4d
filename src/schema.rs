//! Schema types for describing provider and resource structure.
//!
//! Schemas describe the shape of provider configuration, resources, data sources,
//! and the other surfaces a provider exposes. They are inert data until
//! [`Schema::value_type`] turns them into the [`Type`] that the wire values for
//! that surface must have.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::tftypes::Type;

/// How a description string should be rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StringKind {
    /// Plain text.
    #[default]
    Plain,
    /// Markdown.
    Markdown,
}

/// The type of an attribute: either a plain value type or a nested object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttributeType {
    /// A value of a single [`Type`].
    #[serde(rename = "type")]
    Flat(Type),
    /// A collection of nested attributes.
    #[serde(rename = "nested_type")]
    Nested(NestedObject),
}

impl From<Type> for AttributeType {
    fn from(ty: Type) -> Self {
        Self::Flat(ty)
    }
}

impl From<NestedObject> for AttributeType {
    fn from(object: NestedObject) -> Self {
        Self::Nested(object)
    }
}

/// Describes how an attribute can be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AttributeFlags {
    /// The attribute is required in configuration.
    #[serde(default)]
    pub required: bool,
    /// The attribute is optional in configuration.
    #[serde(default)]
    pub optional: bool,
    /// The attribute is computed by the provider (read-only).
    #[serde(default)]
    pub computed: bool,
    /// The attribute is sensitive and should be hidden in logs/UI.
    #[serde(default)]
    pub sensitive: bool,
    /// The attribute is accepted in configuration but never persisted to state.
    #[serde(default)]
    pub write_only: bool,
    /// The attribute is deprecated.
    #[serde(default)]
    pub deprecated: bool,
}

impl AttributeFlags {
    /// Create flags for a required attribute.
    pub fn required() -> Self {
        Self {
            required: true,
            ..Default::default()
        }
    }

    /// Create flags for an optional attribute.
    pub fn optional() -> Self {
        Self {
            optional: true,
            ..Default::default()
        }
    }

    /// Create flags for a computed attribute (read-only, set by provider).
    pub fn computed() -> Self {
        Self {
            computed: true,
            ..Default::default()
        }
    }

    /// Create flags for an optional+computed attribute (can be set, but has default from provider).
    pub fn optional_computed() -> Self {
        Self {
            optional: true,
            computed: true,
            ..Default::default()
        }
    }

    /// Mark the attribute as sensitive.
    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    /// Whether the attribute can only be set by the provider.
    pub fn is_computed_only(&self) -> bool {
        self.computed && !self.optional && !self.required
    }
}

/// Describes a single attribute in a schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    /// The type of the attribute.
    #[serde(flatten)]
    pub ty: AttributeType,
    /// Flags describing how the attribute can be used.
    #[serde(flatten)]
    pub flags: AttributeFlags,
    /// Human-readable description of the attribute.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// How the description is formatted.
    #[serde(default)]
    pub description_kind: StringKind,
}

impl Attribute {
    /// Create a new attribute with the given type and flags.
    pub fn new(ty: impl Into<AttributeType>, flags: AttributeFlags) -> Self {
        Self {
            ty: ty.into(),
            flags,
            description: None,
            description_kind: StringKind::Plain,
        }
    }

    /// Create a required string attribute.
    pub fn required_string() -> Self {
        Self::new(Type::String, AttributeFlags::required())
    }

    /// Create an optional string attribute.
    pub fn optional_string() -> Self {
        Self::new(Type::String, AttributeFlags::optional())
    }

    /// Create a computed string attribute.
    pub fn computed_string() -> Self {
        Self::new(Type::String, AttributeFlags::computed())
    }

    /// Create a required number attribute.
    pub fn required_number() -> Self {
        Self::new(Type::Number, AttributeFlags::required())
    }

    /// Create an optional number attribute.
    pub fn optional_number() -> Self {
        Self::new(Type::Number, AttributeFlags::optional())
    }

    /// Create a computed number attribute.
    pub fn computed_number() -> Self {
        Self::new(Type::Number, AttributeFlags::computed())
    }

    /// Create a required bool attribute.
    pub fn required_bool() -> Self {
        Self::new(Type::Bool, AttributeFlags::required())
    }

    /// Create an optional bool attribute.
    pub fn optional_bool() -> Self {
        Self::new(Type::Bool, AttributeFlags::optional())
    }

    /// Create a computed bool attribute.
    pub fn computed_bool() -> Self {
        Self::new(Type::Bool, AttributeFlags::computed())
    }

    /// Set the description for this attribute.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self.description_kind = StringKind::Plain;
        self
    }

    /// Set a markdown description for this attribute.
    pub fn with_markdown_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self.description_kind = StringKind::Markdown;
        self
    }

    /// Mark this attribute as sensitive.
    pub fn sensitive(mut self) -> Self {
        self.flags.sensitive = true;
        self
    }

    /// Mark this attribute as write-only.
    pub fn write_only(mut self) -> Self {
        self.flags.write_only = true;
        self
    }

    /// Mark this attribute as deprecated.
    pub fn deprecated(mut self) -> Self {
        self.flags.deprecated = true;
        self
    }

    /// The type of values held by this attribute.
    pub fn value_type(&self) -> Result<Type, Error> {
        match &self.ty {
            AttributeType::Flat(ty) => Ok(ty.clone()),
            AttributeType::Nested(object) => object.value_type(),
        }
    }
}

/// The nesting mode for a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BlockNestingMode {
    /// Unset nesting mode. Cannot be turned into a type.
    Invalid,
    /// A single nested block (at most one).
    #[default]
    Single,
    /// A list of nested blocks (zero or more, ordered).
    List,
    /// A set of nested blocks (zero or more, unordered, unique).
    Set,
    /// A map of nested blocks keyed by string.
    Map,
    /// A single block that is always present, even if none of its attributes are set.
    Group,
}

/// The nesting mode for a nested-object attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ObjectNestingMode {
    /// Unset nesting mode. Cannot be turned into a type.
    Invalid,
    /// A single nested object.
    #[default]
    Single,
    /// A list of nested objects.
    List,
    /// A set of nested objects.
    Set,
    /// A map of nested objects keyed by string.
    Map,
}

/// A nested block within a schema.
///
/// Blocks are used for complex nested structures that have their own
/// set of attributes (e.g., `ingress` blocks in a security group).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Block {
    /// The attributes within this block.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, Attribute>,
    /// Nested blocks within this block.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub blocks: BTreeMap<String, NestedBlock>,
    /// Human-readable description of the block.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// How the description is formatted.
    #[serde(default)]
    pub description_kind: StringKind,
    /// The block is deprecated.
    #[serde(default)]
    pub deprecated: bool,
}

impl Block {
    /// Create a new empty block.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an attribute to this block.
    pub fn with_attribute(mut self, name: impl Into<String>, attr: Attribute) -> Self {
        self.attributes.insert(name.into(), attr);
        self
    }

    /// Add a nested block to this block.
    pub fn with_block(mut self, name: impl Into<String>, block: NestedBlock) -> Self {
        self.blocks.insert(name.into(), block);
        self
    }

    /// Set the description for this block.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Mark this block as deprecated.
    pub fn deprecated(mut self) -> Self {
        self.deprecated = true;
        self
    }

    /// The object type of values conforming to this block.
    ///
    /// Every attribute and every nested block becomes one attribute of the
    /// object. Nested blocks are wrapped according to their nesting mode. A
    /// nested block may not share its name with an attribute.
    pub fn value_type(&self) -> Result<Type, Error> {
        let mut attribute_types = BTreeMap::new();
        for (name, attr) in &self.attributes {
            attribute_types.insert(name.clone(), attr.value_type()?);
        }
        for (name, block) in &self.blocks {
            if attribute_types.contains_key(name) {
                return Err(Error::NameConflict(name.clone()));
            }
            attribute_types.insert(name.clone(), block.value_type()?);
        }
        Ok(Type::object(attribute_types))
    }
}

/// A nested block with its nesting mode and constraints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NestedBlock {
    /// The block definition.
    pub block: Block,
    /// How the block is nested (single, list, set, map, group).
    #[serde(default)]
    pub nesting_mode: BlockNestingMode,
    /// Minimum number of blocks required.
    #[serde(default)]
    pub min_items: u32,
    /// Maximum number of blocks allowed (0 = unlimited).
    #[serde(default)]
    pub max_items: u32,
}

impl NestedBlock {
    fn with_mode(block: Block, nesting_mode: BlockNestingMode, max_items: u32) -> Self {
        Self {
            block,
            nesting_mode,
            min_items: 0,
            max_items,
        }
    }

    /// Create a single nested block (0 or 1 allowed).
    pub fn single(block: Block) -> Self {
        Self::with_mode(block, BlockNestingMode::Single, 1)
    }

    /// Create a group block, which is always present.
    pub fn group(block: Block) -> Self {
        Self::with_mode(block, BlockNestingMode::Group, 1)
    }

    /// Create a list of nested blocks.
    pub fn list(block: Block) -> Self {
        Self::with_mode(block, BlockNestingMode::List, 0)
    }

    /// Create a set of nested blocks.
    pub fn set(block: Block) -> Self {
        Self::with_mode(block, BlockNestingMode::Set, 0)
    }

    /// Create a map of nested blocks.
    pub fn map(block: Block) -> Self {
        Self::with_mode(block, BlockNestingMode::Map, 0)
    }

    /// Set the minimum number of blocks required.
    pub fn with_min_items(mut self, min: u32) -> Self {
        self.min_items = min;
        self
    }

    /// Set the maximum number of blocks allowed.
    pub fn with_max_items(mut self, max: u32) -> Self {
        self.max_items = max;
        self
    }

    /// The type of the attribute this block contributes to its parent.
    pub fn value_type(&self) -> Result<Type, Error> {
        let object = self.block.value_type()?;
        match self.nesting_mode {
            BlockNestingMode::Single | BlockNestingMode::Group => Ok(object),
            BlockNestingMode::List => Ok(Type::list(object)),
            BlockNestingMode::Set => Ok(Type::set(object)),
            BlockNestingMode::Map => Ok(Type::map(object)),
            BlockNestingMode::Invalid => {
                Err(Error::InvalidNestingMode(format!("{:?}", self.nesting_mode)))
            }
        }
    }
}

/// A set of attributes nested inside an attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct NestedObject {
    /// The nested attributes.
    #[serde(default)]
    pub attributes: BTreeMap<String, Attribute>,
    /// How the nested object is repeated.
    #[serde(default)]
    pub nesting_mode: ObjectNestingMode,
}

impl NestedObject {
    /// Create an empty nested object with the given nesting mode.
    pub fn new(nesting_mode: ObjectNestingMode) -> Self {
        Self {
            attributes: BTreeMap::new(),
            nesting_mode,
        }
    }

    /// Add an attribute to this nested object.
    pub fn with_attribute(mut self, name: impl Into<String>, attr: Attribute) -> Self {
        self.attributes.insert(name.into(), attr);
        self
    }

    /// The type of the attribute holding this nested object.
    pub fn value_type(&self) -> Result<Type, Error> {
        let mut attribute_types = BTreeMap::new();
        for (name, attr) in &self.attributes {
            attribute_types.insert(name.clone(), attr.value_type()?);
        }
        let object = Type::object(attribute_types);
        match self.nesting_mode {
            ObjectNestingMode::Single => Ok(object),
            ObjectNestingMode::List => Ok(Type::list(object)),
            ObjectNestingMode::Set => Ok(Type::set(object)),
            ObjectNestingMode::Map => Ok(Type::map(object)),
            ObjectNestingMode::Invalid => {
                Err(Error::InvalidNestingMode(format!("{:?}", self.nesting_mode)))
            }
        }
    }
}

/// Schema for a resource, data source, or any other configurable surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Schema {
    /// The version of this schema (for state upgrades).
    #[serde(default)]
    pub version: i64,
    /// The root block containing all attributes and nested blocks.
    #[serde(default)]
    pub block: Block,
}

impl Schema {
    /// Create a new schema with the given version.
    pub fn new(version: i64) -> Self {
        Self {
            version,
            block: Block::new(),
        }
    }

    /// Create a schema at version 0.
    pub fn v0() -> Self {
        Self::new(0)
    }

    /// Add an attribute to the schema.
    pub fn with_attribute(mut self, name: impl Into<String>, attr: Attribute) -> Self {
        self.block.attributes.insert(name.into(), attr);
        self
    }

    /// Add a nested block to the schema.
    pub fn with_block(mut self, name: impl Into<String>, block: NestedBlock) -> Self {
        self.block.blocks.insert(name.into(), block);
        self
    }

    /// Set the description of the root block.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.block.description = Some(description.into());
        self
    }

    /// The object type of values conforming to this schema.
    pub fn value_type(&self) -> Result<Type, Error> {
        self.block.value_type()
    }
}

/// One attribute of a resource identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityAttribute {
    /// Attribute name.
    pub name: String,
    /// Attribute type.
    #[serde(rename = "type")]
    pub ty: Type,
    /// Must be supplied when importing by identity.
    #[serde(default)]
    pub required_for_import: bool,
    /// May be supplied when importing by identity.
    #[serde(default)]
    pub optional_for_import: bool,
    /// Human-readable description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl IdentityAttribute {
    /// An attribute required for import.
    pub fn required_for_import(name: impl Into<String>, ty: Type) -> Self {
        Self {
            name: name.into(),
            ty,
            required_for_import: true,
            optional_for_import: false,
            description: None,
        }
    }

    /// An attribute optional for import.
    pub fn optional_for_import(name: impl Into<String>, ty: Type) -> Self {
        Self {
            name: name.into(),
            ty,
            required_for_import: false,
            optional_for_import: true,
            description: None,
        }
    }
}

/// Schema of the identity that uniquely addresses a resource instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct IdentitySchema {
    /// The version of this identity schema.
    #[serde(default)]
    pub version: i64,
    /// The identity attributes.
    #[serde(default)]
    pub attributes: Vec<IdentityAttribute>,
}

impl IdentitySchema {
    /// Create an empty identity schema with the given version.
    pub fn new(version: i64) -> Self {
        Self {
            version,
            attributes: Vec::new(),
        }
    }

    /// Add an attribute.
    pub fn with_attribute(mut self, attribute: IdentityAttribute) -> Self {
        self.attributes.push(attribute);
        self
    }

    /// The object type of identity values.
    pub fn value_type(&self) -> Result<Type, Error> {
        Ok(Type::object(
            self.attributes
                .iter()
                .map(|attr| (attr.name.clone(), attr.ty.clone())),
        ))
    }
}

/// One parameter of a provider function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionParameter {
    /// Parameter name.
    pub name: String,
    /// Parameter type.
    #[serde(rename = "type")]
    pub ty: Type,
    /// Whether null may be passed.
    #[serde(default)]
    pub allow_null_value: bool,
    /// Whether unknown values may be passed.
    #[serde(default)]
    pub allow_unknown_values: bool,
    /// Human-readable description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl FunctionParameter {
    /// A parameter that accepts neither null nor unknown values.
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        Self {
            name: name.into(),
            ty,
            allow_null_value: false,
            allow_unknown_values: false,
            description: None,
        }
    }

    /// Accept null.
    pub fn allow_null(mut self) -> Self {
        self.allow_null_value = true;
        self
    }

    /// Accept unknown values.
    pub fn allow_unknown(mut self) -> Self {
        self.allow_unknown_values = true;
        self
    }
}

/// Signature of a provider function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Function {
    /// Positional parameters.
    #[serde(default)]
    pub parameters: Vec<FunctionParameter>,
    /// Parameter that absorbs any remaining arguments.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variadic_parameter: Option<FunctionParameter>,
    /// Type of the result.
    pub return_type: Type,
    /// One-line summary.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Human-readable description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Set when the function is deprecated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deprecation_message: Option<String>,
}

impl Function {
    /// A function with no parameters returning `return_type`.
    pub fn new(return_type: Type) -> Self {
        Self {
            parameters: Vec::new(),
            variadic_parameter: None,
            return_type,
            summary: None,
            description: None,
            deprecation_message: None,
        }
    }

    /// Append a positional parameter.
    pub fn with_parameter(mut self, parameter: FunctionParameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    /// Set the variadic parameter.
    pub fn with_variadic_parameter(mut self, parameter: FunctionParameter) -> Self {
        self.variadic_parameter = Some(parameter);
        self
    }

    /// Set the summary.
    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    /// The parameter that receives the argument at `index`, if any.
    pub fn parameter_at(&self, index: usize) -> Option<&FunctionParameter> {
        self.parameters
            .get(index)
            .or(self.variadic_parameter.as_ref())
    }
}

/// Every schema a provider exposes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ProviderSchema {
    /// Schema for provider configuration.
    #[serde(default)]
    pub provider: Schema,
    /// Schema for per-module provider metadata.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_meta: Option<Schema>,
    /// Schemas for each resource type.
    #[serde(default)]
    pub resources: BTreeMap<String, Schema>,
    /// Schemas for each data source type.
    #[serde(default)]
    pub data_sources: BTreeMap<String, Schema>,
    /// Schemas for each ephemeral resource type.
    #[serde(default)]
    pub ephemeral_resources: BTreeMap<String, Schema>,
    /// Schemas for each list resource type.
    #[serde(default)]
    pub list_resources: BTreeMap<String, Schema>,
    /// Schemas for each action type.
    #[serde(default)]
    pub actions: BTreeMap<String, Schema>,
    /// Identity schemas, keyed by resource type.
    #[serde(default)]
    pub resource_identities: BTreeMap<String, IdentitySchema>,
    /// Function signatures.
    #[serde(default)]
    pub functions: BTreeMap<String, Function>,
}

impl ProviderSchema {
    /// Create a new empty provider schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the provider configuration schema.
    pub fn with_provider_config(mut self, schema: Schema) -> Self {
        self.provider = schema;
        self
    }

    /// Set the provider metadata schema.
    pub fn with_provider_meta(mut self, schema: Schema) -> Self {
        self.provider_meta = Some(schema);
        self
    }

    /// Add a resource schema.
    pub fn with_resource(mut self, name: impl Into<String>, schema: Schema) -> Self {
        self.resources.insert(name.into(), schema);
        self
    }

    /// Add a data source schema.
    pub fn with_data_source(mut self, name: impl Into<String>, schema: Schema) -> Self {
        self.data_sources.insert(name.into(), schema);
        self
    }

    /// Add an ephemeral resource schema.
    pub fn with_ephemeral_resource(mut self, name: impl Into<String>, schema: Schema) -> Self {
        self.ephemeral_resources.insert(name.into(), schema);
        self
    }

    /// Add a list resource schema.
    pub fn with_list_resource(mut self, name: impl Into<String>, schema: Schema) -> Self {
        self.list_resources.insert(name.into(), schema);
        self
    }

    /// Add an action schema.
    pub fn with_action(mut self, name: impl Into<String>, schema: Schema) -> Self {
        self.actions.insert(name.into(), schema);
        self
    }

    /// Add a resource identity schema.
    pub fn with_resource_identity(
        mut self,
        name: impl Into<String>,
        schema: IdentitySchema,
    ) -> Self {
        self.resource_identities.insert(name.into(), schema);
        self
    }

    /// Add a function.
    pub fn with_function(mut self, name: impl Into<String>, function: Function) -> Self {
        self.functions.insert(name.into(), function);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attribute_flags() {
        let required = AttributeFlags::required();
        assert!(required.required);
        assert!(!required.optional);
        assert!(!required.computed);

        let computed = AttributeFlags::computed();
        assert!(computed.is_computed_only());

        let optional_computed = AttributeFlags::optional_computed();
        assert!(optional_computed.optional);
        assert!(optional_computed.computed);
        assert!(!optional_computed.is_computed_only());

        let sensitive = AttributeFlags::required().sensitive();
        assert!(sensitive.sensitive);
    }

    #[test]
    fn test_attribute_builders() {
        let attr = Attribute::required_string()
            .with_markdown_description("A **test** attribute")
            .write_only()
            .deprecated();

        assert_eq!(attr.ty, AttributeType::Flat(Type::String));
        assert!(attr.flags.required);
        assert!(attr.flags.write_only);
        assert!(attr.flags.deprecated);
        assert_eq!(attr.description_kind, StringKind::Markdown);
    }

    #[test]
    fn test_block_name_conflict() {
        let block = Block::new()
            .with_attribute("network", Attribute::optional_string())
            .with_block(
                "network",
                NestedBlock::list(
                    Block::new().with_attribute("cidr", Attribute::required_string()),
                ),
            );
        assert_eq!(
            block.value_type(),
            Err(Error::NameConflict("network".to_string()))
        );

        let nested = Schema::v0().with_block("outer", NestedBlock::single(block));
        assert!(matches!(
            nested.value_type(),
            Err(Error::NameConflict(name)) if name == "network"
        ));
    }

    #[test]
    fn test_schema_value_type() {
        let schema = Schema::v0()
            .with_attribute("name", Attribute::required_string())
            .with_attribute(
                "tags",
                Attribute::new(Type::map(Type::String), AttributeFlags::optional()),
            )
            .with_block(
                "config",
                NestedBlock::single(
                    Block::new().with_attribute("enabled", Attribute::optional_bool()),
                ),
            )
            .with_block(
                "rule",
                NestedBlock::list(Block::new().with_attribute("port", Attribute::required_number())),
            );

        let enabled = Type::object([("enabled".to_string(), Type::Bool)]);
        let rule = Type::object([("port".to_string(), Type::Number)]);
        assert_eq!(
            schema.value_type().unwrap(),
            Type::object([
                ("config".to_string(), enabled),
                ("name".to_string(), Type::String),
                ("rule".to_string(), Type::list(rule)),
                ("tags".to_string(), Type::map(Type::String)),
            ])
        );
    }

    #[test]
    fn test_block_nesting_modes() {
        let inner = Block::new().with_attribute("x", Attribute::optional_string());
        let object = Type::object([("x".to_string(), Type::String)]);

        let cases = [
            (NestedBlock::single(inner.clone()), object.clone()),
            (NestedBlock::group(inner.clone()), object.clone()),
            (NestedBlock::list(inner.clone()), Type::list(object.clone())),
            (NestedBlock::set(inner.clone()), Type::set(object.clone())),
            (NestedBlock::map(inner.clone()), Type::map(object.clone())),
        ];
        for (block, expected) in cases {
            assert_eq!(block.value_type().unwrap(), expected);
        }
    }

    #[test]
    fn test_nested_object_attribute() {
        let nested = NestedObject::new(ObjectNestingMode::Set)
            .with_attribute("port", Attribute::required_number())
            .with_attribute("protocol", Attribute::optional_string());
        let attr = Attribute::new(nested, AttributeFlags::optional());

        assert_eq!(
            attr.value_type().unwrap(),
            Type::set(Type::object([
                ("port".to_string(), Type::Number),
                ("protocol".to_string(), Type::String),
            ]))
        );
    }

    #[test]
    fn test_invalid_nesting_mode() {
        let mut block = NestedBlock::list(Block::new());
        block.nesting_mode = BlockNestingMode::Invalid;
        let schema = Schema::v0().with_block("bad", block);
        assert!(matches!(
            schema.value_type(),
            Err(Error::InvalidNestingMode(_))
        ));

        let object = NestedObject::new(ObjectNestingMode::Invalid);
        let schema = Schema::v0().with_attribute(
            "bad",
            Attribute::new(object, AttributeFlags::optional()),
        );
        assert!(matches!(
            schema.value_type(),
            Err(Error::InvalidNestingMode(_))
        ));
    }

    #[test]
    fn test_identity_schema_value_type() {
        let identity = IdentitySchema::new(1)
            .with_attribute(IdentityAttribute::required_for_import("id", Type::String))
            .with_attribute(IdentityAttribute::optional_for_import("region", Type::String));

        assert_eq!(
            identity.value_type().unwrap(),
            Type::object([
                ("id".to_string(), Type::String),
                ("region".to_string(), Type::String),
            ])
        );
    }

    #[test]
    fn test_function_parameter_at() {
        let function = Function::new(Type::String)
            .with_parameter(FunctionParameter::new("sep", Type::String))
            .with_variadic_parameter(FunctionParameter::new("parts", Type::String).allow_null());

        assert_eq!(function.parameter_at(0).unwrap().name, "sep");
        assert_eq!(function.parameter_at(3).unwrap().name, "parts");
        assert!(Function::new(Type::Bool).parameter_at(0).is_none());
    }

    #[test]
    fn test_provider_schema() {
        let provider_schema = ProviderSchema::new()
            .with_provider_config(
                Schema::v0().with_attribute("api_key", Attribute::required_string().sensitive()),
            )
            .with_resource(
                "example_resource",
                Schema::v0()
                    .with_attribute("name", Attribute::required_string())
                    .with_attribute("id", Attribute::computed_string()),
            )
            .with_data_source(
                "example_data",
                Schema::v0().with_attribute("filter", Attribute::optional_string()),
            )
            .with_action("example_action", Schema::v0())
            .with_function("upper", Function::new(Type::String));

        assert!(provider_schema
            .provider
            .block
            .attributes
            .contains_key("api_key"));
        assert!(provider_schema.resources.contains_key("example_resource"));
        assert!(provider_schema.data_sources.contains_key("example_data"));
        assert!(provider_schema.actions.contains_key("example_action"));
        assert!(provider_schema.functions.contains_key("upper"));
    }

    #[test]
    fn test_schema_serde_shape() {
        let schema = Schema::v0()
            .with_attribute("name", Attribute::required_string())
            .with_block("rule", NestedBlock::set(Block::new()).with_max_items(3));

        let json = serde_json::to_value(&schema).unwrap();
        assert_eq!(json["block"]["attributes"]["name"]["type"], "string");
        assert_eq!(json["block"]["attributes"]["name"]["required"], true);
        assert_eq!(json["block"]["blocks"]["rule"]["nesting_mode"], "set");

        let parsed: Schema = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, schema);
    }
}
