//! Schema validation helpers.
//!
//! Decoding a configuration against [`Schema::value_type`] already guarantees
//! its shape. This module checks what the type system cannot: required
//! attributes that are null, computed-only attributes set by the user, block
//! item counts, and use of deprecated attributes. Unknown values are skipped,
//! since they may still become valid once known.
//!
//! # Example
//!
//! ```
//! use hemmer_plugin_protocol::schema::{Attribute, Schema};
//! use hemmer_plugin_protocol::validation::validate;
//! use hemmer_plugin_protocol::{AttributePath, Type, Value};
//! use std::collections::BTreeMap;
//!
//! let schema = Schema::v0()
//!     .with_attribute("name", Attribute::required_string())
//!     .with_attribute("count", Attribute::optional_number());
//! let ty = schema.value_type().unwrap();
//!
//! let config = Value::new(ty.clone(), BTreeMap::from([
//!     ("name".to_string(), Value::from("test")),
//!     ("count".to_string(), Value::from(42_i64)),
//! ]));
//! assert!(validate(&schema, &config).is_empty());
//!
//! let config = Value::new(ty, BTreeMap::from([
//!     ("name".to_string(), Value::null(Type::String)),
//!     ("count".to_string(), Value::null(Type::Number)),
//! ]));
//! let diagnostics = validate(&schema, &config);
//! assert_eq!(diagnostics.len(), 1);
//! assert_eq!(
//!     diagnostics[0].attribute,
//!     Some(AttributePath::new().with_attribute_name("name"))
//! );
//! ```

use std::collections::BTreeMap;

use crate::diagnostic::{has_errors, Diagnostic};
use crate::schema::{Attribute, AttributeType, Block, BlockNestingMode, NestedBlock, Schema};
use crate::tftypes::{AttributePath, Type, Value};

/// Validate a configuration value against a schema.
///
/// Returns a list of diagnostics for any validation errors found.
/// An empty list means the value is valid.
///
/// # Validation Rules
///
/// - The value must have the schema's object type
/// - Required attributes must be non-null
/// - Computed-only attributes must be null (provider sets these)
/// - Setting a deprecated attribute produces a warning
/// - Nested blocks are validated recursively with min/max item constraints
pub fn validate(schema: &Schema, value: &Value) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    match schema.value_type() {
        Ok(expected) if &expected != value.ty() => {
            diagnostics.push(
                Diagnostic::error("Value does not match schema")
                    .with_detail(format!("Expected {}, got {}", expected, value.ty())),
            );
        }
        Ok(_) => validate_block(&schema.block, value, &AttributePath::new(), &mut diagnostics),
        Err(err) => diagnostics.push(Diagnostic::from(err)),
    }
    diagnostics
}

/// Validate a value against a schema, returning Ok if valid or Err with diagnostics.
///
/// Warnings alone do not fail validation.
pub fn validate_result(schema: &Schema, value: &Value) -> Result<Vec<Diagnostic>, Vec<Diagnostic>> {
    let diagnostics = validate(schema, value);
    if has_errors(&diagnostics) {
        Err(diagnostics)
    } else {
        Ok(diagnostics)
    }
}

/// Check if a value is valid against a schema.
///
/// Returns `true` if no error diagnostics were produced.
/// Use [`validate`] to get detailed error information.
pub fn is_valid(schema: &Schema, value: &Value) -> bool {
    !has_errors(&validate(schema, value))
}

fn validate_block(
    block: &Block,
    value: &Value,
    path: &AttributePath,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let Some(attributes) = value.attributes() else {
        return;
    };
    validate_attributes(&block.attributes, attributes, path, diagnostics);

    for (name, nested) in &block.blocks {
        let block_path = path.with_attribute_name(name);
        if let Some(block_value) = attributes.get(name) {
            validate_nested_block(nested, block_value, &block_path, diagnostics);
        }
    }
}

fn validate_attributes(
    declared: &BTreeMap<String, Attribute>,
    values: &BTreeMap<String, Value>,
    path: &AttributePath,
    diagnostics: &mut Vec<Diagnostic>,
) {
    for (name, attr) in declared {
        let attr_path = path.with_attribute_name(name);
        match values.get(name) {
            Some(value) => validate_attribute(attr, value, &attr_path, diagnostics),
            None if attr.flags.required => diagnostics.push(missing_attribute(&attr_path)),
            None => {}
        }
    }
}

fn validate_attribute(
    attr: &Attribute,
    value: &Value,
    path: &AttributePath,
    diagnostics: &mut Vec<Diagnostic>,
) {
    if !value.is_known() {
        return;
    }

    if value.is_null() {
        if attr.flags.required {
            diagnostics.push(missing_attribute(path));
        }
        return;
    }

    if attr.flags.is_computed_only() {
        diagnostics.push(
            Diagnostic::error(format!("Value for unconfigurable attribute '{}'", path))
                .with_detail("This attribute is computed by the provider and cannot be set")
                .with_attribute(path.clone()),
        );
        return;
    }

    if attr.flags.deprecated {
        diagnostics.push(
            Diagnostic::warning(format!("Deprecated attribute '{}'", path))
                .with_detail("This attribute is deprecated and may be removed in a future version")
                .with_attribute(path.clone()),
        );
    }

    if let AttributeType::Nested(object) = &attr.ty {
        let mut validate_object = |item: &Value, item_path: &AttributePath| {
            if let Some(values) = item.attributes() {
                validate_attributes(&object.attributes, values, item_path, diagnostics);
            }
        };
        for_each_item(value, path, &mut validate_object);
    }
}

fn validate_nested_block(
    nested: &NestedBlock,
    value: &Value,
    path: &AttributePath,
    diagnostics: &mut Vec<Diagnostic>,
) {
    if !value.is_known() {
        return;
    }

    match nested.nesting_mode {
        BlockNestingMode::Single | BlockNestingMode::Group => {
            if value.is_null() {
                if nested.min_items > 0 {
                    diagnostics.push(
                        Diagnostic::error(format!("Missing required block '{}'", path))
                            .with_detail("At least one block is required")
                            .with_attribute(path.clone()),
                    );
                }
                return;
            }
            validate_block(&nested.block, value, path, diagnostics);
        }
        BlockNestingMode::List | BlockNestingMode::Set | BlockNestingMode::Map => {
            let len = if value.is_null() {
                0
            } else {
                value
                    .elements()
                    .map(<[Value]>::len)
                    .or_else(|| value.attributes().map(BTreeMap::len))
                    .unwrap_or(0)
            };
            check_item_count(nested, len, path, diagnostics);

            let mut validate_item = |item: &Value, item_path: &AttributePath| {
                validate_block(&nested.block, item, item_path, diagnostics);
            };
            for_each_item(value, path, &mut validate_item);
        }
        BlockNestingMode::Invalid => {}
    }
}

fn check_item_count(
    nested: &NestedBlock,
    len: usize,
    path: &AttributePath,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let min = nested.min_items as usize;
    let max = nested.max_items as usize;

    if len < min {
        diagnostics.push(
            Diagnostic::error(format!(
                "Block '{}' requires at least {} item(s), got {}",
                path, min, len
            ))
            .with_attribute(path.clone()),
        );
    }

    // 0 means unlimited
    if max > 0 && len > max {
        diagnostics.push(
            Diagnostic::error(format!(
                "Block '{}' allows at most {} item(s), got {}",
                path, max, len
            ))
            .with_attribute(path.clone()),
        );
    }
}

/// Call `f` on each known item of a single, list, set, or map value.
fn for_each_item(value: &Value, path: &AttributePath, f: &mut dyn FnMut(&Value, &AttributePath)) {
    if !value.is_known() || value.is_null() {
        return;
    }

    if let Some(elements) = value.elements() {
        let is_set = matches!(value.ty(), Type::Set(_));
        for (i, item) in elements.iter().enumerate() {
            let item_path = if is_set {
                path.with_element_key_value(item.clone())
            } else {
                path.with_element_key_int(i as i64)
            };
            if item.is_known() {
                f(item, &item_path);
            }
        }
        return;
    }

    match value.ty() {
        Type::Map(_) => {
            if let Some(entries) = value.attributes() {
                for (key, item) in entries {
                    if item.is_known() {
                        f(item, &path.with_element_key_string(key));
                    }
                }
            }
        }
        _ => f(value, path),
    }
}

fn missing_attribute(path: &AttributePath) -> Diagnostic {
    Diagnostic::error(format!("Missing required attribute '{}'", path))
        .with_detail("This attribute is required and must be provided")
        .with_attribute(path.clone())
}
