//! JSON encoding of values.
//!
//! Numbers keep full precision through serde_json's `arbitrary_precision`
//! feature. Decoding accepts the loose forms the orchestrator has
//! historically sent: numbers and bools for strings, strings for numbers,
//! and `"true"`/`"1"`/`1` style spellings for bools.

use std::collections::BTreeMap;

use serde_json::{Map as JsonMap, Value as JsonValue};

use super::{AttributePath, AttributePathStep, Number, Type, Value};
use crate::error::Error;

/// Options for JSON decoding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnmarshalOptions {
    /// Drop object attributes that the type does not declare instead of
    /// failing. Used when upgrading state written by an older schema.
    pub ignore_undefined_attributes: bool,
}

impl UnmarshalOptions {
    /// Options with undefined attributes silently dropped.
    pub fn ignoring_undefined_attributes() -> Self {
        Self {
            ignore_undefined_attributes: true,
        }
    }
}

/// Encode `value` as JSON, using `ty` as the declared type.
///
/// Unknown values have no JSON form and fail with [`Error::Encode`].
pub fn marshal_json(value: &Value, ty: &Type) -> Result<Vec<u8>, Error> {
    let mut path = AttributePath::new();
    let json = encode(value, ty, &mut path)?;
    serde_json::to_vec(&json).map_err(|e| Error::encode(&path, e.to_string()))
}

fn encode(value: &Value, ty: &Type, path: &mut AttributePath) -> Result<JsonValue, Error> {
    if ty.is_dynamic() && !value.ty().is_dynamic() {
        let mut wrapper = JsonMap::new();
        wrapper.insert("type".to_string(), value.ty().to_json_value());
        wrapper.insert("value".to_string(), encode(value, value.ty(), path)?);
        return Ok(JsonValue::Object(wrapper));
    }
    if !value.is_known() {
        return Err(Error::encode(path, "unknown values cannot be serialized to JSON"));
    }
    if value.is_null() {
        return Ok(JsonValue::Null);
    }
    if !value.ty().usable_as(ty) {
        return Err(Error::encode(
            path,
            format!("can't encode {} as {}", value.ty(), ty),
        ));
    }

    let json = match ty {
        Type::String => JsonValue::String(value.as_str().unwrap_or_default().to_string()),
        Type::Bool => JsonValue::Bool(value.as_bool().unwrap_or_default()),
        Type::Number => {
            let number = value
                .as_number()
                .ok_or_else(|| Error::encode(path, "number value without a number payload"))?;
            let json = number.to_json_number().ok_or_else(|| {
                Error::encode(path, format!("{} cannot be represented in JSON", number))
            })?;
            JsonValue::Number(json)
        }
        Type::List(element) | Type::Set(element) => {
            let is_set = matches!(ty, Type::Set(_));
            let elements = value.elements().unwrap_or_default();
            let mut out = Vec::with_capacity(elements.len());
            for (i, child) in elements.iter().enumerate() {
                path.push(if is_set {
                    AttributePathStep::ElementKeyValue(child.clone())
                } else {
                    AttributePathStep::ElementKeyInt(i as i64)
                });
                out.push(encode(child, element, path)?);
                path.pop();
            }
            JsonValue::Array(out)
        }
        Type::Tuple(types) => {
            let elements = value.elements().unwrap_or_default();
            if elements.len() != types.len() {
                return Err(Error::encode(
                    path,
                    format!(
                        "wrong number of tuple elements: expected {}, got {}",
                        types.len(),
                        elements.len()
                    ),
                ));
            }
            let mut out = Vec::with_capacity(elements.len());
            for (i, (child, child_ty)) in elements.iter().zip(types).enumerate() {
                path.push(AttributePathStep::ElementKeyInt(i as i64));
                out.push(encode(child, child_ty, path)?);
                path.pop();
            }
            JsonValue::Array(out)
        }
        Type::Map(element) => {
            let mut out = JsonMap::new();
            for (key, child) in value.attributes().into_iter().flatten() {
                path.push(AttributePathStep::ElementKeyString(key.clone()));
                out.insert(key.clone(), encode(child, element, path)?);
                path.pop();
            }
            JsonValue::Object(out)
        }
        Type::Object {
            attribute_types, ..
        } => {
            let attributes = value.attributes();
            let mut out = JsonMap::new();
            for (name, attribute_ty) in attribute_types {
                path.push(AttributePathStep::AttributeName(name.clone()));
                let child = attributes
                    .and_then(|attrs| attrs.get(name))
                    .ok_or_else(|| Error::encode(path, "attribute is missing from the value"))?;
                out.insert(name.clone(), encode(child, attribute_ty, path)?);
                path.pop();
            }
            JsonValue::Object(out)
        }
        Type::DynamicPseudoType => {
            return Err(Error::encode(
                path,
                "a value typed as DynamicPseudoType must be null",
            ))
        }
    };
    Ok(json)
}

/// Decode JSON `data` as a value of type `ty`.
pub fn unmarshal_json(data: &[u8], ty: &Type, options: &UnmarshalOptions) -> Result<Value, Error> {
    let json: JsonValue = serde_json::from_slice(data)
        .map_err(|e| Error::decode_value(&AttributePath::new(), format!("invalid JSON: {}", e)))?;
    let mut path = AttributePath::new();
    decode(&json, ty, &mut path, options)
}

fn kind(json: &JsonValue) -> &'static str {
    match json {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "bool",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}

fn unsupported(json: &JsonValue, ty: &Type, path: &AttributePath) -> Error {
    Error::decode_shape(
        path,
        format!("unsupported JSON {} for {}", kind(json), ty),
    )
}

fn decode(
    json: &JsonValue,
    ty: &Type,
    path: &mut AttributePath,
    options: &UnmarshalOptions,
) -> Result<Value, Error> {
    if json.is_null() {
        return Ok(Value::null(ty.clone()));
    }

    match ty {
        Type::DynamicPseudoType => decode_dynamic(json, path, options),
        Type::String => {
            let text = match json {
                JsonValue::String(s) => s.clone(),
                JsonValue::Number(n) => n.to_string(),
                JsonValue::Bool(b) => b.to_string(),
                other => return Err(unsupported(other, ty, path)),
            };
            Ok(Value::new(Type::String, text))
        }
        Type::Number => {
            let text = match json {
                JsonValue::Number(n) => n.to_string(),
                JsonValue::String(s) => s.clone(),
                other => return Err(unsupported(other, ty, path)),
            };
            let number: Number = text.parse().map_err(|err: Error| err.prefixed(path))?;
            Ok(Value::new(Type::Number, number))
        }
        Type::Bool => {
            let flag = match json {
                JsonValue::Bool(b) => *b,
                JsonValue::String(s) => parse_bool(s)
                    .ok_or_else(|| Error::decode_value(path, format!("invalid bool {:?}", s)))?,
                JsonValue::Number(n) => match n.to_string().as_str() {
                    "1" => true,
                    "0" => false,
                    other => {
                        return Err(Error::decode_value(
                            path,
                            format!("invalid bool {}", other),
                        ))
                    }
                },
                other => return Err(unsupported(other, ty, path)),
            };
            Ok(Value::new(Type::Bool, flag))
        }
        Type::List(element) | Type::Set(element) => {
            let JsonValue::Array(items) = json else {
                return Err(unsupported(json, ty, path));
            };
            let mut elements = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                path.push(AttributePathStep::ElementKeyInt(i as i64));
                elements.push(decode(item, element, path, options)?);
                path.pop();
            }
            Value::try_new(ty.clone(), elements).map_err(|err| err.into_decode_shape(path))
        }
        Type::Tuple(types) => {
            let JsonValue::Array(items) = json else {
                return Err(unsupported(json, ty, path));
            };
            if items.len() > types.len() {
                return Err(Error::decode_shape(
                    path,
                    format!("too many tuple elements: expected {}, got {}", types.len(), items.len()),
                ));
            }
            if items.len() < types.len() {
                return Err(Error::decode_shape(
                    path,
                    format!("not enough tuple elements: expected {}, got {}", types.len(), items.len()),
                ));
            }
            let mut elements = Vec::with_capacity(items.len());
            for (i, (item, item_ty)) in items.iter().zip(types).enumerate() {
                path.push(AttributePathStep::ElementKeyInt(i as i64));
                elements.push(decode(item, item_ty, path, options)?);
                path.pop();
            }
            Value::try_new(ty.clone(), elements).map_err(|err| err.into_decode_shape(path))
        }
        Type::Map(element) => {
            let JsonValue::Object(entries) = json else {
                return Err(unsupported(json, ty, path));
            };
            let mut out = BTreeMap::new();
            for (key, item) in entries {
                path.push(AttributePathStep::ElementKeyString(key.clone()));
                out.insert(key.clone(), decode(item, element, path, options)?);
                path.pop();
            }
            Value::try_new(ty.clone(), out).map_err(|err| err.into_decode_shape(path))
        }
        Type::Object {
            attribute_types, ..
        } => {
            let JsonValue::Object(entries) = json else {
                return Err(unsupported(json, ty, path));
            };
            let mut out = BTreeMap::new();
            for (name, item) in entries {
                path.push(AttributePathStep::AttributeName(name.clone()));
                let Some(attribute_ty) = attribute_types.get(name) else {
                    if options.ignore_undefined_attributes {
                        path.pop();
                        continue;
                    }
                    return Err(Error::decode_shape(path, "unsupported attribute"));
                };
                out.insert(name.clone(), decode(item, attribute_ty, path, options)?);
                path.pop();
            }
            for (name, attribute_ty) in attribute_types {
                out.entry(name.clone())
                    .or_insert_with(|| Value::null(attribute_ty.clone()));
            }
            Value::try_new(ty.clone(), out).map_err(|err| err.into_decode_shape(path))
        }
    }
}

fn parse_bool(text: &str) -> Option<bool> {
    match text {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}

fn decode_dynamic(
    json: &JsonValue,
    path: &mut AttributePath,
    options: &UnmarshalOptions,
) -> Result<Value, Error> {
    let JsonValue::Object(wrapper) = json else {
        return Err(Error::decode_shape(
            path,
            format!(
                "expected a {{\"type\", \"value\"}} object for a dynamic value, got JSON {}",
                kind(json)
            ),
        ));
    };
    if let Some(key) = wrapper.keys().find(|key| *key != "type" && *key != "value") {
        return Err(Error::decode_shape(
            path,
            format!("invalid key {:?} in dynamically-typed value", key),
        ));
    }
    let type_json = wrapper
        .get("type")
        .ok_or_else(|| Error::decode_shape(path, "missing type in dynamically-typed value"))?;
    let ty = Type::from_json_value(type_json).map_err(|err| err.prefixed(path))?;
    let value_json = wrapper
        .get("value")
        .ok_or_else(|| Error::decode_shape(path, "missing value in dynamically-typed value"))?;
    decode(value_json, &ty, path, options)
}

impl Value {
    /// Encode this value as JSON under the declared type `ty`.
    pub fn to_json(&self, ty: &Type) -> Result<Vec<u8>, Error> {
        marshal_json(self, ty)
    }

    /// Decode a JSON buffer as a value of type `ty`.
    pub fn from_json(data: &[u8], ty: &Type) -> Result<Value, Error> {
        unmarshal_json(data, ty, &UnmarshalOptions::default())
    }

    /// Decode a JSON buffer with explicit options.
    pub fn from_json_with_options(
        data: &[u8],
        ty: &Type,
        options: &UnmarshalOptions,
    ) -> Result<Value, Error> {
        unmarshal_json(data, ty, options)
    }
}
