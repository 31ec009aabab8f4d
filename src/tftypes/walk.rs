//! Pre-order walking and post-order transformation of values.

use std::collections::BTreeMap;

use super::{AttributePath, AttributePathStep, Type, Value, ValuePayload};
use crate::error::Error;

/// Visit `value` and its descendants depth-first, parents before children.
///
/// The callback returns `Ok(false)` to skip the children of the node it was
/// given. Object and map entries are visited in key order; list, tuple, and
/// set elements in stored order.
pub fn walk<F>(value: &Value, mut callback: F) -> Result<(), Error>
where
    F: FnMut(&AttributePath, &Value) -> Result<bool, Error>,
{
    let mut path = AttributePath::new();
    walk_node(&mut path, value, &mut callback)
}

fn walk_node<F>(path: &mut AttributePath, value: &Value, callback: &mut F) -> Result<(), Error>
where
    F: FnMut(&AttributePath, &Value) -> Result<bool, Error>,
{
    if !callback(path, value)? {
        return Ok(());
    }
    match value.payload() {
        ValuePayload::Elements(elements) => {
            let is_set = matches!(value.ty(), Type::Set(_));
            for (i, element) in elements.iter().enumerate() {
                path.push(element_step(is_set, i, element));
                let result = walk_node(path, element, callback);
                path.pop();
                result?;
            }
        }
        ValuePayload::Attributes(attributes) => {
            let is_object = matches!(value.ty(), Type::Object { .. });
            for (name, child) in attributes {
                path.push(attribute_step(is_object, name));
                let result = walk_node(path, child, callback);
                path.pop();
                result?;
            }
        }
        _ => {}
    }
    Ok(())
}

/// Rebuild `value` bottom-up, children before parents.
///
/// Each composite is reassembled from its transformed children and then
/// handed to the callback at its own path; whatever the callback returns
/// takes its place. Reassembly re-validates the composite, so a callback
/// that changes a child's type to one the parent does not allow fails with
/// a [`Error::TypeMismatch`] at the parent.
pub fn transform<F>(value: Value, mut callback: F) -> Result<Value, Error>
where
    F: FnMut(&AttributePath, Value) -> Result<Value, Error>,
{
    let mut path = AttributePath::new();
    transform_node(&mut path, value, &mut callback)
}

fn transform_node<F>(path: &mut AttributePath, value: Value, callback: &mut F) -> Result<Value, Error>
where
    F: FnMut(&AttributePath, Value) -> Result<Value, Error>,
{
    let (ty, payload) = value.into_parts();
    let rebuilt = match payload {
        ValuePayload::Elements(elements) => {
            let is_set = matches!(ty, Type::Set(_));
            let mut out = Vec::with_capacity(elements.len());
            for (i, element) in elements.into_iter().enumerate() {
                path.push(element_step(is_set, i, &element));
                let result = transform_node(path, element, callback);
                path.pop();
                out.push(result?);
            }
            Value::try_new(ty, out).map_err(|err| err.prefixed(path))?
        }
        ValuePayload::Attributes(attributes) => {
            let is_object = matches!(ty, Type::Object { .. });
            let mut out = BTreeMap::new();
            for (name, child) in attributes {
                path.push(attribute_step(is_object, &name));
                let result = transform_node(path, child, callback);
                path.pop();
                out.insert(name, result?);
            }
            Value::try_new(ty, out).map_err(|err| err.prefixed(path))?
        }
        payload => Value::try_new(ty, payload).map_err(|err| err.prefixed(path))?,
    };
    callback(path, rebuilt)
}

fn element_step(is_set: bool, index: usize, element: &Value) -> AttributePathStep {
    if is_set {
        AttributePathStep::ElementKeyValue(element.clone())
    } else {
        AttributePathStep::ElementKeyInt(index as i64)
    }
}

fn attribute_step(is_object: bool, name: &str) -> AttributePathStep {
    if is_object {
        AttributePathStep::AttributeName(name.to_string())
    } else {
        AttributePathStep::ElementKeyString(name.to_string())
    }
}

impl Value {
    /// Walk this value; see [`walk`].
    pub fn walk<F>(&self, callback: F) -> Result<(), Error>
    where
        F: FnMut(&AttributePath, &Value) -> Result<bool, Error>,
    {
        walk(self, callback)
    }

    /// Transform this value; see [`transform`].
    pub fn transform<F>(self, callback: F) -> Result<Value, Error>
    where
        F: FnMut(&AttributePath, Value) -> Result<Value, Error>,
    {
        transform(self, callback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Value {
        Value::object([
            (
                "b".to_string(),
                Value::list(Type::String, vec![Value::from("x"), Value::from("y")]),
            ),
            ("a".to_string(), Value::from(true)),
            (
                "c".to_string(),
                Value::map(Type::Bool, [("k".to_string(), Value::from(false))]),
            ),
        ])
    }

    #[test]
    fn test_walk_visits_pre_order_in_key_order() {
        let mut visited = Vec::new();
        sample()
            .walk(|path, _| {
                visited.push(path.to_string());
                Ok(true)
            })
            .unwrap();
        assert_eq!(
            visited,
            vec![
                "",
                "AttributeName(\"a\")",
                "AttributeName(\"b\")",
                "AttributeName(\"b\").ElementKeyInt(0)",
                "AttributeName(\"b\").ElementKeyInt(1)",
                "AttributeName(\"c\")",
                "AttributeName(\"c\").ElementKeyString(\"k\")",
            ]
        );
    }

    #[test]
    fn test_walk_skips_children_on_false() {
        let mut count = 0;
        sample()
            .walk(|path, _| {
                count += 1;
                Ok(path.to_string() != "AttributeName(\"b\")")
            })
            .unwrap();
        // root, a, b (children skipped), c, c.k
        assert_eq!(count, 5);
    }

    #[test]
    fn test_walk_propagates_errors() {
        let result = sample().walk(|path, _| {
            if path.len() == 2 {
                Err(Error::type_mismatch(path, "stop here"))
            } else {
                Ok(true)
            }
        });
        let err = result.unwrap_err();
        assert_eq!(
            err.path(),
            Some(
                &AttributePath::new()
                    .with_attribute_name("b")
                    .with_element_key_int(0)
            )
        );
    }

    #[test]
    fn test_walk_set_uses_value_keys() {
        let value = Value::set(Type::Bool, vec![Value::from(true)]);
        let mut paths = Vec::new();
        value
            .walk(|path, _| {
                paths.push(path.clone());
                Ok(true)
            })
            .unwrap();
        assert_eq!(
            paths[1],
            AttributePath::new().with_element_key_value(Value::from(true))
        );
    }

    #[test]
    fn test_transform_identity() {
        let value = Value::object([
            ("list".to_string(), sample()),
            (
                "set".to_string(),
                Value::set(Type::Number, vec![Value::from(1_i64), Value::from(2_i64)]),
            ),
            ("unknown".to_string(), Value::unknown(Type::String)),
            ("null".to_string(), Value::null(Type::map(Type::Bool))),
        ]);
        let out = value.clone().transform(|_, v| Ok(v)).unwrap();
        assert_eq!(out, value);
    }

    #[test]
    fn test_transform_is_post_order() {
        let mut order = Vec::new();
        sample()
            .transform(|path, v| {
                order.push(path.to_string());
                Ok(v)
            })
            .unwrap();
        assert_eq!(order.last().map(String::as_str), Some(""));
        assert_eq!(order[0], "AttributeName(\"a\")");
        assert!(
            order.iter().position(|p| p == "AttributeName(\"b\").ElementKeyInt(1)")
                < order.iter().position(|p| p == "AttributeName(\"b\")")
        );
    }

    #[test]
    fn test_transform_rewrites_leaves() {
        let out = sample()
            .transform(|_, v| match v.as_str() {
                Some(s) => Ok(Value::from(s.to_uppercase())),
                None => Ok(v),
            })
            .unwrap();
        let b = out.get("b").unwrap().elements().unwrap();
        assert_eq!(b[0], Value::from("X"));
        assert_eq!(b[1], Value::from("Y"));
    }

    #[test]
    fn test_transform_rejects_type_change_under_parent() {
        let value = Value::list(Type::String, vec![Value::from("a")]);
        let err = value
            .transform(|path, v| {
                if path.is_empty() {
                    Ok(v)
                } else {
                    Ok(Value::from(true))
                }
            })
            .unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }));
    }
}
