//! The type algebra shared by values, schemas, and codecs.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value as JsonValue;

use super::AttributePath;
use crate::error::Error;

/// The type of a [`Value`](super::Value).
///
/// Primitive types are unit variants; collection types carry their element
/// type; tuples and objects carry their member types.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    /// UTF-8 text.
    String,
    /// Arbitrary-precision number.
    Number,
    /// Boolean.
    Bool,
    /// Placeholder meaning "any type"; values at such a position carry
    /// their concrete type on the wire.
    DynamicPseudoType,
    /// Ordered, homogeneous elements.
    List(Box<Type>),
    /// Unordered, homogeneous, duplicate-free elements.
    Set(Box<Type>),
    /// String-keyed, homogeneous elements.
    Map(Box<Type>),
    /// Fixed-length, heterogeneous elements.
    Tuple(Vec<Type>),
    /// Named, heterogeneous attributes.
    Object {
        /// The type of each attribute.
        attribute_types: BTreeMap<String, Type>,
        /// Attributes that may be omitted when building a value; they are
        /// filled with null.
        optional_attributes: BTreeSet<String>,
    },
}

impl Type {
    /// `List[element]`.
    pub fn list(element: Type) -> Self {
        Self::List(Box::new(element))
    }

    /// `Set[element]`.
    pub fn set(element: Type) -> Self {
        Self::Set(Box::new(element))
    }

    /// `Map[element]`.
    pub fn map(element: Type) -> Self {
        Self::Map(Box::new(element))
    }

    /// `Tuple[elements...]`.
    pub fn tuple(elements: Vec<Type>) -> Self {
        Self::Tuple(elements)
    }

    /// An object type with every attribute required.
    pub fn object<I>(attribute_types: I) -> Self
    where
        I: IntoIterator<Item = (String, Type)>,
    {
        Self::Object {
            attribute_types: attribute_types.into_iter().collect(),
            optional_attributes: BTreeSet::new(),
        }
    }

    /// An object type where the attributes named in `optional` may be omitted.
    pub fn object_with_optional<I, O>(attribute_types: I, optional: O) -> Self
    where
        I: IntoIterator<Item = (String, Type)>,
        O: IntoIterator<Item = String>,
    {
        Self::Object {
            attribute_types: attribute_types.into_iter().collect(),
            optional_attributes: optional.into_iter().collect(),
        }
    }

    /// Whether `self` and `other` are the same kind of type, ignoring
    /// element and attribute types.
    pub fn is(&self, other: &Type) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }

    /// Whether this is the dynamic pseudo-type.
    pub fn is_dynamic(&self) -> bool {
        matches!(self, Self::DynamicPseudoType)
    }

    /// Whether this is a string, number, or bool.
    pub fn is_primitive(&self) -> bool {
        matches!(self, Self::String | Self::Number | Self::Bool)
    }

    /// The element type of a list, set, or map.
    pub fn element_type(&self) -> Option<&Type> {
        match self {
            Self::List(element) | Self::Set(element) | Self::Map(element) => Some(element),
            _ => None,
        }
    }

    /// Whether this type contains the dynamic pseudo-type anywhere.
    pub fn contains_dynamic(&self) -> bool {
        match self {
            Self::DynamicPseudoType => true,
            Self::List(element) | Self::Set(element) | Self::Map(element) => {
                element.contains_dynamic()
            }
            Self::Tuple(elements) => elements.iter().any(Type::contains_dynamic),
            Self::Object {
                attribute_types, ..
            } => attribute_types.values().any(Type::contains_dynamic),
            _ => false,
        }
    }

    /// Whether a value of this type may be used where `target` is expected.
    ///
    /// Exact equality, or `target` is dynamic, or both are the same kind of
    /// composite whose members are recursively usable.
    pub fn usable_as(&self, target: &Type) -> bool {
        if target.is_dynamic() {
            return true;
        }
        match (self, target) {
            (Self::List(a), Self::List(b))
            | (Self::Set(a), Self::Set(b))
            | (Self::Map(a), Self::Map(b)) => a.usable_as(b),
            (Self::Tuple(a), Self::Tuple(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(a, b)| a.usable_as(b))
            }
            (
                Self::Object {
                    attribute_types: a, ..
                },
                Self::Object {
                    attribute_types: b, ..
                },
            ) => {
                a.len() == b.len()
                    && a.iter().all(|(name, ty)| match b.get(name) {
                        Some(target) => ty.usable_as(target),
                        None => false,
                    })
            }
            _ => self == target,
        }
    }

    /// The JSON type description used on the wire.
    pub fn to_json_value(&self) -> JsonValue {
        match self {
            Self::String => JsonValue::from("string"),
            Self::Number => JsonValue::from("number"),
            Self::Bool => JsonValue::from("bool"),
            Self::DynamicPseudoType => JsonValue::from("dynamic"),
            Self::List(element) => JsonValue::Array(vec!["list".into(), element.to_json_value()]),
            Self::Set(element) => JsonValue::Array(vec!["set".into(), element.to_json_value()]),
            Self::Map(element) => JsonValue::Array(vec!["map".into(), element.to_json_value()]),
            Self::Tuple(elements) => JsonValue::Array(vec![
                "tuple".into(),
                JsonValue::Array(elements.iter().map(Type::to_json_value).collect()),
            ]),
            Self::Object {
                attribute_types,
                optional_attributes,
            } => {
                let attrs = attribute_types
                    .iter()
                    .map(|(name, ty)| (name.clone(), ty.to_json_value()))
                    .collect::<serde_json::Map<_, _>>();
                let mut out = vec!["object".into(), JsonValue::Object(attrs)];
                if !optional_attributes.is_empty() {
                    out.push(JsonValue::Array(
                        optional_attributes
                            .iter()
                            .map(|name| JsonValue::from(name.as_str()))
                            .collect(),
                    ));
                }
                JsonValue::Array(out)
            }
        }
    }

    /// The JSON type description as compact bytes.
    pub fn to_json_bytes(&self) -> Vec<u8> {
        self.to_json_value().to_string().into_bytes()
    }

    /// Parse a JSON type description.
    pub fn from_json_value(json: &JsonValue) -> Result<Self, Error> {
        match json {
            JsonValue::String(name) => match name.as_str() {
                "string" => Ok(Self::String),
                "number" => Ok(Self::Number),
                "bool" => Ok(Self::Bool),
                "dynamic" => Ok(Self::DynamicPseudoType),
                other => Err(Error::UnknownType(format!("{:?}", other))),
            },
            JsonValue::Array(parts) => {
                let tag = parts.first().and_then(JsonValue::as_str).ok_or_else(|| {
                    malformed("composite type descriptions start with a string tag")
                })?;
                match (tag, &parts[1..]) {
                    ("list", [element]) => Ok(Self::list(Self::from_json_value(element)?)),
                    ("set", [element]) => Ok(Self::set(Self::from_json_value(element)?)),
                    ("map", [element]) => Ok(Self::map(Self::from_json_value(element)?)),
                    ("tuple", [JsonValue::Array(elements)]) => Ok(Self::Tuple(
                        elements
                            .iter()
                            .map(Self::from_json_value)
                            .collect::<Result<_, _>>()?,
                    )),
                    ("object", [JsonValue::Object(attrs), rest @ ..]) if rest.len() <= 1 => {
                        let attribute_types = attrs
                            .iter()
                            .map(|(name, ty)| Ok((name.clone(), Self::from_json_value(ty)?)))
                            .collect::<Result<BTreeMap<_, _>, Error>>()?;
                        let optional_attributes = match rest.first() {
                            None => BTreeSet::new(),
                            Some(JsonValue::Array(names)) => names
                                .iter()
                                .map(|name| {
                                    name.as_str().map(str::to_string).ok_or_else(|| {
                                        malformed("optional attribute names must be strings")
                                    })
                                })
                                .collect::<Result<_, _>>()?,
                            Some(_) => {
                                return Err(malformed(
                                    "optional attributes must be a list of names",
                                ))
                            }
                        };
                        if let Some(name) = optional_attributes
                            .iter()
                            .find(|name| !attribute_types.contains_key(*name))
                        {
                            return Err(malformed(format!(
                                "optional attribute {:?} is not declared",
                                name
                            )));
                        }
                        Ok(Self::Object {
                            attribute_types,
                            optional_attributes,
                        })
                    }
                    ("list" | "set" | "map" | "tuple" | "object", _) => Err(malformed(format!(
                        "wrong arguments for {:?} type description",
                        tag
                    ))),
                    (other, _) => Err(Error::UnknownType(format!("{:?}", other))),
                }
            }
            other => Err(malformed(format!("unexpected type description {}", other))),
        }
    }

    /// Parse a JSON type description from bytes.
    pub fn from_json_bytes(bytes: &[u8]) -> Result<Self, Error> {
        let json: JsonValue = serde_json::from_slice(bytes)
            .map_err(|e| malformed(format!("invalid type description: {}", e)))?;
        Self::from_json_value(&json)
    }
}

fn malformed(message: impl Into<String>) -> Error {
    Error::decode_value(&AttributePath::new(), message)
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String => f.write_str("String"),
            Self::Number => f.write_str("Number"),
            Self::Bool => f.write_str("Bool"),
            Self::DynamicPseudoType => f.write_str("DynamicPseudoType"),
            Self::List(element) => write!(f, "List[{}]", element),
            Self::Set(element) => write!(f, "Set[{}]", element),
            Self::Map(element) => write!(f, "Map[{}]", element),
            Self::Tuple(elements) => {
                f.write_str("Tuple[")?;
                for (i, element) in elements.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", element)?;
                }
                f.write_str("]")
            }
            Self::Object {
                attribute_types,
                optional_attributes,
            } => {
                f.write_str("Object[")?;
                for (i, (name, ty)) in attribute_types.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{:?}:{}", name, ty)?;
                }
                f.write_str("]")?;
                if !optional_attributes.is_empty() {
                    let names: Vec<String> = optional_attributes
                        .iter()
                        .map(|name| format!("{:?}", name))
                        .collect();
                    write!(f, "?[{}]", names.join(", "))?;
                }
                Ok(())
            }
        }
    }
}

impl Serialize for Type {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Type {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let json = JsonValue::deserialize(deserializer)?;
        Self::from_json_value(&json).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nested() -> Type {
        Type::object_with_optional(
            [
                ("name".to_string(), Type::String),
                ("ports".to_string(), Type::list(Type::Number)),
                (
                    "meta".to_string(),
                    Type::map(Type::tuple(vec![Type::Bool, Type::DynamicPseudoType])),
                ),
            ],
            ["meta".to_string()],
        )
    }

    #[test]
    fn test_type_json_primitives() {
        assert_eq!(Type::String.to_json_value(), serde_json::json!("string"));
        assert_eq!(Type::Number.to_json_value(), serde_json::json!("number"));
        assert_eq!(Type::Bool.to_json_value(), serde_json::json!("bool"));
        assert_eq!(
            Type::DynamicPseudoType.to_json_value(),
            serde_json::json!("dynamic")
        );
        assert_eq!(
            Type::from_json_bytes(b"\"bool\"").unwrap(),
            Type::Bool
        );
    }

    #[test]
    fn test_type_json_composites() {
        let ty = nested();
        assert_eq!(
            ty.to_json_value(),
            serde_json::json!([
                "object",
                {
                    "meta": ["map", ["tuple", ["bool", "dynamic"]]],
                    "name": "string",
                    "ports": ["list", "number"]
                },
                ["meta"]
            ])
        );
        assert_eq!(Type::from_json_bytes(&ty.to_json_bytes()).unwrap(), ty);
        assert_eq!(
            Type::set(Type::String).to_json_bytes(),
            br#"["set","string"]"#.to_vec()
        );
    }

    #[test]
    fn test_type_json_unknown_tags() {
        assert!(matches!(
            Type::from_json_bytes(b"\"blob\""),
            Err(Error::UnknownType(_))
        ));
        assert!(matches!(
            Type::from_json_bytes(br#"["vector","string"]"#),
            Err(Error::UnknownType(_))
        ));
        assert!(matches!(
            Type::from_json_bytes(br#"["list"]"#),
            Err(Error::DecodeValue { .. })
        ));
        assert!(matches!(
            Type::from_json_bytes(br#"["object",{"a":"string"},["b"]]"#),
            Err(Error::DecodeValue { .. })
        ));
        assert!(Type::from_json_bytes(b"not json").is_err());
    }

    #[test]
    fn test_type_display() {
        assert_eq!(Type::list(Type::String).to_string(), "List[String]");
        assert_eq!(
            Type::object([("a".to_string(), Type::String)]).to_string(),
            "Object[\"a\":String]"
        );
        assert_eq!(
            Type::tuple(vec![Type::Bool, Type::Number]).to_string(),
            "Tuple[Bool, Number]"
        );
    }

    #[test]
    fn test_type_is_and_usable_as() {
        assert!(Type::list(Type::String).is(&Type::list(Type::Bool)));
        assert!(!Type::list(Type::String).is(&Type::set(Type::String)));

        assert!(Type::String.usable_as(&Type::DynamicPseudoType));
        assert!(Type::list(Type::String).usable_as(&Type::list(Type::DynamicPseudoType)));
        assert!(!Type::list(Type::String).usable_as(&Type::list(Type::Bool)));
        assert!(!Type::DynamicPseudoType.usable_as(&Type::String));

        let obj = Type::object([("a".to_string(), Type::String)]);
        let target = Type::object([("a".to_string(), Type::DynamicPseudoType)]);
        assert!(obj.usable_as(&target));
        assert!(!target.usable_as(&obj));

        assert!(!Type::tuple(vec![Type::Bool]).usable_as(&Type::tuple(vec![])));
    }

    #[test]
    fn test_type_contains_dynamic() {
        assert!(nested().contains_dynamic());
        assert!(!Type::map(Type::list(Type::String)).contains_dynamic());
    }

    #[test]
    fn test_type_serde() {
        let ty = nested();
        let json = serde_json::to_string(&ty).unwrap();
        let back: Type = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ty);
    }
}
