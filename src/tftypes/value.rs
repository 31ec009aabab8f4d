//! Typed values.

use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::hash::{Hash, Hasher};

use super::{AttributePath, AttributePathStep, Number, Type};
use crate::error::Error;

/// The content of a [`Value`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValuePayload {
    /// Not yet known; resolved later by the orchestrator.
    Unknown,
    /// Explicitly absent.
    Null,
    /// Payload of a `String` value.
    String(String),
    /// Payload of a `Number` value.
    Number(Number),
    /// Payload of a `Bool` value.
    Bool(bool),
    /// Payload of a list, set, or tuple value.
    Elements(Vec<Value>),
    /// Payload of a map or object value.
    Attributes(BTreeMap<String, Value>),
}

impl ValuePayload {
    fn describe(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Null => "null",
            Self::String(_) => "string",
            Self::Number(_) => "number",
            Self::Bool(_) => "bool",
            Self::Elements(_) => "element list",
            Self::Attributes(_) => "attribute map",
        }
    }
}

impl From<String> for ValuePayload {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<&str> for ValuePayload {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<bool> for ValuePayload {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<Number> for ValuePayload {
    fn from(v: Number) -> Self {
        Self::Number(v)
    }
}

impl From<i64> for ValuePayload {
    fn from(v: i64) -> Self {
        Self::Number(Number::from(v))
    }
}

impl From<Vec<Value>> for ValuePayload {
    fn from(v: Vec<Value>) -> Self {
        Self::Elements(v)
    }
}

impl From<BTreeMap<String, Value>> for ValuePayload {
    fn from(v: BTreeMap<String, Value>) -> Self {
        Self::Attributes(v)
    }
}

impl<T: Into<ValuePayload>> From<Option<T>> for ValuePayload {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

/// A value paired with its type.
///
/// Values are immutable once built; [`Value::try_new`] checks that the
/// payload agrees with the type, so every `Value` in circulation is
/// well-formed.
#[derive(Debug, Clone)]
pub struct Value {
    ty: Type,
    payload: ValuePayload,
}

impl Value {
    /// Build a value, checking the payload against `ty`.
    ///
    /// Set payloads drop duplicate fully-known elements. Object payloads get
    /// a null for every omitted optional attribute.
    pub fn try_new(ty: Type, payload: impl Into<ValuePayload>) -> Result<Self, Error> {
        let payload = payload.into();
        let payload = match (&ty, payload) {
            (_, payload @ (ValuePayload::Unknown | ValuePayload::Null)) => payload,
            (Type::String, payload @ ValuePayload::String(_))
            | (Type::Number, payload @ ValuePayload::Number(_))
            | (Type::Bool, payload @ ValuePayload::Bool(_)) => payload,
            (Type::List(element), ValuePayload::Elements(elements)) => {
                check_homogeneous(
                    element,
                    elements
                        .iter()
                        .enumerate()
                        .map(|(i, v)| (AttributePathStep::ElementKeyInt(i as i64), v)),
                )?;
                ValuePayload::Elements(elements)
            }
            (Type::Set(element), ValuePayload::Elements(elements)) => {
                check_homogeneous(
                    element,
                    elements
                        .iter()
                        .map(|v| (AttributePathStep::ElementKeyValue(v.clone()), v)),
                )?;
                ValuePayload::Elements(dedupe(elements))
            }
            (Type::Tuple(types), ValuePayload::Elements(elements)) => {
                if types.len() != elements.len() {
                    return Err(Error::type_mismatch(
                        &AttributePath::new(),
                        format!(
                            "{} expects {} elements, got {}",
                            ty,
                            types.len(),
                            elements.len()
                        ),
                    ));
                }
                for (i, (element_ty, element)) in types.iter().zip(&elements).enumerate() {
                    check_usable(
                        element,
                        element_ty,
                        AttributePathStep::ElementKeyInt(i as i64),
                    )?;
                }
                ValuePayload::Elements(elements)
            }
            (Type::Map(element), ValuePayload::Attributes(attributes)) => {
                check_homogeneous(
                    element,
                    attributes
                        .iter()
                        .map(|(k, v)| (AttributePathStep::ElementKeyString(k.clone()), v)),
                )?;
                ValuePayload::Attributes(attributes)
            }
            (
                Type::Object {
                    attribute_types,
                    optional_attributes,
                },
                ValuePayload::Attributes(mut attributes),
            ) => {
                if let Some(name) = attributes
                    .keys()
                    .find(|name| !attribute_types.contains_key(*name))
                {
                    return Err(Error::type_mismatch(
                        &AttributePath::new().with_attribute_name(name.clone()),
                        format!("{} has no attribute {:?}", ty, name),
                    ));
                }
                for (name, attribute_ty) in attribute_types {
                    match attributes.get(name) {
                        Some(value) => check_usable(
                            value,
                            attribute_ty,
                            AttributePathStep::AttributeName(name.clone()),
                        )?,
                        None if optional_attributes.contains(name) => {
                            attributes.insert(name.clone(), Value::null(attribute_ty.clone()));
                        }
                        None => {
                            return Err(Error::type_mismatch(
                                &AttributePath::new().with_attribute_name(name.clone()),
                                format!("missing required attribute {:?}", name),
                            ))
                        }
                    }
                }
                ValuePayload::Attributes(attributes)
            }
            (_, payload) => {
                return Err(Error::type_mismatch(
                    &AttributePath::new(),
                    format!("can't use {} as {}", payload.describe(), ty),
                ))
            }
        };
        Ok(Self { ty, payload })
    }

    /// Build a value, panicking if the payload does not fit `ty`.
    ///
    /// # Panics
    ///
    /// Panics when [`Value::try_new`] would return an error.
    pub fn new(ty: Type, payload: impl Into<ValuePayload>) -> Self {
        match Self::try_new(ty, payload) {
            Ok(value) => value,
            Err(err) => panic!("invalid value: {}", err),
        }
    }

    /// A null value of type `ty`.
    pub fn null(ty: Type) -> Self {
        Self {
            ty,
            payload: ValuePayload::Null,
        }
    }

    /// An unknown value of type `ty`.
    pub fn unknown(ty: Type) -> Self {
        Self {
            ty,
            payload: ValuePayload::Unknown,
        }
    }

    /// A list value.
    ///
    /// # Panics
    ///
    /// Panics if an element is not usable as `element`.
    pub fn list(element: Type, elements: Vec<Value>) -> Self {
        Self::new(Type::list(element), elements)
    }

    /// A set value; duplicate elements are dropped.
    ///
    /// # Panics
    ///
    /// Panics if an element is not usable as `element`.
    pub fn set(element: Type, elements: Vec<Value>) -> Self {
        Self::new(Type::set(element), elements)
    }

    /// A map value.
    ///
    /// # Panics
    ///
    /// Panics if an element is not usable as `element`.
    pub fn map<I>(element: Type, entries: I) -> Self
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        Self::new(
            Type::map(element),
            entries.into_iter().collect::<BTreeMap<_, _>>(),
        )
    }

    /// A tuple value whose type is taken from its elements.
    pub fn tuple(elements: Vec<Value>) -> Self {
        Self {
            ty: Type::Tuple(elements.iter().map(|v| v.ty.clone()).collect()),
            payload: ValuePayload::Elements(elements),
        }
    }

    /// An object value whose type is taken from its attributes.
    pub fn object<I>(attributes: I) -> Self
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        let attributes: BTreeMap<String, Value> = attributes.into_iter().collect();
        Self {
            ty: Type::object(
                attributes
                    .iter()
                    .map(|(name, value)| (name.clone(), value.ty.clone())),
            ),
            payload: ValuePayload::Attributes(attributes),
        }
    }

    /// The value's type.
    pub fn ty(&self) -> &Type {
        &self.ty
    }

    /// The value's payload.
    pub fn payload(&self) -> &ValuePayload {
        &self.payload
    }

    /// Split the value into its type and payload.
    pub fn into_parts(self) -> (Type, ValuePayload) {
        (self.ty, self.payload)
    }

    /// Whether the value is null.
    pub fn is_null(&self) -> bool {
        matches!(self.payload, ValuePayload::Null)
    }

    /// Whether the value itself is known. Children may still be unknown.
    pub fn is_known(&self) -> bool {
        !matches!(self.payload, ValuePayload::Unknown)
    }

    /// Whether the value and every descendant are known.
    pub fn is_fully_known(&self) -> bool {
        match &self.payload {
            ValuePayload::Unknown => false,
            ValuePayload::Elements(elements) => elements.iter().all(Value::is_fully_known),
            ValuePayload::Attributes(attributes) => {
                attributes.values().all(Value::is_fully_known)
            }
            _ => true,
        }
    }

    /// The string payload, if any.
    pub fn as_str(&self) -> Option<&str> {
        match &self.payload {
            ValuePayload::String(s) => Some(s),
            _ => None,
        }
    }

    /// The number payload, if any.
    pub fn as_number(&self) -> Option<&Number> {
        match &self.payload {
            ValuePayload::Number(n) => Some(n),
            _ => None,
        }
    }

    /// The bool payload, if any.
    pub fn as_bool(&self) -> Option<bool> {
        match self.payload {
            ValuePayload::Bool(b) => Some(b),
            _ => None,
        }
    }

    /// The elements of a known, non-null list, set, or tuple.
    pub fn elements(&self) -> Option<&[Value]> {
        match &self.payload {
            ValuePayload::Elements(elements) => Some(elements),
            _ => None,
        }
    }

    /// The entries of a known, non-null map or object.
    pub fn attributes(&self) -> Option<&BTreeMap<String, Value>> {
        match &self.payload {
            ValuePayload::Attributes(attributes) => Some(attributes),
            _ => None,
        }
    }

    /// Look up an object attribute or map entry.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.attributes()?.get(name)
    }

    /// Convert into a native Rust value.
    ///
    /// Fails for unknown values, for nulls unless the target is an
    /// `Option`, and when the payload kind does not match the target.
    pub fn to<T: FromValue>(&self) -> Result<T, Error> {
        T::from_value(self)
    }
}

fn check_usable(value: &Value, ty: &Type, step: AttributePathStep) -> Result<(), Error> {
    if value.ty.usable_as(ty) {
        Ok(())
    } else {
        Err(Error::type_mismatch(
            &AttributePath::from(vec![step]),
            format!("can't use {} as {}", value.ty, ty),
        ))
    }
}

/// Every element must be usable as `element`; under a dynamic element type
/// the concrete element types must also agree with each other.
fn check_homogeneous<'a, I>(element: &Type, children: I) -> Result<(), Error>
where
    I: Iterator<Item = (AttributePathStep, &'a Value)>,
{
    let mut concrete: Option<&Type> = None;
    for (step, child) in children {
        if !element.is_dynamic() {
            check_usable(child, element, step)?;
            continue;
        }
        if child.ty.is_dynamic() {
            continue;
        }
        match concrete {
            None => concrete = Some(&child.ty),
            Some(seen) if *seen != child.ty => {
                return Err(Error::type_mismatch(
                    &AttributePath::from(vec![step]),
                    format!("elements must all be of one type, found {} and {}", seen, child.ty),
                ))
            }
            Some(_) => {}
        }
    }
    Ok(())
}

fn dedupe(elements: Vec<Value>) -> Vec<Value> {
    let keep: Vec<bool> = {
        let mut seen = HashSet::with_capacity(elements.len());
        elements
            .iter()
            .map(|element| !element.is_fully_known() || seen.insert(element))
            .collect()
    };
    elements
        .into_iter()
        .zip(keep)
        .filter_map(|(element, keep)| keep.then_some(element))
        .collect()
}

fn set_equal(a: &[Value], b: &[Value]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut counts: HashMap<&Value, usize> = HashMap::with_capacity(a.len());
    for x in a {
        *counts.entry(x).or_default() += 1;
    }
    b.iter().all(|y| match counts.get_mut(y) {
        Some(count) if *count > 0 => {
            *count -= 1;
            true
        }
        _ => false,
    })
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        if self.ty != other.ty {
            return false;
        }
        match (&self.payload, &other.payload) {
            (ValuePayload::Elements(a), ValuePayload::Elements(b))
                if matches!(self.ty, Type::Set(_)) =>
            {
                set_equal(a, b)
            }
            (a, b) => a == b,
        }
    }
}

impl Eq for Value {}

/// Set elements hash independently of their order.
impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.ty.hash(state);
        match &self.payload {
            ValuePayload::Elements(elements) if matches!(self.ty, Type::Set(_)) => {
                let combined = elements.iter().fold(0_u64, |acc, element| {
                    let mut hasher = DefaultHasher::new();
                    element.hash(&mut hasher);
                    acc.wrapping_add(hasher.finish())
                });
                elements.len().hash(state);
                combined.hash(state);
            }
            payload => payload.hash(state),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}<", self.ty)?;
        match &self.payload {
            ValuePayload::Unknown => f.write_str("unknown")?,
            ValuePayload::Null => f.write_str("null")?,
            ValuePayload::String(s) => write!(f, "{:?}", s)?,
            ValuePayload::Number(n) => write!(f, "{}", n)?,
            ValuePayload::Bool(b) => write!(f, "{}", b)?,
            ValuePayload::Elements(elements) => {
                for (i, element) in elements.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", element)?;
                }
            }
            ValuePayload::Attributes(attributes) => {
                for (i, (name, value)) in attributes.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{:?}:{}", name, value)?;
                }
            }
        }
        f.write_str(">")
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::new(Type::String, v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::new(Type::String, v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::new(Type::Bool, v)
    }
}

impl From<Number> for Value {
    fn from(v: Number) -> Self {
        Self::new(Type::Number, v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::new(Type::Number, v)
    }
}

/// Conversion from a [`Value`] into a native Rust type.
pub trait FromValue: Sized {
    /// Convert `value`, failing when its shape does not fit.
    fn from_value(value: &Value) -> Result<Self, Error>;
}

fn known_non_null(value: &Value, target: &str) -> Result<(), Error> {
    match value.payload {
        ValuePayload::Unknown => Err(Error::type_mismatch(
            &AttributePath::new(),
            "unmarshaling unknown values is not supported",
        )),
        ValuePayload::Null => Err(Error::type_mismatch(
            &AttributePath::new(),
            format!("can't unmarshal null into {}, use an Option", target),
        )),
        _ => Ok(()),
    }
}

fn cannot_convert(value: &Value, target: &str) -> Error {
    Error::type_mismatch(
        &AttributePath::new(),
        format!("can't unmarshal {} into {}", value.ty, target),
    )
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Result<Self, Error> {
        Ok(value.clone())
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Result<Self, Error> {
        known_non_null(value, "String")?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| cannot_convert(value, "String"))
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Result<Self, Error> {
        known_non_null(value, "bool")?;
        value.as_bool().ok_or_else(|| cannot_convert(value, "bool"))
    }
}

impl FromValue for Number {
    fn from_value(value: &Value) -> Result<Self, Error> {
        known_non_null(value, "Number")?;
        value
            .as_number()
            .cloned()
            .ok_or_else(|| cannot_convert(value, "Number"))
    }
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> Result<Self, Error> {
        let number = Number::from_value(value)?;
        number.as_i64().ok_or_else(|| {
            Error::type_mismatch(
                &AttributePath::new(),
                format!("{} cannot be represented as i64", number),
            )
        })
    }
}

impl FromValue for u64 {
    fn from_value(value: &Value) -> Result<Self, Error> {
        let number = Number::from_value(value)?;
        number.as_u64().ok_or_else(|| {
            Error::type_mismatch(
                &AttributePath::new(),
                format!("{} cannot be represented as u64", number),
            )
        })
    }
}

impl FromValue for f64 {
    /// Rounds to the nearest double.
    fn from_value(value: &Value) -> Result<Self, Error> {
        Ok(Number::from_value(value)?.to_f64_lossy())
    }
}

impl FromValue for Vec<Value> {
    fn from_value(value: &Value) -> Result<Self, Error> {
        known_non_null(value, "Vec<Value>")?;
        value
            .elements()
            .map(<[Value]>::to_vec)
            .ok_or_else(|| cannot_convert(value, "Vec<Value>"))
    }
}

impl FromValue for BTreeMap<String, Value> {
    fn from_value(value: &Value) -> Result<Self, Error> {
        known_non_null(value, "BTreeMap<String, Value>")?;
        value
            .attributes()
            .cloned()
            .ok_or_else(|| cannot_convert(value, "BTreeMap<String, Value>"))
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> Result<Self, Error> {
        if value.is_null() {
            Ok(None)
        } else {
            T::from_value(value).map(Some)
        }
    }
}
