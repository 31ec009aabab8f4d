//! Attribute paths: locations inside a [`Value`] or [`Type`].

use std::fmt;

use super::{Type, Value};
use crate::error::Error;

/// One step into a composite value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributePathStep {
    /// Select an object attribute by name.
    AttributeName(String),
    /// Select a map element by key.
    ElementKeyString(String),
    /// Select a list or tuple element by index.
    ElementKeyInt(i64),
    /// Select a set element by its value.
    ElementKeyValue(Value),
}

impl fmt::Display for AttributePathStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AttributeName(name) => write!(f, "AttributeName({:?})", name),
            Self::ElementKeyString(key) => write!(f, "ElementKeyString({:?})", key),
            Self::ElementKeyInt(index) => write!(f, "ElementKeyInt({})", index),
            Self::ElementKeyValue(value) => write!(f, "ElementKeyValue({})", value),
        }
    }
}

/// An ordered sequence of steps. The empty path denotes the root.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AttributePath {
    steps: Vec<AttributePathStep>,
}

impl AttributePath {
    /// The root path.
    pub fn new() -> Self {
        Self::default()
    }

    /// The steps of this path, root first.
    pub fn steps(&self) -> &[AttributePathStep] {
        &self.steps
    }

    /// Number of steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether this is the root path.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// The final step, if any.
    pub fn last_step(&self) -> Option<&AttributePathStep> {
        self.steps.last()
    }

    /// A copy of this path extended by `step`.
    pub fn with_step(&self, step: AttributePathStep) -> Self {
        let mut steps = self.steps.clone();
        steps.push(step);
        Self { steps }
    }

    /// A copy of this path extended by an attribute name.
    pub fn with_attribute_name(&self, name: impl Into<String>) -> Self {
        self.with_step(AttributePathStep::AttributeName(name.into()))
    }

    /// A copy of this path extended by a map key.
    pub fn with_element_key_string(&self, key: impl Into<String>) -> Self {
        self.with_step(AttributePathStep::ElementKeyString(key.into()))
    }

    /// A copy of this path extended by a list or tuple index.
    pub fn with_element_key_int(&self, index: i64) -> Self {
        self.with_step(AttributePathStep::ElementKeyInt(index))
    }

    /// A copy of this path extended by a set element.
    pub fn with_element_key_value(&self, value: Value) -> Self {
        self.with_step(AttributePathStep::ElementKeyValue(value))
    }

    /// This path without its final step. The root is its own parent.
    pub fn parent(&self) -> Self {
        let mut steps = self.steps.clone();
        steps.pop();
        Self { steps }
    }

    /// This path followed by every step of `other`.
    pub fn join(&self, other: &AttributePath) -> Self {
        let mut steps = self.steps.clone();
        steps.extend(other.steps.iter().cloned());
        Self { steps }
    }

    /// Whether `prefix` is a leading run of this path's steps.
    pub fn starts_with(&self, prefix: &AttributePath) -> bool {
        self.steps.starts_with(&prefix.steps)
    }

    pub(crate) fn push(&mut self, step: AttributePathStep) {
        self.steps.push(step);
    }

    pub(crate) fn pop(&mut self) {
        self.steps.pop();
    }

    fn prefix(&self, len: usize) -> Self {
        Self {
            steps: self.steps[..len].to_vec(),
        }
    }
}

impl From<Vec<AttributePathStep>> for AttributePath {
    fn from(steps: Vec<AttributePathStep>) -> Self {
        Self { steps }
    }
}

impl FromIterator<AttributePathStep> for AttributePath {
    fn from_iter<I: IntoIterator<Item = AttributePathStep>>(iter: I) -> Self {
        Self {
            steps: iter.into_iter().collect(),
        }
    }
}

impl fmt::Display for AttributePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, step) in self.steps.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{}", step)?;
        }
        Ok(())
    }
}

impl Value {
    /// Resolve a single step against this value.
    ///
    /// Returns `None` when the step does not fit the value's type, when the
    /// value is null or unknown, or when the selected element is absent.
    pub fn apply_step(&self, step: &AttributePathStep) -> Option<&Value> {
        match (self.ty(), step) {
            (Type::Object { .. }, AttributePathStep::AttributeName(name)) => {
                self.attributes()?.get(name)
            }
            (Type::Map(_), AttributePathStep::ElementKeyString(key)) => {
                self.attributes()?.get(key)
            }
            (Type::List(_) | Type::Tuple(_), AttributePathStep::ElementKeyInt(index)) => {
                let index = usize::try_from(*index).ok()?;
                self.elements()?.get(index)
            }
            (Type::Set(_), AttributePathStep::ElementKeyValue(key)) => {
                self.elements()?.iter().find(|element| *element == key)
            }
            _ => None,
        }
    }

    /// Follow `path` from this value to the value it names.
    pub fn walk_attribute_path(&self, path: &AttributePath) -> Result<&Value, Error> {
        let mut current = self;
        for (i, step) in path.steps().iter().enumerate() {
            current = current.apply_step(step).ok_or_else(|| Error::InvalidStep {
                path: path.prefix(i + 1),
            })?;
        }
        Ok(current)
    }
}

impl Type {
    /// Resolve a single step against this type.
    ///
    /// Set types accept either a value key or an integer key; a dynamic type
    /// resolves every step to itself.
    pub fn apply_step(&self, step: &AttributePathStep) -> Option<&Type> {
        match (self, step) {
            (Type::DynamicPseudoType, _) => Some(self),
            (Type::Object { attribute_types, .. }, AttributePathStep::AttributeName(name)) => {
                attribute_types.get(name)
            }
            (Type::Map(element), AttributePathStep::ElementKeyString(_))
            | (Type::List(element), AttributePathStep::ElementKeyInt(_))
            | (
                Type::Set(element),
                AttributePathStep::ElementKeyValue(_) | AttributePathStep::ElementKeyInt(_),
            ) => Some(element),
            (Type::Tuple(elements), AttributePathStep::ElementKeyInt(index)) => {
                let index = usize::try_from(*index).ok()?;
                elements.get(index)
            }
            _ => None,
        }
    }

    /// Follow `path` from this type to the type at that location.
    pub fn walk_attribute_path(&self, path: &AttributePath) -> Result<&Type, Error> {
        let mut current = self;
        for (i, step) in path.steps().iter().enumerate() {
            current = current.apply_step(step).ok_or_else(|| Error::InvalidStep {
                path: path.prefix(i + 1),
            })?;
        }
        Ok(current)
    }
}
