//! Structural differences between two values of the same type.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use super::{AttributePath, AttributePathStep, Type, Value, ValuePayload};
use crate::error::Error;

/// One difference between two values.
///
/// A side is `None` when the location is absent or null in that value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueDiff {
    /// Where the values differ.
    pub path: AttributePath,
    /// The value on the left, if present.
    pub left: Option<Value>,
    /// The value on the right, if present.
    pub right: Option<Value>,
}

impl ValueDiff {
    fn new(path: &AttributePath, left: Option<&Value>, right: Option<&Value>) -> Self {
        Self {
            path: path.clone(),
            left: left.cloned(),
            right: right.cloned(),
        }
    }
}

/// Compute the differences between `left` and `right`.
///
/// Both values must have the same type. A primitive that differs yields one
/// entry with both sides. A location that is null on one side yields a single
/// entry with that side `None`, without descending. A collection whose length
/// changed yields an entry for itself plus one per added or removed element.
/// Set elements are matched by value.
pub fn diff(left: &Value, right: &Value) -> Result<Vec<ValueDiff>, Error> {
    if left.ty() != right.ty() {
        return Err(Error::type_mismatch(
            &AttributePath::new(),
            format!(
                "cannot diff values of different types: {} and {}",
                left.ty(),
                right.ty()
            ),
        ));
    }

    let mut diffs = Vec::new();
    let mut path = AttributePath::new();
    diff_node(&mut path, left, right, &mut diffs);
    Ok(diffs)
}

/// Compare two values at the same location, descending in step.
fn diff_node(path: &mut AttributePath, l: &Value, r: &Value, diffs: &mut Vec<ValueDiff>) {
    // Dynamic positions may hold different concrete types.
    if l.ty() != r.ty() {
        diffs.push(ValueDiff::new(path, Some(l), Some(r)));
        return;
    }

    match (l.is_known(), r.is_known()) {
        (false, false) => return,
        (true, true) => {}
        _ => {
            diffs.push(ValueDiff::new(path, Some(l), Some(r)));
            return;
        }
    }

    match (l.is_null(), r.is_null()) {
        (true, true) => return,
        (true, false) => {
            diffs.push(ValueDiff::new(path, None, Some(r)));
            return;
        }
        (false, true) => {
            diffs.push(ValueDiff::new(path, Some(l), None));
            return;
        }
        (false, false) => {}
    }

    match (l.payload(), r.payload()) {
        (ValuePayload::Elements(a), ValuePayload::Elements(b)) => {
            if a.len() != b.len() {
                diffs.push(ValueDiff::new(path, Some(l), Some(r)));
            }
            if matches!(l.ty(), Type::Set(_)) {
                diff_set(path, a, b, diffs);
            } else {
                diff_sequence(path, a, b, diffs);
            }
        }
        (ValuePayload::Attributes(a), ValuePayload::Attributes(b)) => {
            if a.len() != b.len() {
                diffs.push(ValueDiff::new(path, Some(l), Some(r)));
            }
            let is_object = matches!(l.ty(), Type::Object { .. });
            diff_entries(path, is_object, a, b, diffs);
        }
        (a, b) => {
            if a != b {
                diffs.push(ValueDiff::new(path, Some(l), Some(r)));
            }
        }
    }
}

fn diff_sequence(path: &mut AttributePath, a: &[Value], b: &[Value], diffs: &mut Vec<ValueDiff>) {
    for i in 0..a.len().max(b.len()) {
        path.push(AttributePathStep::ElementKeyInt(i as i64));
        match (a.get(i), b.get(i)) {
            (Some(l), Some(r)) => diff_node(path, l, r, diffs),
            (l, r) => diffs.push(ValueDiff::new(path, l, r)),
        }
        path.pop();
    }
}

/// Set elements are their own keys, so an element is either on both sides
/// and equal, or on one side only.
fn diff_set(path: &mut AttributePath, a: &[Value], b: &[Value], diffs: &mut Vec<ValueDiff>) {
    let left: HashSet<&Value> = a.iter().collect();
    let right: HashSet<&Value> = b.iter().collect();
    for l in a.iter().filter(|l| !right.contains(l)) {
        path.push(AttributePathStep::ElementKeyValue(l.clone()));
        diffs.push(ValueDiff::new(path, Some(l), None));
        path.pop();
    }
    for r in b.iter().filter(|r| !left.contains(r)) {
        path.push(AttributePathStep::ElementKeyValue(r.clone()));
        diffs.push(ValueDiff::new(path, None, Some(r)));
        path.pop();
    }
}

fn diff_entries(
    path: &mut AttributePath,
    is_object: bool,
    a: &BTreeMap<String, Value>,
    b: &BTreeMap<String, Value>,
    diffs: &mut Vec<ValueDiff>,
) {
    let keys: BTreeSet<&String> = a.keys().chain(b.keys()).collect();
    for key in keys {
        path.push(if is_object {
            AttributePathStep::AttributeName(key.clone())
        } else {
            AttributePathStep::ElementKeyString(key.clone())
        });
        match (a.get(key), b.get(key)) {
            (Some(l), Some(r)) => diff_node(path, l, r, diffs),
            (l, r) => diffs.push(ValueDiff::new(path, l, r)),
        }
        path.pop();
    }
}

impl Value {
    /// Differences from `self` (left) to `other` (right); see [`diff`].
    pub fn diff(&self, other: &Value) -> Result<Vec<ValueDiff>, Error> {
        diff(self, other)
    }
}
