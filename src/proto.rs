//! Protocol buffer messages for the value envelopes and diagnostics.
//!
//! These mirror the messages of the plugin protocol that carry values, so the
//! transport layer can move them without touching the value algebra. The
//! conversions to and from the crate's own types live here too.

use std::collections::BTreeMap;

use crate::diagnostic::{Diagnostic as CoreDiagnostic, DiagnosticSeverity};
use crate::dynamic_value;
use crate::error::Error;
use crate::tftypes::{self, AttributePathStep};

/// A value encoded as MessagePack or JSON.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DynamicValue {
    /// MessagePack bytes.
    #[prost(bytes = "vec", tag = "1")]
    pub msgpack: Vec<u8>,
    /// JSON bytes.
    #[prost(bytes = "vec", tag = "2")]
    pub json: Vec<u8>,
}

/// Persisted state as stored by an older schema version.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RawState {
    /// State written as JSON.
    #[prost(bytes = "vec", tag = "1")]
    pub json: Vec<u8>,
    /// Legacy flat state.
    #[prost(btree_map = "string, string", tag = "2")]
    pub flatmap: BTreeMap<String, String>,
}

/// Persisted identity as stored by an older identity schema version.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RawIdentity {
    /// Identity written as JSON.
    #[prost(bytes = "vec", tag = "1")]
    pub json: Vec<u8>,
}

/// A location inside a value.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AttributePath {
    /// Steps from the root.
    #[prost(message, repeated, tag = "1")]
    pub steps: Vec<attribute_path::Step>,
}

/// Nested message and enum types in `AttributePath`.
pub mod attribute_path {
    /// One step of an attribute path.
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Step {
        /// Which kind of step this is.
        #[prost(oneof = "step::Selector", tags = "1, 2, 3")]
        pub selector: Option<step::Selector>,
    }

    /// Nested message and enum types in `Step`.
    pub mod step {
        /// The step selector.
        #[derive(Clone, PartialEq, ::prost::Oneof)]
        pub enum Selector {
            /// Object attribute by name.
            #[prost(string, tag = "1")]
            AttributeName(String),
            /// Map element by key.
            #[prost(string, tag = "2")]
            ElementKeyString(String),
            /// List or tuple element by index.
            #[prost(int64, tag = "3")]
            ElementKeyInt(i64),
        }
    }
}

/// A diagnostic returned alongside an RPC result.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Diagnostic {
    /// Severity.
    #[prost(enumeration = "diagnostic::Severity", tag = "1")]
    pub severity: i32,
    /// Short summary.
    #[prost(string, tag = "2")]
    pub summary: String,
    /// Longer detail.
    #[prost(string, tag = "3")]
    pub detail: String,
    /// Location the diagnostic refers to.
    #[prost(message, optional, tag = "4")]
    pub attribute: Option<AttributePath>,
}

/// Nested message and enum types in `Diagnostic`.
pub mod diagnostic {
    /// Diagnostic severity.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum Severity {
        /// Unset.
        Invalid = 0,
        /// Error.
        Error = 1,
        /// Warning.
        Warning = 2,
    }
}

impl From<dynamic_value::DynamicValue> for DynamicValue {
    fn from(value: dynamic_value::DynamicValue) -> Self {
        Self {
            msgpack: value.msgpack,
            json: value.json,
        }
    }
}

impl From<DynamicValue> for dynamic_value::DynamicValue {
    fn from(value: DynamicValue) -> Self {
        Self {
            msgpack: value.msgpack,
            json: value.json,
        }
    }
}

impl From<dynamic_value::RawState> for RawState {
    fn from(state: dynamic_value::RawState) -> Self {
        Self {
            json: state.json,
            flatmap: state.flatmap,
        }
    }
}

impl From<RawState> for dynamic_value::RawState {
    fn from(state: RawState) -> Self {
        Self {
            json: state.json,
            flatmap: state.flatmap,
        }
    }
}

impl From<dynamic_value::RawIdentity> for RawIdentity {
    fn from(identity: dynamic_value::RawIdentity) -> Self {
        Self {
            json: identity.json,
        }
    }
}

impl From<RawIdentity> for dynamic_value::RawIdentity {
    fn from(identity: RawIdentity) -> Self {
        Self {
            json: identity.json,
        }
    }
}

/// Value-keyed steps have no wire form; the path is cut at the first one.
impl From<&tftypes::AttributePath> for AttributePath {
    fn from(path: &tftypes::AttributePath) -> Self {
        use attribute_path::step::Selector;

        let steps = path
            .steps()
            .iter()
            .map_while(|step| {
                let selector = match step {
                    AttributePathStep::AttributeName(name) => Selector::AttributeName(name.clone()),
                    AttributePathStep::ElementKeyString(key) => {
                        Selector::ElementKeyString(key.clone())
                    }
                    AttributePathStep::ElementKeyInt(index) => Selector::ElementKeyInt(*index),
                    AttributePathStep::ElementKeyValue(_) => return None,
                };
                Some(attribute_path::Step {
                    selector: Some(selector),
                })
            })
            .collect();
        Self { steps }
    }
}

impl TryFrom<AttributePath> for tftypes::AttributePath {
    type Error = Error;

    fn try_from(path: AttributePath) -> Result<Self, Self::Error> {
        use attribute_path::step::Selector;

        let mut out = tftypes::AttributePath::new();
        for step in path.steps {
            let step = match step.selector {
                Some(Selector::AttributeName(name)) => AttributePathStep::AttributeName(name),
                Some(Selector::ElementKeyString(key)) => AttributePathStep::ElementKeyString(key),
                Some(Selector::ElementKeyInt(index)) => AttributePathStep::ElementKeyInt(index),
                None => {
                    return Err(Error::decode_shape(&out, "attribute path step has no selector"))
                }
            };
            out = out.with_step(step);
        }
        Ok(out)
    }
}

impl From<DiagnosticSeverity> for diagnostic::Severity {
    fn from(severity: DiagnosticSeverity) -> Self {
        match severity {
            DiagnosticSeverity::Invalid => Self::Invalid,
            DiagnosticSeverity::Error => Self::Error,
            DiagnosticSeverity::Warning => Self::Warning,
        }
    }
}

impl From<diagnostic::Severity> for DiagnosticSeverity {
    fn from(severity: diagnostic::Severity) -> Self {
        match severity {
            diagnostic::Severity::Invalid => Self::Invalid,
            diagnostic::Severity::Error => Self::Error,
            diagnostic::Severity::Warning => Self::Warning,
        }
    }
}

impl From<CoreDiagnostic> for Diagnostic {
    fn from(diag: CoreDiagnostic) -> Self {
        Self {
            severity: diagnostic::Severity::from(diag.severity) as i32,
            summary: diag.summary,
            detail: diag.detail.unwrap_or_default(),
            attribute: diag.attribute.as_ref().map(AttributePath::from),
        }
    }
}

impl TryFrom<Diagnostic> for CoreDiagnostic {
    type Error = Error;

    fn try_from(diag: Diagnostic) -> Result<Self, Self::Error> {
        let severity = diagnostic::Severity::try_from(diag.severity)
            .unwrap_or(diagnostic::Severity::Invalid);
        Ok(Self {
            severity: severity.into(),
            summary: diag.summary,
            detail: (!diag.detail.is_empty()).then_some(diag.detail),
            attribute: diag.attribute.map(TryInto::try_into).transpose()?,
        })
    }
}
