//! Wire envelopes for values whose type is only known from a schema.
//!
//! A [`DynamicValue`] is what the orchestrator sends for configuration, plan,
//! state, and identity fields. [`RawState`] and [`RawIdentity`] carry
//! persisted data whose schema may be older than the provider's current one,
//! so they are only decoded when an upgrade asks for it.
//!
//! ```
//! use hemmer_plugin_protocol::{DynamicValue, Type, Value};
//!
//! let ty = Type::list(Type::String);
//! let value = Value::list(Type::String, vec![Value::from("a")]);
//! let envelope = DynamicValue::new(&ty, &value).unwrap();
//! assert!(!envelope.is_null().unwrap());
//! assert_eq!(envelope.unmarshal(&ty).unwrap(), value);
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::Error;
use crate::tftypes::{
    marshal_msgpack, unmarshal_json, unmarshal_msgpack, AttributePath, Type, UnmarshalOptions,
    Value,
};

/// A value encoded as MessagePack or JSON.
///
/// Senders set exactly one of the two buffers. Values built here are always
/// MessagePack, since JSON cannot carry unknown values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DynamicValue {
    /// MessagePack bytes.
    pub msgpack: Vec<u8>,
    /// JSON bytes.
    pub json: Vec<u8>,
}

impl DynamicValue {
    /// Encode `value` as MessagePack under the declared type `ty`.
    pub fn new(ty: &Type, value: &Value) -> Result<Self, Error> {
        Ok(Self {
            msgpack: marshal_msgpack(value, ty)?,
            json: Vec::new(),
        })
    }

    /// An envelope holding a top-level null.
    pub fn null() -> Self {
        Self::from_msgpack(vec![0xc0])
    }

    /// Wrap existing MessagePack bytes.
    pub fn from_msgpack(bytes: Vec<u8>) -> Self {
        Self {
            msgpack: bytes,
            json: Vec::new(),
        }
    }

    /// Wrap existing JSON bytes.
    pub fn from_json(bytes: Vec<u8>) -> Self {
        Self {
            msgpack: Vec::new(),
            json: bytes,
        }
    }

    /// Whether neither buffer is set.
    pub fn is_empty(&self) -> bool {
        self.msgpack.is_empty() && self.json.is_empty()
    }

    /// Decode the envelope as a value of type `ty`.
    ///
    /// JSON takes precedence when both buffers are set.
    pub fn unmarshal(&self, ty: &Type) -> Result<Value, Error> {
        if !self.json.is_empty() {
            trace!(bytes = self.json.len(), "unmarshaling DynamicValue from JSON");
            return unmarshal_json(&self.json, ty, &UnmarshalOptions::default());
        }
        if !self.msgpack.is_empty() {
            trace!(bytes = self.msgpack.len(), "unmarshaling DynamicValue from msgpack");
            return unmarshal_msgpack(&self.msgpack, ty);
        }
        Err(Error::EmptyEnvelope)
    }

    /// Whether the envelope holds a top-level null, without decoding it.
    pub fn is_null(&self) -> Result<bool, Error> {
        if !self.json.is_empty() {
            let trimmed = self.json.trim_ascii_start();
            if trimmed.is_empty() {
                return Err(Error::decode_value(
                    &AttributePath::new(),
                    "unable to read a JSON token from DynamicValue",
                ));
            }
            let is_null = match trimmed.strip_prefix(b"null") {
                Some(rest) => rest.first().map_or(true, |b| !b.is_ascii_alphanumeric()),
                None => false,
            };
            return Ok(is_null);
        }
        if let Some(first) = self.msgpack.first() {
            return Ok(*first == 0xc0);
        }
        Err(Error::EmptyEnvelope)
    }
}

/// Persisted resource state in whatever shape an older schema produced.
///
/// Only the JSON form can be decoded; the legacy flat map is kept so it can
/// be handed back unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawState {
    /// State written as JSON.
    pub json: Vec<u8>,
    /// Legacy flat `key.path -> value` state.
    pub flatmap: BTreeMap<String, String>,
}

impl RawState {
    /// Wrap JSON state bytes.
    pub fn from_json(json: impl Into<Vec<u8>>) -> Self {
        Self {
            json: json.into(),
            flatmap: BTreeMap::new(),
        }
    }

    /// Decode the JSON state as a value of type `ty`.
    pub fn unmarshal(&self, ty: &Type) -> Result<Value, Error> {
        self.unmarshal_with_options(ty, &UnmarshalOptions::default())
    }

    /// Decode the JSON state, honouring `options`.
    pub fn unmarshal_with_options(
        &self,
        ty: &Type,
        options: &UnmarshalOptions,
    ) -> Result<Value, Error> {
        if !self.json.is_empty() {
            return unmarshal_json(&self.json, ty, options);
        }
        if !self.flatmap.is_empty() {
            return Err(Error::FlatmapUnsupported);
        }
        Err(Error::EmptyEnvelope)
    }
}

/// Persisted resource identity in whatever shape an older schema produced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawIdentity {
    /// Identity written as JSON.
    pub json: Vec<u8>,
}

impl RawIdentity {
    /// Wrap JSON identity bytes.
    pub fn from_json(json: impl Into<Vec<u8>>) -> Self {
        Self { json: json.into() }
    }

    /// Decode the JSON identity as a value of type `ty`.
    pub fn unmarshal(&self, ty: &Type) -> Result<Value, Error> {
        self.unmarshal_with_options(ty, &UnmarshalOptions::default())
    }

    /// Decode the JSON identity, honouring `options`.
    pub fn unmarshal_with_options(
        &self,
        ty: &Type,
        options: &UnmarshalOptions,
    ) -> Result<Value, Error> {
        if self.json.is_empty() {
            return Err(Error::EmptyEnvelope);
        }
        unmarshal_json(&self.json, ty, options)
    }
}
