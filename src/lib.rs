//! Hemmer Plugin Protocol
//!
//! The provider side of the Hemmer plugin protocol: a typed value system, its
//! MessagePack and JSON wire codecs, schemas, and a dispatcher that turns
//! envelope-level requests into calls on a [`ProviderService`].
//!
//! # Overview
//!
//! - **Values** ([`tftypes`]): [`Type`], [`Value`], [`Number`] and
//!   [`AttributePath`], with walk, transform, and diff
//! - **Envelopes** ([`dynamic_value`]): [`DynamicValue`], [`RawState`] and
//!   [`RawIdentity`], the byte forms values travel in
//! - **Schemas** ([`schema`]): blocks, attributes, functions, and the
//!   [`Type`] each of them implies
//! - **Validation** ([`validation`]): schema rules checked against a decoded
//!   value, reported as [`Diagnostic`]s with attribute paths
//! - **Protocol buffers** ([`proto`]): prost messages for envelopes, paths,
//!   and diagnostics
//! - **Streaming** ([`stream`]): action events and chunked state bytes with
//!   cooperative cancellation
//! - **Dispatch** ([`server`]): the [`ProviderService`] trait and
//!   [`Dispatcher`]
//! - **Testing** ([`testing`]): a harness that drives a provider through the
//!   dispatcher
//! - **Logging** ([`logging`]): `tracing` setup writing to stderr
//!
//! # Values on the wire
//!
//! ```
//! use hemmer_plugin_protocol::{DynamicValue, Type, Value};
//!
//! let ty = Type::object([
//!     ("name".to_string(), Type::String),
//!     ("port".to_string(), Type::Number),
//! ]);
//! let value = Value::object([
//!     ("name".to_string(), Value::from("web")),
//!     ("port".to_string(), Value::from(8080_i64)),
//! ]);
//!
//! let envelope = DynamicValue::new(&ty, &value).unwrap();
//! assert_eq!(envelope.unmarshal(&ty).unwrap(), value);
//! ```
//!
//! # Errors carry paths
//!
//! ```
//! use hemmer_plugin_protocol::{AttributePath, DynamicValue, Type};
//!
//! let ty = Type::object([("tags".to_string(), Type::list(Type::String))]);
//! let envelope = DynamicValue::from_json(br#"{"tags":["a",{}]}"#.to_vec());
//!
//! let err = envelope.unmarshal(&ty).unwrap_err();
//! assert_eq!(
//!     err.path(),
//!     Some(&AttributePath::new().with_attribute_name("tags").with_element_key_int(1)),
//! );
//! ```
//!
//! # Providers
//!
//! ```ignore
//! use hemmer_plugin_protocol::{
//!     Dispatcher, PlanResult, ProviderError, ProviderService, Value,
//!     diagnostic::Diagnostic,
//!     schema::{Attribute, ProviderSchema, Schema},
//! };
//!
//! struct MyProvider;
//!
//! #[hemmer_plugin_protocol::async_trait]
//! impl ProviderService for MyProvider {
//!     fn schema(&self) -> ProviderSchema {
//!         ProviderSchema::new()
//!             .with_resource("example_resource", Schema::v0()
//!                 .with_attribute("name", Attribute::required_string())
//!                 .with_attribute("id", Attribute::computed_string()))
//!     }
//!
//!     async fn configure(&self, _config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
//!         Ok(vec![])
//!     }
//!
//!     async fn plan(
//!         &self,
//!         _type_name: &str,
//!         _prior_state: Option<Value>,
//!         proposed_state: Value,
//!         _config: Value,
//!     ) -> Result<PlanResult, ProviderError> {
//!         Ok(PlanResult::no_change(proposed_state))
//!     }
//!
//!     // create, read, update, delete ...
//! }
//!
//! let dispatcher = Dispatcher::new(MyProvider);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod diagnostic;
pub mod dynamic_value;
pub mod error;
pub mod logging;
pub mod proto;
pub mod schema;
pub mod server;
pub mod stream;
pub mod testing;
pub mod tftypes;
pub mod types;
pub mod validation;

// Re-export main types at crate root
pub use diagnostic::{Diagnostic, DiagnosticSeverity};
pub use dynamic_value::{DynamicValue, RawIdentity, RawState};
pub use error::{Error, ProviderError};
pub use logging::{init_logging, init_logging_with_default, try_init_logging};
pub use schema::ProviderSchema;
pub use server::{Dispatcher, ProviderService};
pub use stream::{
    ActionEvent, EventSender, EventStream, StateChunk, StopSignal, StreamOptions,
};
pub use tftypes::{
    AttributePath, AttributePathStep, FromValue, Number, Type, UnmarshalOptions, Value,
    ValueDiff, ValuePayload,
};
pub use types::{
    EphemeralResult, FunctionError, ImportedResource, PlanResult, ProviderMetadata,
    ServerCapabilities,
};
pub use validation::{is_valid, validate, validate_result};

// Re-export async_trait for convenience
pub use async_trait::async_trait;

// Re-export commonly used external types
pub use tonic;
pub use tracing;
