//! The typed value system carried by every protocol message.
//!
//! A [`Value`] pairs a payload with its [`Type`]. Values are built once and
//! never mutated; [`Value::transform`] produces rebuilt copies. The
//! [`msgpack`] and [`json`] modules move values to and from the two wire
//! forms, and [`AttributePath`] addresses locations inside a value for
//! traversal and error reporting.

mod diff;
pub mod json;
pub mod msgpack;
mod number;
mod path;
mod ty;
mod value;
mod walk;

pub use diff::{diff, ValueDiff};
pub use json::{marshal_json, unmarshal_json, UnmarshalOptions};
pub use msgpack::{marshal_msgpack, unmarshal_msgpack};
pub use number::Number;
pub use path::{AttributePath, AttributePathStep};
pub use ty::Type;
pub use value::{FromValue, Value, ValuePayload};
pub use walk::{transform, walk};
