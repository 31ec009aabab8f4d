//! Error types for the Hemmer plugin protocol.
//!
//! Two layers of errors live here:
//!
//! - [`Error`] is raised by the value algebra and the wire codecs. Every kind
//!   that can be pinned to a location carries the [`AttributePath`] at which it
//!   occurred.
//! - [`ProviderError`] is returned by provider business logic. It wraps [`Error`]
//!   so codec failures surfaced inside a provider keep their path.

use thiserror::Error;

use crate::tftypes::AttributePath;

/// Errors raised while building, traversing, encoding, or decoding values.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// A `DynamicValue` (or raw state buffer) held neither msgpack nor JSON bytes.
    #[error("empty envelope: neither msgpack nor JSON bytes were set")]
    EmptyEnvelope,

    /// The wire bytes did not match the expected type.
    #[error("{}", at_path(.path, .message))]
    DecodeShape {
        /// Where the mismatch was detected.
        path: AttributePath,
        /// What went wrong.
        message: String,
    },

    /// A token was well-shaped but its content could not be parsed.
    #[error("{}", at_path(.path, .message))]
    DecodeValue {
        /// Where the token was read.
        path: AttributePath,
        /// What went wrong.
        message: String,
    },

    /// A value could not be written in the requested wire format.
    #[error("{}", at_path(.path, .message))]
    Encode {
        /// The value that could not be encoded.
        path: AttributePath,
        /// What went wrong.
        message: String,
    },

    /// A value payload disagrees with its declared type.
    #[error("{}", at_path(.path, .message))]
    TypeMismatch {
        /// The offending element, relative to the value being built.
        path: AttributePath,
        /// What went wrong.
        message: String,
    },

    /// A type description named a tag the codec does not understand.
    #[error("unknown type: {0}")]
    UnknownType(String),

    /// A schema declared a nesting mode that cannot be turned into a type.
    #[error("invalid nesting mode: {0}")]
    InvalidNestingMode(String),

    /// A block declared a nested block and an attribute under the same name.
    #[error("block {0:?} has the same name as an attribute")]
    NameConflict(String),

    /// A path step does not exist in the value or type being walked.
    #[error("{}", at_path(.path, "step does not resolve"))]
    InvalidStep {
        /// The path up to and including the step that failed.
        path: AttributePath,
    },

    /// Legacy flatmap state was handed to a decoder.
    #[error("flatmap states cannot be unmarshaled, only states written in the JSON form can be")]
    FlatmapUnsupported,

    /// The consumer of a stream asked the producer to stop.
    #[error("stop requested")]
    StopRequested,
}

fn at_path(path: &AttributePath, message: &str) -> String {
    if path.is_empty() {
        message.to_string()
    } else {
        format!("{}: {}", path, message)
    }
}

impl Error {
    /// Build a [`Error::DecodeShape`] at `path`.
    pub fn decode_shape(path: &AttributePath, message: impl Into<String>) -> Self {
        Self::DecodeShape {
            path: path.clone(),
            message: message.into(),
        }
    }

    /// Build a [`Error::DecodeValue`] at `path`.
    pub fn decode_value(path: &AttributePath, message: impl Into<String>) -> Self {
        Self::DecodeValue {
            path: path.clone(),
            message: message.into(),
        }
    }

    /// Build a [`Error::Encode`] at `path`.
    pub fn encode(path: &AttributePath, message: impl Into<String>) -> Self {
        Self::Encode {
            path: path.clone(),
            message: message.into(),
        }
    }

    /// Build a [`Error::TypeMismatch`] at `path`.
    pub fn type_mismatch(path: &AttributePath, message: impl Into<String>) -> Self {
        Self::TypeMismatch {
            path: path.clone(),
            message: message.into(),
        }
    }

    /// The path attached to this error, if its kind carries one.
    pub fn path(&self) -> Option<&AttributePath> {
        match self {
            Self::DecodeShape { path, .. }
            | Self::DecodeValue { path, .. }
            | Self::Encode { path, .. }
            | Self::TypeMismatch { path, .. }
            | Self::InvalidStep { path } => Some(path),
            _ => None,
        }
    }

    /// Re-anchor a relative path under `prefix`.
    ///
    /// Constructors report positions relative to the value being built; callers
    /// that know where that value sits use this to produce an absolute path.
    pub fn prefixed(self, prefix: &AttributePath) -> Self {
        match self {
            Self::DecodeShape { path, message } => Self::DecodeShape {
                path: prefix.join(&path),
                message,
            },
            Self::DecodeValue { path, message } => Self::DecodeValue {
                path: prefix.join(&path),
                message,
            },
            Self::Encode { path, message } => Self::Encode {
                path: prefix.join(&path),
                message,
            },
            Self::TypeMismatch { path, message } => Self::TypeMismatch {
                path: prefix.join(&path),
                message,
            },
            Self::InvalidStep { path } => Self::InvalidStep {
                path: prefix.join(&path),
            },
            other => other,
        }
    }

    /// Turn a construction failure met while decoding into a shape error at `path`.
    pub(crate) fn into_decode_shape(self, path: &AttributePath) -> Self {
        match self.prefixed(path) {
            Self::TypeMismatch { path, message } => Self::DecodeShape { path, message },
            other => other,
        }
    }
}

/// Errors that can occur when implementing a provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The requested resource was not found.
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// A validation error occurred.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A configuration error occurred.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The requested resource, data source, or function type is unknown.
    #[error("Unknown type: {0}")]
    UnknownType(String),

    /// A value could not be built, walked, encoded, or decoded.
    #[error("Value error: {0}")]
    Value(#[from] Error),

    /// Resource already exists (create conflict).
    #[error("Resource already exists: {0}")]
    AlreadyExists(String),

    /// Permission denied (authentication/authorization failure).
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Operation failed due to current state (precondition not met).
    #[error("Failed precondition: {0}")]
    FailedPrecondition(String),

    /// Operation not implemented.
    #[error("Unimplemented: {0}")]
    Unimplemented(String),
}

impl ProviderError {
    /// The attribute path this error points at, if any.
    pub fn path(&self) -> Option<&AttributePath> {
        match self {
            Self::Value(err) => err.path(),
            _ => None,
        }
    }
}

impl From<Error> for tonic::Status {
    fn from(err: Error) -> Self {
        match err {
            Error::StopRequested => tonic::Status::cancelled(err.to_string()),
            Error::Encode { .. } => tonic::Status::internal(err.to_string()),
            _ => tonic::Status::invalid_argument(err.to_string()),
        }
    }
}

impl From<ProviderError> for tonic::Status {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::NotFound(msg) => tonic::Status::not_found(msg),
            ProviderError::Validation(msg) => tonic::Status::invalid_argument(msg),
            ProviderError::Configuration(msg) => tonic::Status::failed_precondition(msg),
            ProviderError::UnknownType(msg) => tonic::Status::not_found(msg),
            ProviderError::Value(err) => err.into(),
            ProviderError::AlreadyExists(msg) => tonic::Status::already_exists(msg),
            ProviderError::PermissionDenied(msg) => tonic::Status::permission_denied(msg),
            ProviderError::FailedPrecondition(msg) => tonic::Status::failed_precondition(msg),
            ProviderError::Unimplemented(msg) => tonic::Status::unimplemented(msg),
        }
    }
}
