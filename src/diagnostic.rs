//! Diagnostics returned to the orchestrator alongside RPC results.

use serde::{Deserialize, Serialize};

use crate::error::{Error, ProviderError};
use crate::tftypes::AttributePath;

/// Diagnostic severity level.
///
/// The discriminants match the wire enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticSeverity {
    /// Unset severity. Never produced by this crate.
    #[default]
    Invalid = 0,
    /// An error that prevents the operation from completing.
    Error = 1,
    /// A warning that doesn't prevent the operation but should be addressed.
    Warning = 2,
}

/// A diagnostic message from the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// The severity of the diagnostic.
    pub severity: DiagnosticSeverity,
    /// A short summary of the issue.
    pub summary: String,
    /// A detailed description of the issue.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// The attribute path where the issue occurred.
    #[serde(skip)]
    pub attribute: Option<AttributePath>,
}

impl Diagnostic {
    /// Create an error diagnostic.
    pub fn error(summary: impl Into<String>) -> Self {
        Self {
            severity: DiagnosticSeverity::Error,
            summary: summary.into(),
            detail: None,
            attribute: None,
        }
    }

    /// Create a warning diagnostic.
    pub fn warning(summary: impl Into<String>) -> Self {
        Self {
            severity: DiagnosticSeverity::Warning,
            summary: summary.into(),
            detail: None,
            attribute: None,
        }
    }

    /// Add detail to this diagnostic.
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Set the attribute path for this diagnostic.
    pub fn with_attribute(mut self, attribute: AttributePath) -> Self {
        self.attribute = Some(attribute);
        self
    }

    /// Whether this is an error diagnostic.
    pub fn is_error(&self) -> bool {
        self.severity == DiagnosticSeverity::Error
    }

    /// Whether this is a warning diagnostic.
    pub fn is_warning(&self) -> bool {
        self.severity == DiagnosticSeverity::Warning
    }
}

impl From<&Error> for Diagnostic {
    fn from(err: &Error) -> Self {
        let diagnostic = Diagnostic::error(summary_for(err)).with_detail(err.to_string());
        match err.path() {
            Some(path) if !path.is_empty() => diagnostic.with_attribute(path.clone()),
            _ => diagnostic,
        }
    }
}

impl From<Error> for Diagnostic {
    fn from(err: Error) -> Self {
        Self::from(&err)
    }
}

impl From<ProviderError> for Diagnostic {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Value(inner) => Self::from(&inner),
            other => Diagnostic::error(other.to_string()),
        }
    }
}

fn summary_for(err: &Error) -> &'static str {
    match err {
        Error::EmptyEnvelope => "Empty value envelope",
        Error::DecodeShape { .. } | Error::DecodeValue { .. } => "Invalid value",
        Error::Encode { .. } => "Value could not be encoded",
        Error::TypeMismatch { .. } => "Type mismatch",
        Error::UnknownType(_) => "Unknown type",
        Error::InvalidNestingMode(_) | Error::NameConflict(_) => "Invalid schema",
        Error::InvalidStep { .. } => "Invalid attribute path",
        Error::FlatmapUnsupported => "Unsupported state format",
        Error::StopRequested => "Operation cancelled",
    }
}

/// Whether any diagnostic in `diagnostics` is an error.
pub fn has_errors(diagnostics: &[Diagnostic]) -> bool {
    diagnostics.iter().any(Diagnostic::is_error)
}
