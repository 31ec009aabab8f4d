//! Request, response, and result types for provider operations.
//!
//! The `*Request`/`*Response` structs are the envelope level: every value
//! travels as a [`DynamicValue`] whose type comes from the registered schema.
//! The remaining types are what provider business logic works with once
//! values have been decoded.

use serde::{Deserialize, Serialize};

use crate::diagnostic::Diagnostic;
use crate::dynamic_value::{DynamicValue, RawIdentity, RawState};
use crate::error::Error;
use crate::tftypes::{AttributePath, Value};

/// The result of a plan operation.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanResult {
    /// The planned state after the operation.
    pub planned_state: Value,
    /// Attributes whose change forces the resource to be replaced.
    pub requires_replace: Vec<AttributePath>,
    /// Diagnostics to return alongside the plan.
    pub diagnostics: Vec<Diagnostic>,
}

impl PlanResult {
    /// Plan `state` as-is, updating in place.
    pub fn no_change(state: Value) -> Self {
        Self {
            planned_state: state,
            requires_replace: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    /// Plan `planned_state`, replacing the resource if any attribute under one
    /// of `replace_triggers` differs from `prior_state`.
    ///
    /// Creating a resource (no prior state) never requires replacement.
    pub fn with_replace_triggers(
        prior_state: Option<&Value>,
        planned_state: Value,
        replace_triggers: &[AttributePath],
    ) -> Result<Self, Error> {
        let mut requires_replace = Vec::new();
        if let Some(prior) = prior_state.filter(|prior| !prior.is_null()) {
            for change in prior.diff(&planned_state)? {
                let trigger = replace_triggers
                    .iter()
                    .find(|trigger| change.path.starts_with(trigger));
                if let Some(trigger) = trigger {
                    if !requires_replace.contains(trigger) {
                        requires_replace.push(trigger.clone());
                    }
                }
            }
        }
        Ok(Self {
            planned_state,
            requires_replace,
            diagnostics: Vec::new(),
        })
    }

    /// Add a diagnostic to the plan.
    pub fn with_diagnostic(mut self, diagnostic: Diagnostic) -> Self {
        self.diagnostics.push(diagnostic);
        self
    }

    /// Whether applying this plan replaces the resource.
    pub fn replaces(&self) -> bool {
        !self.requires_replace.is_empty()
    }
}

/// An imported resource.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportedResource {
    /// The resource type.
    pub type_name: String,
    /// The imported state.
    pub state: Value,
}

impl ImportedResource {
    /// Create a new imported resource.
    pub fn new(type_name: impl Into<String>, state: Value) -> Self {
        Self {
            type_name: type_name.into(),
            state,
        }
    }
}

/// An opened ephemeral resource.
#[derive(Debug, Clone, PartialEq)]
pub struct EphemeralResult {
    /// The ephemeral value, never persisted.
    pub result: Value,
    /// Opaque provider data handed back on close.
    pub private: Vec<u8>,
}

/// Provider metadata returned by GetMetadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ProviderMetadata {
    /// List of resource type names.
    pub resources: Vec<String>,
    /// List of data source type names.
    pub data_sources: Vec<String>,
    /// List of ephemeral resource type names.
    pub ephemeral_resources: Vec<String>,
    /// List of action type names.
    pub actions: Vec<String>,
    /// List of function names.
    pub functions: Vec<String>,
    /// Server capabilities.
    pub capabilities: ServerCapabilities,
}

/// Server capability flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ServerCapabilities {
    /// Whether the provider supports planning destroy operations.
    pub plan_destroy: bool,
    /// Whether the orchestrator may skip fetching the full schema.
    pub get_provider_schema_optional: bool,
}

/// A function call failure, optionally blamed on one argument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionError {
    /// What went wrong.
    pub text: String,
    /// Index of the offending argument.
    pub function_argument: Option<i64>,
}

impl FunctionError {
    /// An error not tied to an argument.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            function_argument: None,
        }
    }

    /// An error caused by the argument at `index`.
    pub fn argument(index: usize, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            function_argument: Some(index as i64),
        }
    }
}

/// ValidateProviderConfig request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidateProviderConfigRequest {
    /// Provider configuration.
    pub config: DynamicValue,
}

/// ConfigureProvider request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigureProviderRequest {
    /// Provider configuration.
    pub config: DynamicValue,
}

/// Response carrying only diagnostics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiagnosticsResponse {
    /// Diagnostics raised by the operation.
    pub diagnostics: Vec<Diagnostic>,
}

/// Validate{Resource,DataResource,EphemeralResource,Action}Config request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidateConfigRequest {
    /// Type name the configuration belongs to.
    pub type_name: String,
    /// The configuration.
    pub config: DynamicValue,
}

/// UpgradeResourceState request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpgradeResourceStateRequest {
    /// Resource type.
    pub type_name: String,
    /// Schema version the state was written with.
    pub version: i64,
    /// The stored state.
    pub raw_state: RawState,
}

/// UpgradeResourceState response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpgradeResourceStateResponse {
    /// State in the current schema's shape.
    pub upgraded_state: Option<DynamicValue>,
    /// Diagnostics raised by the upgrade.
    pub diagnostics: Vec<Diagnostic>,
}

/// UpgradeResourceIdentity request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpgradeResourceIdentityRequest {
    /// Resource type.
    pub type_name: String,
    /// Identity schema version the identity was written with.
    pub version: i64,
    /// The stored identity.
    pub raw_identity: RawIdentity,
}

/// UpgradeResourceIdentity response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpgradeResourceIdentityResponse {
    /// Identity in the current identity schema's shape.
    pub upgraded_identity: Option<DynamicValue>,
    /// Diagnostics raised by the upgrade.
    pub diagnostics: Vec<Diagnostic>,
}

/// PlanResourceChange request.
///
/// A null prior state plans a create; a null proposed state plans a destroy.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlanResourceChangeRequest {
    /// Resource type.
    pub type_name: String,
    /// Current state.
    pub prior_state: DynamicValue,
    /// Configuration merged with prior state.
    pub proposed_new_state: DynamicValue,
    /// Configuration alone.
    pub config: DynamicValue,
}

/// PlanResourceChange response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlanResourceChangeResponse {
    /// The planned state.
    pub planned_state: Option<DynamicValue>,
    /// Attributes whose change forces replacement.
    pub requires_replace: Vec<AttributePath>,
    /// Diagnostics raised by planning.
    pub diagnostics: Vec<Diagnostic>,
}

/// ApplyResourceChange request.
///
/// A null prior state creates; a null planned state deletes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApplyResourceChangeRequest {
    /// Resource type.
    pub type_name: String,
    /// Current state.
    pub prior_state: DynamicValue,
    /// State returned by the plan.
    pub planned_state: DynamicValue,
    /// Configuration.
    pub config: DynamicValue,
}

/// Response carrying a new state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewStateResponse {
    /// The resulting state.
    pub new_state: Option<DynamicValue>,
    /// Diagnostics raised by the operation.
    pub diagnostics: Vec<Diagnostic>,
}

/// ReadResource request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadResourceRequest {
    /// Resource type.
    pub type_name: String,
    /// Last known state.
    pub current_state: DynamicValue,
}

/// ImportResourceState request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportResourceStateRequest {
    /// Resource type.
    pub type_name: String,
    /// User-supplied import identifier.
    pub id: String,
}

/// One resource produced by an import.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportedResourceState {
    /// Resource type.
    pub type_name: String,
    /// Imported state.
    pub state: DynamicValue,
}

/// ImportResourceState response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportResourceStateResponse {
    /// Imported resources.
    pub imported_resources: Vec<ImportedResourceState>,
    /// Diagnostics raised by the import.
    pub diagnostics: Vec<Diagnostic>,
}

/// ReadDataSource request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadDataSourceRequest {
    /// Data source type.
    pub type_name: String,
    /// Configuration.
    pub config: DynamicValue,
}

/// ReadDataSource response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadDataSourceResponse {
    /// The data read.
    pub state: Option<DynamicValue>,
    /// Diagnostics raised by the read.
    pub diagnostics: Vec<Diagnostic>,
}

/// CallFunction request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallFunctionRequest {
    /// Function name.
    pub name: String,
    /// Positional arguments.
    pub arguments: Vec<DynamicValue>,
}

/// CallFunction response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallFunctionResponse {
    /// The result, absent on error.
    pub result: Option<DynamicValue>,
    /// Why the call failed.
    pub error: Option<FunctionError>,
}

/// OpenEphemeralResource request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OpenEphemeralResourceRequest {
    /// Ephemeral resource type.
    pub type_name: String,
    /// Configuration.
    pub config: DynamicValue,
}

/// OpenEphemeralResource response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OpenEphemeralResourceResponse {
    /// The ephemeral value.
    pub result: Option<DynamicValue>,
    /// Opaque provider data to pass back on close.
    pub private: Vec<u8>,
    /// Diagnostics raised while opening.
    pub diagnostics: Vec<Diagnostic>,
}

/// CloseEphemeralResource request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CloseEphemeralResourceRequest {
    /// Ephemeral resource type.
    pub type_name: String,
    /// Data returned by open.
    pub private: Vec<u8>,
}

/// InvokeAction request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InvokeActionRequest {
    /// Action type.
    pub type_name: String,
    /// Action configuration.
    pub config: DynamicValue,
}

/// ReadStateBytes / WriteStateBytes request header.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateBytesRequest {
    /// State store type.
    pub type_name: String,
    /// Identifier of the state within the store.
    pub state_id: String,
}
