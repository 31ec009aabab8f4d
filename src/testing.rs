//! Testing utilities for provider implementations.
//!
//! [`ProviderTester`] drives a `ProviderService` through a [`Dispatcher`], so
//! every value makes the same trip it would over the wire: encoded into a
//! [`DynamicValue`] against the registered schema, decoded by the dispatcher,
//! handed to the provider, and encoded again on the way back.
//!
//! # Example
//!
//! ```ignore
//! use hemmer_plugin_protocol::testing::ProviderTester;
//! use hemmer_plugin_protocol::Value;
//!
//! #[tokio::test]
//! async fn test_create_resource() {
//!     let tester = ProviderTester::new(MyProvider::new());
//!
//!     let config = tester.object("my_resource", [("name", Value::from("test"))]).unwrap();
//!     let state = tester.lifecycle_create("my_resource", config).await.unwrap();
//!
//!     assert_eq!(state.get("name"), Some(&Value::from("test")));
//! }
//! ```

use std::collections::BTreeMap;

use crate::diagnostic::{has_errors, Diagnostic};
use crate::dynamic_value::{DynamicValue, RawState};
use crate::error::{Error, ProviderError};
use crate::schema::{ProviderSchema, Schema};
use crate::server::{Dispatcher, ProviderService};
use crate::stream::{ActionEvent, StateChunkAssembler};
use crate::tftypes::{AttributePath, Type, Value};
use crate::types::{
    ApplyResourceChangeRequest, CallFunctionRequest, ConfigureProviderRequest, FunctionError,
    ImportResourceStateRequest, InvokeActionRequest, PlanResourceChangeRequest, PlanResult,
    ReadDataSourceRequest, ReadResourceRequest, StateBytesRequest, UpgradeResourceStateRequest,
    ValidateConfigRequest, ValidateProviderConfigRequest,
};

/// A test harness for provider implementations.
pub struct ProviderTester<P: ProviderService> {
    dispatcher: Dispatcher<P>,
}

impl<P: ProviderService> ProviderTester<P> {
    /// Create a new tester for the given provider.
    pub fn new(provider: P) -> Self {
        Self {
            dispatcher: Dispatcher::new(provider),
        }
    }

    /// Get a reference to the underlying provider.
    pub fn provider(&self) -> &P {
        self.dispatcher.provider()
    }

    /// Get a reference to the dispatcher the tester drives.
    pub fn dispatcher(&self) -> &Dispatcher<P> {
        &self.dispatcher
    }

    // =========================================================================
    // Schema & Metadata
    // =========================================================================

    /// Get the provider's schema.
    pub fn schema(&self) -> &ProviderSchema {
        self.dispatcher.schema()
    }

    /// Get the list of resource type names.
    pub fn resource_types(&self) -> Vec<String> {
        self.dispatcher.get_metadata().resources
    }

    /// Get the list of data source type names.
    pub fn data_source_types(&self) -> Vec<String> {
        self.dispatcher.get_metadata().data_sources
    }

    /// The value type of a resource.
    pub fn resource_type(&self, type_name: &str) -> Result<Type, TestError> {
        schema_type(&self.schema().resources, "resource", type_name)
    }

    /// The value type of a data source.
    pub fn data_source_type(&self, type_name: &str) -> Result<Type, TestError> {
        schema_type(&self.schema().data_sources, "data source", type_name)
    }

    /// Build a resource object from the given attributes.
    ///
    /// Attributes left out are null of their schema type.
    pub fn object<'a, I>(&self, type_name: &str, attributes: I) -> Result<Value, TestError>
    where
        I: IntoIterator<Item = (&'a str, Value)>,
    {
        let ty = self.resource_type(type_name)?;
        fill_object(&ty, attributes)
    }

    // =========================================================================
    // Provider Lifecycle
    // =========================================================================

    /// Validate provider configuration.
    ///
    /// Returns the warnings if validation passes.
    pub async fn validate_provider_config(&self, config: Value) -> Result<Vec<Diagnostic>, TestError> {
        let config = self.encode_provider(&config)?;
        let response = self
            .dispatcher
            .validate_provider_config(ValidateProviderConfigRequest { config })
            .await;
        check_diagnostics(response.diagnostics)
    }

    /// Configure the provider.
    pub async fn configure(&self, config: Value) -> Result<Vec<Diagnostic>, TestError> {
        let config = self.encode_provider(&config)?;
        let response = self
            .dispatcher
            .configure_provider(ConfigureProviderRequest { config })
            .await;
        check_diagnostics(response.diagnostics)
    }

    /// Stop the provider.
    pub async fn stop(&self) -> Result<(), ProviderError> {
        self.dispatcher.stop_provider().await
    }

    // =========================================================================
    // Resource Operations
    // =========================================================================

    /// Validate a resource configuration.
    pub async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, TestError> {
        let ty = self.resource_type(resource_type)?;
        let response = self
            .dispatcher
            .validate_resource_config(ValidateConfigRequest {
                type_name: resource_type.to_string(),
                config: DynamicValue::new(&ty, &config)?,
            })
            .await;
        check_diagnostics(response.diagnostics)
    }

    /// Plan a resource creation (no prior state).
    pub async fn plan_create(
        &self,
        resource_type: &str,
        proposed_state: Value,
    ) -> Result<PlanResult, TestError> {
        self.plan(resource_type, None, proposed_state.clone(), proposed_state)
            .await
    }

    /// Plan a resource update.
    pub async fn plan_update(
        &self,
        resource_type: &str,
        prior_state: Value,
        proposed_state: Value,
    ) -> Result<PlanResult, TestError> {
        self.plan(
            resource_type,
            Some(prior_state),
            proposed_state.clone(),
            proposed_state,
        )
        .await
    }

    /// Plan a resource deletion.
    pub async fn plan_delete(
        &self,
        resource_type: &str,
        prior_state: Value,
    ) -> Result<PlanResult, TestError> {
        let ty = self.resource_type(resource_type)?;
        self.plan(
            resource_type,
            Some(prior_state),
            Value::null(ty.clone()),
            Value::null(ty),
        )
        .await
    }

    /// Full plan operation with explicit config.
    pub async fn plan(
        &self,
        resource_type: &str,
        prior_state: Option<Value>,
        proposed_state: Value,
        config: Value,
    ) -> Result<PlanResult, TestError> {
        let ty = self.resource_type(resource_type)?;
        let prior_state = prior_state.unwrap_or_else(|| Value::null(ty.clone()));
        let response = self
            .dispatcher
            .plan_resource_change(PlanResourceChangeRequest {
                type_name: resource_type.to_string(),
                prior_state: DynamicValue::new(&ty, &prior_state)?,
                proposed_new_state: DynamicValue::new(&ty, &proposed_state)?,
                config: DynamicValue::new(&ty, &config)?,
            })
            .await;
        let diagnostics = check_diagnostics(response.diagnostics)?;
        let planned_state = decode_required(response.planned_state, &ty)?;
        Ok(PlanResult {
            planned_state,
            requires_replace: response.requires_replace,
            diagnostics,
        })
    }

    /// Apply a planned change. Null states select create or delete.
    pub async fn apply(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
        config: Value,
    ) -> Result<Value, TestError> {
        let ty = self.resource_type(resource_type)?;
        let response = self
            .dispatcher
            .apply_resource_change(ApplyResourceChangeRequest {
                type_name: resource_type.to_string(),
                prior_state: DynamicValue::new(&ty, &prior_state)?,
                planned_state: DynamicValue::new(&ty, &planned_state)?,
                config: DynamicValue::new(&ty, &config)?,
            })
            .await;
        check_diagnostics(response.diagnostics)?;
        decode_required(response.new_state, &ty)
    }

    /// Create a new resource.
    pub async fn create(
        &self,
        resource_type: &str,
        planned_state: Value,
        config: Value,
    ) -> Result<Value, TestError> {
        let ty = self.resource_type(resource_type)?;
        self.apply(resource_type, Value::null(ty), planned_state, config)
            .await
    }

    /// Read the current state of a resource.
    pub async fn read(&self, resource_type: &str, current_state: Value) -> Result<Value, TestError> {
        let ty = self.resource_type(resource_type)?;
        let response = self
            .dispatcher
            .read_resource(ReadResourceRequest {
                type_name: resource_type.to_string(),
                current_state: DynamicValue::new(&ty, &current_state)?,
            })
            .await;
        check_diagnostics(response.diagnostics)?;
        decode_required(response.new_state, &ty)
    }

    /// Update an existing resource.
    pub async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
        config: Value,
    ) -> Result<Value, TestError> {
        self.apply(resource_type, prior_state, planned_state, config)
            .await
    }

    /// Delete a resource.
    pub async fn delete(&self, resource_type: &str, current_state: Value) -> Result<(), TestError> {
        let ty = self.resource_type(resource_type)?;
        self.apply(
            resource_type,
            current_state,
            Value::null(ty.clone()),
            Value::null(ty),
        )
        .await?;
        Ok(())
    }

    /// Import an existing resource, returning `(type_name, state)` pairs.
    pub async fn import_resource(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Vec<(String, Value)>, TestError> {
        let response = self
            .dispatcher
            .import_resource_state(ImportResourceStateRequest {
                type_name: resource_type.to_string(),
                id: id.to_string(),
            })
            .await;
        check_diagnostics(response.diagnostics)?;
        response
            .imported_resources
            .into_iter()
            .map(|imported| -> Result<(String, Value), TestError> {
                let ty = self.resource_type(&imported.type_name)?;
                Ok((imported.type_name, imported.state.unmarshal(&ty)?))
            })
            .collect()
    }

    /// Upgrade resource state stored as JSON by an older schema version.
    pub async fn upgrade_resource_state(
        &self,
        resource_type: &str,
        version: i64,
        json: &str,
    ) -> Result<Value, TestError> {
        let ty = self.resource_type(resource_type)?;
        let response = self
            .dispatcher
            .upgrade_resource_state(UpgradeResourceStateRequest {
                type_name: resource_type.to_string(),
                version,
                raw_state: RawState::from_json(json),
            })
            .await;
        check_diagnostics(response.diagnostics)?;
        decode_required(response.upgraded_state, &ty)
    }

    // =========================================================================
    // Data Source Operations
    // =========================================================================

    /// Validate a data source configuration.
    pub async fn validate_data_source_config(
        &self,
        data_source_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, TestError> {
        let ty = self.data_source_type(data_source_type)?;
        let response = self
            .dispatcher
            .validate_data_resource_config(ValidateConfigRequest {
                type_name: data_source_type.to_string(),
                config: DynamicValue::new(&ty, &config)?,
            })
            .await;
        check_diagnostics(response.diagnostics)
    }

    /// Read data from a data source.
    pub async fn read_data_source(
        &self,
        data_source_type: &str,
        config: Value,
    ) -> Result<Value, TestError> {
        let ty = self.data_source_type(data_source_type)?;
        let response = self
            .dispatcher
            .read_data_source(ReadDataSourceRequest {
                type_name: data_source_type.to_string(),
                config: DynamicValue::new(&ty, &config)?,
            })
            .await;
        check_diagnostics(response.diagnostics)?;
        decode_required(response.state, &ty)
    }

    // =========================================================================
    // Functions & Actions
    // =========================================================================

    /// Call a provider function.
    pub async fn call_function(&self, name: &str, arguments: Vec<Value>) -> Result<Value, TestError> {
        let function = self.schema().functions.get(name).ok_or_else(|| {
            TestError::Provider(ProviderError::UnknownType(format!(
                "Unknown function: {}",
                name
            )))
        })?;
        let return_type = function.return_type.clone();
        let arguments = arguments
            .iter()
            .map(|argument| DynamicValue::new(argument.ty(), argument))
            .collect::<Result<Vec<_>, _>>()?;

        let response = self
            .dispatcher
            .call_function(CallFunctionRequest {
                name: name.to_string(),
                arguments,
            })
            .await;
        if let Some(error) = response.error {
            return Err(TestError::Function(error));
        }
        decode_required(response.result, &return_type)
    }

    /// Invoke an action and collect every event it produced.
    pub async fn invoke_action(
        &self,
        action_type: &str,
        config: Value,
    ) -> Result<Vec<ActionEvent>, TestError> {
        let ty = schema_type(&self.schema().actions, "action", action_type)?;
        let events = self
            .dispatcher
            .invoke_action(InvokeActionRequest {
                type_name: action_type.to_string(),
                config: DynamicValue::new(&ty, &config)?,
            })
            .collect_events()
            .await;
        Ok(events)
    }

    /// Read a stored state file through the chunked stream.
    pub async fn read_state_bytes(&self, type_name: &str, state_id: &str) -> Result<Vec<u8>, TestError> {
        let mut chunks = self.dispatcher.read_state_bytes(StateBytesRequest {
            type_name: type_name.to_string(),
            state_id: state_id.to_string(),
        });
        let mut assembler = StateChunkAssembler::new();
        while let Some(chunk) = chunks.next_event().await {
            assembler.push(chunk)?;
        }
        let (bytes, diagnostics) = assembler.finish()?;
        check_diagnostics(diagnostics)?;
        Ok(bytes)
    }

    // =========================================================================
    // Lifecycle Helpers
    // =========================================================================

    /// Run a full create lifecycle: plan, create, read.
    ///
    /// Returns the final state after read.
    pub async fn lifecycle_create(&self, resource_type: &str, config: Value) -> Result<Value, TestError> {
        let plan = self.plan_create(resource_type, config.clone()).await?;
        let created_state = self
            .create(resource_type, plan.planned_state, config)
            .await?;
        self.read(resource_type, created_state).await
    }

    /// Run a full update lifecycle: plan, update, read.
    ///
    /// Returns the final state after read.
    pub async fn lifecycle_update(
        &self,
        resource_type: &str,
        prior_state: Value,
        proposed_state: Value,
    ) -> Result<Value, TestError> {
        let plan = self
            .plan_update(resource_type, prior_state.clone(), proposed_state.clone())
            .await?;
        let updated_state = self
            .update(resource_type, prior_state, plan.planned_state, proposed_state)
            .await?;
        self.read(resource_type, updated_state).await
    }

    /// Run a full delete lifecycle: plan, delete.
    pub async fn lifecycle_delete(&self, resource_type: &str, current_state: Value) -> Result<(), TestError> {
        let _ = self
            .plan_delete(resource_type, current_state.clone())
            .await?;
        self.delete(resource_type, current_state).await
    }

    /// Run a full CRUD lifecycle: create, read, update, read, delete.
    ///
    /// Returns the state after the update (before delete).
    pub async fn lifecycle_crud(
        &self,
        resource_type: &str,
        initial_config: Value,
        updated_config: Value,
    ) -> Result<Value, TestError> {
        let created_state = self.lifecycle_create(resource_type, initial_config).await?;
        let updated_state = self
            .lifecycle_update(resource_type, created_state, updated_config)
            .await?;
        self.lifecycle_delete(resource_type, updated_state.clone())
            .await?;
        Ok(updated_state)
    }

    fn encode_provider(&self, config: &Value) -> Result<DynamicValue, TestError> {
        let ty = self.schema().provider.value_type()?;
        Ok(DynamicValue::new(&ty, config)?)
    }
}

/// Error type for test operations that may fail with diagnostics.
#[derive(Debug)]
pub enum TestError {
    /// The operation failed with diagnostics.
    Diagnostics(Vec<Diagnostic>),
    /// The operation failed with a provider error.
    Provider(ProviderError),
    /// A function call failed.
    Function(FunctionError),
}

impl std::fmt::Display for TestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TestError::Diagnostics(diags) => {
                writeln!(f, "Operation failed with {} diagnostic(s):", diags.len())?;
                for diag in diags {
                    write!(f, "  [{:?}] {}", diag.severity, diag.summary)?;
                    if let Some(detail) = &diag.detail {
                        write!(f, ": {}", detail)?;
                    }
                    if let Some(attr) = &diag.attribute {
                        write!(f, " (at {})", attr)?;
                    }
                    writeln!(f)?;
                }
                Ok(())
            }
            TestError::Provider(e) => write!(f, "Provider error: {}", e),
            TestError::Function(e) => match e.function_argument {
                Some(index) => write!(f, "Function error in argument {}: {}", index, e.text),
                None => write!(f, "Function error: {}", e.text),
            },
        }
    }
}

impl std::error::Error for TestError {}

impl From<ProviderError> for TestError {
    fn from(e: ProviderError) -> Self {
        TestError::Provider(e)
    }
}

impl From<Error> for TestError {
    fn from(e: Error) -> Self {
        TestError::Provider(e.into())
    }
}

/// Return the non-error diagnostics, or fail with the errors.
fn check_diagnostics(diagnostics: Vec<Diagnostic>) -> Result<Vec<Diagnostic>, TestError> {
    if !has_errors(&diagnostics) {
        return Ok(diagnostics);
    }
    Err(TestError::Diagnostics(
        diagnostics.into_iter().filter(Diagnostic::is_error).collect(),
    ))
}

fn schema_type(
    schemas: &BTreeMap<String, Schema>,
    kind: &str,
    type_name: &str,
) -> Result<Type, TestError> {
    let schema = schemas.get(type_name).ok_or_else(|| {
        ProviderError::UnknownType(format!("Unknown {} type: {}", kind, type_name))
    })?;
    Ok(schema.value_type()?)
}

fn decode_required(value: Option<DynamicValue>, ty: &Type) -> Result<Value, TestError> {
    let value = value.ok_or(Error::EmptyEnvelope)?;
    Ok(value.unmarshal(ty)?)
}

fn fill_object<'a, I>(ty: &Type, attributes: I) -> Result<Value, TestError>
where
    I: IntoIterator<Item = (&'a str, Value)>,
{
    let Type::Object {
        attribute_types: types,
        ..
    } = ty
    else {
        return Err(
            Error::type_mismatch(&AttributePath::new(), format!("{} is not an object", ty)).into(),
        );
    };
    let mut values: BTreeMap<String, Value> = types
        .iter()
        .map(|(name, ty)| (name.clone(), Value::null(ty.clone())))
        .collect();
    for (name, value) in attributes {
        values.insert(name.to_string(), value);
    }
    Ok(Value::try_new(ty.clone(), values)?)
}

// =========================================================================
// Assertion Helpers
// =========================================================================

/// Assert that a plan requires resource replacement.
///
/// # Panics
///
/// Panics if the plan does not require replacement.
pub fn assert_plan_replaces(plan: &PlanResult) {
    assert!(
        plan.replaces(),
        "Expected plan to require replacement, but it does not"
    );
}

/// Assert that a plan does not require resource replacement.
///
/// # Panics
///
/// Panics if the plan requires replacement.
pub fn assert_plan_updates_in_place(plan: &PlanResult) {
    assert!(
        !plan.replaces(),
        "Expected plan to update in place, but replacement is required by {:?}",
        plan.requires_replace.iter().map(ToString::to_string).collect::<Vec<_>>()
    );
}

/// Assert that the plan changes nothing relative to `prior`.
///
/// # Panics
///
/// Panics if the planned state differs from `prior`.
pub fn assert_plan_no_changes(prior: &Value, plan: &PlanResult) {
    let changed = changed_paths(prior, plan);
    assert!(
        changed.is_empty(),
        "Expected no changes, but got {} change(s): {:?}",
        changed.len(),
        changed.iter().map(ToString::to_string).collect::<Vec<_>>()
    );
}

/// Assert that the plan changes the value at `path` relative to `prior`.
///
/// # Panics
///
/// Panics if nothing at or under `path` changed.
pub fn assert_plan_changes_attribute(prior: &Value, plan: &PlanResult, path: &AttributePath) {
    let changed = changed_paths(prior, plan);
    assert!(
        changed.iter().any(|c| c.starts_with(path)),
        "Expected plan to change attribute '{}', but it was not changed. Changed attributes: {:?}",
        path,
        changed.iter().map(ToString::to_string).collect::<Vec<_>>()
    );
}

fn changed_paths(prior: &Value, plan: &PlanResult) -> Vec<AttributePath> {
    match prior.diff(&plan.planned_state) {
        Ok(diffs) => diffs.into_iter().map(|d| d.path).collect(),
        Err(e) => panic!("Planned state cannot be compared with the prior state: {}", e),
    }
}

/// Assert that diagnostics contain no errors.
///
/// # Panics
///
/// Panics if there are any error diagnostics.
pub fn assert_no_errors(diagnostics: &[Diagnostic]) {
    let errors: Vec<_> = diagnostics.iter().filter(|d| d.is_error()).collect();

    assert!(
        errors.is_empty(),
        "Expected no errors, but got {} error(s): {:?}",
        errors.len(),
        errors.iter().map(|d| &d.summary).collect::<Vec<_>>()
    );
}

/// Assert that diagnostics contain at least one error.
///
/// # Panics
///
/// Panics if there are no error diagnostics.
pub fn assert_has_errors(diagnostics: &[Diagnostic]) {
    assert!(
        has_errors(diagnostics),
        "Expected at least one error, but got none"
    );
}

/// Assert that diagnostics contain an error with the given summary substring.
///
/// # Panics
///
/// Panics if no error diagnostic contains the given substring.
pub fn assert_error_contains(diagnostics: &[Diagnostic], substring: &str) {
    let has_matching_error = diagnostics
        .iter()
        .any(|d| d.is_error() && d.summary.contains(substring));

    assert!(
        has_matching_error,
        "Expected an error containing '{}', but no matching error found. Errors: {:?}",
        substring,
        diagnostics
            .iter()
            .filter(|d| d.is_error())
            .map(|d| &d.summary)
            .collect::<Vec<_>>()
    );
}

/// Assert that some error diagnostic points at `path`.
///
/// # Panics
///
/// Panics if no error diagnostic carries that attribute path.
pub fn assert_error_at(diagnostics: &[Diagnostic], path: &AttributePath) {
    let found = diagnostics
        .iter()
        .any(|d| d.is_error() && d.attribute.as_ref() == Some(path));

    assert!(
        found,
        "Expected an error at '{}', but errors were at {:?}",
        path,
        diagnostics
            .iter()
            .filter(|d| d.is_error())
            .map(|d| d.attribute.as_ref().map(ToString::to_string))
            .collect::<Vec<_>>()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Attribute, Function, FunctionParameter};

    // A simple test provider for testing the tester
    struct TestProvider;

    #[async_trait::async_trait]
    impl ProviderService for TestProvider {
        fn schema(&self) -> ProviderSchema {
            ProviderSchema::new()
                .with_provider_config(
                    Schema::v0().with_attribute("api_key", Attribute::optional_string()),
                )
                .with_resource(
                    "test_resource",
                    Schema::v0()
                        .with_attribute("name", Attribute::required_string())
                        .with_attribute("id", Attribute::computed_string()),
                )
                .with_function(
                    "length",
                    Function::new(Type::Number)
                        .with_parameter(FunctionParameter::new("input", Type::String)),
                )
        }

        async fn configure(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
            match config.get("api_key") {
                Some(key) if key.is_null() => Ok(vec![Diagnostic::warning("No API key set")]),
                _ => Ok(vec![]),
            }
        }

        async fn plan(
            &self,
            _resource_type: &str,
            prior_state: Option<Value>,
            proposed_state: Value,
            _config: Value,
        ) -> Result<PlanResult, ProviderError> {
            let id = match &prior_state {
                None => Value::unknown(Type::String),
                Some(prior) => prior.get("id").cloned().unwrap_or(Value::null(Type::String)),
            };
            let planned = proposed_state.transform(|path, value| {
                if *path == AttributePath::new().with_attribute_name("id") {
                    Ok(id.clone())
                } else {
                    Ok(value)
                }
            })?;
            Ok(PlanResult::with_replace_triggers(
                prior_state.as_ref(),
                planned,
                &[AttributePath::new().with_attribute_name("name")],
            )?)
        }

        async fn create(
            &self,
            _resource_type: &str,
            planned_state: Value,
            _config: Value,
        ) -> Result<Value, ProviderError> {
            Ok(planned_state.transform(|_, value| {
                if value.is_known() {
                    Ok(value)
                } else {
                    Ok(Value::from("generated-id"))
                }
            })?)
        }

        async fn read(
            &self,
            _resource_type: &str,
            current_state: Value,
        ) -> Result<Value, ProviderError> {
            Ok(current_state)
        }

        async fn update(
            &self,
            _resource_type: &str,
            _prior_state: Value,
            planned_state: Value,
            _config: Value,
        ) -> Result<Value, ProviderError> {
            Ok(planned_state)
        }

        async fn delete(
            &self,
            _resource_type: &str,
            _current_state: Value,
        ) -> Result<(), ProviderError> {
            Ok(())
        }

        async fn call_function(
            &self,
            _name: &str,
            arguments: Vec<Value>,
        ) -> Result<Value, FunctionError> {
            let input: String = arguments[0]
                .to()
                .map_err(|e| FunctionError::argument(0, e.to_string()))?;
            Ok(Value::from(input.chars().count() as i64))
        }
    }

    fn named(tester: &ProviderTester<TestProvider>, name: &str) -> Value {
        tester
            .object("test_resource", [("name", Value::from(name))])
            .unwrap()
    }

    #[tokio::test]
    async fn test_tester_configure() {
        let tester = ProviderTester::new(TestProvider);
        let config = Value::object([("api_key".to_string(), Value::from("test"))]);
        let warnings = tester.configure(config).await.unwrap();
        assert!(warnings.is_empty());
    }

    #[tokio::test]
    async fn test_tester_configure_returns_warnings() {
        let tester = ProviderTester::new(TestProvider);
        let config = Value::object([("api_key".to_string(), Value::null(Type::String))]);
        let warnings = tester.configure(config).await.unwrap();
        assert_eq!(warnings.len(), 1);
    }

    #[tokio::test]
    async fn test_tester_schema() {
        let tester = ProviderTester::new(TestProvider);
        assert!(tester.schema().resources.contains_key("test_resource"));
        assert!(tester.resource_types().contains(&"test_resource".to_string()));
    }

    #[tokio::test]
    async fn test_tester_validate_reports_path() {
        let tester = ProviderTester::new(TestProvider);
        let config = tester.object("test_resource", []).unwrap();
        let err = tester
            .validate_resource_config("test_resource", config)
            .await
            .unwrap_err();

        let TestError::Diagnostics(diags) = err else {
            panic!("expected diagnostics");
        };
        assert_error_at(&diags, &AttributePath::new().with_attribute_name("name"));
        assert_error_contains(&diags, "Missing required attribute");
    }

    #[tokio::test]
    async fn test_tester_plan_create() {
        let tester = ProviderTester::new(TestProvider);
        let plan = tester
            .plan_create("test_resource", named(&tester, "test"))
            .await
            .unwrap();

        assert_plan_updates_in_place(&plan);
        assert!(!plan.planned_state.get("id").unwrap().is_known());
    }

    #[tokio::test]
    async fn test_tester_plan_update_replaces() {
        let tester = ProviderTester::new(TestProvider);
        let prior = tester
            .object(
                "test_resource",
                [("name", Value::from("old")), ("id", Value::from("123"))],
            )
            .unwrap();
        let plan = tester
            .plan_update("test_resource", prior.clone(), named(&tester, "new"))
            .await
            .unwrap();

        assert_plan_replaces(&plan);
        assert_plan_changes_attribute(&prior, &plan, &AttributePath::new().with_attribute_name("name"));
        assert_eq!(plan.planned_state.get("id"), Some(&Value::from("123")));
    }

    #[tokio::test]
    async fn test_tester_plan_update_no_changes() {
        let tester = ProviderTester::new(TestProvider);
        let state = tester
            .object(
                "test_resource",
                [("name", Value::from("same")), ("id", Value::from("123"))],
            )
            .unwrap();
        let plan = tester
            .plan_update("test_resource", state.clone(), state.clone())
            .await
            .unwrap();

        assert_plan_no_changes(&state, &plan);
        assert_plan_updates_in_place(&plan);
    }

    #[tokio::test]
    async fn test_tester_lifecycle_create() {
        let tester = ProviderTester::new(TestProvider);
        let state = tester
            .lifecycle_create("test_resource", named(&tester, "test"))
            .await
            .unwrap();

        assert_eq!(state.get("name"), Some(&Value::from("test")));
        assert_eq!(state.get("id"), Some(&Value::from("generated-id")));
    }

    #[tokio::test]
    async fn test_tester_lifecycle_crud() {
        let tester = ProviderTester::new(TestProvider);
        let final_state = tester
            .lifecycle_crud(
                "test_resource",
                named(&tester, "initial"),
                named(&tester, "updated"),
            )
            .await
            .unwrap();

        assert_eq!(final_state.get("name"), Some(&Value::from("updated")));
    }

    #[tokio::test]
    async fn test_tester_upgrade_resource_state() {
        let tester = ProviderTester::new(TestProvider);
        let state = tester
            .upgrade_resource_state("test_resource", 0, r#"{"name":"a","id":"1"}"#)
            .await
            .unwrap();
        assert_eq!(state.get("id"), Some(&Value::from("1")));
    }

    #[tokio::test]
    async fn test_tester_call_function() {
        let tester = ProviderTester::new(TestProvider);
        let result = tester
            .call_function("length", vec![Value::from("hello")])
            .await
            .unwrap();
        assert_eq!(result.to::<i64>().unwrap(), 5);

        let err = tester
            .call_function("length", vec![Value::null(Type::String)])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TestError::Function(FunctionError { function_argument: Some(0), .. })
        ));
    }

    #[tokio::test]
    async fn test_tester_unknown_resource_type() {
        let tester = ProviderTester::new(TestProvider);
        let err = tester.resource_type("missing").unwrap_err();
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn test_assert_no_errors() {
        let diagnostics = vec![Diagnostic::warning("Just a warning")];
        assert_no_errors(&diagnostics);
    }

    #[test]
    #[should_panic(expected = "Expected no errors")]
    fn test_assert_no_errors_fails() {
        let diagnostics = vec![Diagnostic::error("An error")];
        assert_no_errors(&diagnostics);
    }

    #[test]
    fn test_assert_has_errors() {
        let diagnostics = vec![Diagnostic::error("An error")];
        assert_has_errors(&diagnostics);
    }

    #[test]
    fn test_assert_error_contains() {
        let diagnostics = vec![Diagnostic::error("Invalid configuration value")];
        assert_error_contains(&diagnostics, "Invalid");
        assert_error_contains(&diagnostics, "configuration");
    }

    #[test]
    #[should_panic(expected = "Expected an error at")]
    fn test_assert_error_at_fails() {
        let diagnostics = vec![Diagnostic::error("An error")];
        assert_error_at(&diagnostics, &AttributePath::new().with_attribute_name("name"));
    }

    #[test]
    fn test_test_error_display() {
        let err = TestError::Diagnostics(vec![
            Diagnostic::error("First error")
                .with_attribute(AttributePath::new().with_attribute_name("field1")),
            Diagnostic::error("Second error").with_detail("More info"),
        ]);

        let display = format!("{}", err);
        assert!(display.contains("First error"));
        assert!(display.contains("Second error"));
        assert!(display.contains("field1"));
        assert!(display.contains("More info"));
    }
}
