//! The provider trait and the dispatcher that binds it to envelope-level requests.
//!
//! Providers implement [`ProviderService`] and work with decoded [`Value`]s.
//! A [`Dispatcher`] sits between the transport and the provider: for each
//! request it resolves the expected [`Type`] from the registered schema,
//! decodes every [`DynamicValue`], runs schema validation where it applies,
//! calls the provider, and encodes the result. Failures never escape as
//! errors. They come back as [`Diagnostic`]s that carry the attribute path
//! of the offending value.
//!
//! Streaming operations (action invocation and state bytes) run the provider
//! on a spawned task and hand back an [`EventStream`].

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use tokio_stream::{Stream, StreamExt};
use tracing::{debug, error, info, instrument, trace, warn, Instrument};

use crate::diagnostic::{has_errors, Diagnostic};
use crate::dynamic_value::{DynamicValue, RawIdentity, RawState};
use crate::error::{Error, ProviderError};
use crate::schema::{ProviderSchema, Schema};
use crate::stream::{
    event_channel, send_state_bytes, ActionEvent, ByteRange, EventSender, EventStream, StateChunk,
    StateChunkAssembler, StreamOptions,
};
use crate::tftypes::{Type, Value};
use crate::types::{
    ApplyResourceChangeRequest, CallFunctionRequest, CallFunctionResponse,
    CloseEphemeralResourceRequest, ConfigureProviderRequest, DiagnosticsResponse, EphemeralResult,
    FunctionError, ImportResourceStateRequest, ImportResourceStateResponse, ImportedResource,
    ImportedResourceState, InvokeActionRequest, NewStateResponse, OpenEphemeralResourceRequest,
    OpenEphemeralResourceResponse, PlanResourceChangeRequest, PlanResourceChangeResponse,
    PlanResult, ProviderMetadata, ReadDataSourceRequest, ReadDataSourceResponse,
    ReadResourceRequest, StateBytesRequest, UpgradeResourceIdentityRequest,
    UpgradeResourceIdentityResponse, UpgradeResourceStateRequest, UpgradeResourceStateResponse,
    ValidateConfigRequest, ValidateProviderConfigRequest,
};
use crate::validation;

/// Trait that provider implementations must implement.
///
/// All values arrive decoded against the schema registered for their type
/// name, and results are encoded the same way.
///
/// # Example
///
/// ```ignore
/// use hemmer_plugin_protocol::{ProviderService, ProviderError, PlanResult, ProviderSchema, Value};
/// use hemmer_plugin_protocol::schema::{Schema, Attribute};
/// use hemmer_plugin_protocol::diagnostic::Diagnostic;
///
/// struct MyProvider;
///
/// #[async_trait::async_trait]
/// impl ProviderService for MyProvider {
///     fn schema(&self) -> ProviderSchema {
///         ProviderSchema::new()
///             .with_resource("example_resource", Schema::v0()
///                 .with_attribute("name", Attribute::required_string()))
///     }
///
///     async fn configure(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
///         Ok(vec![])
///     }
///
///     // ... implement other methods
/// }
/// ```
#[async_trait::async_trait]
pub trait ProviderService: Send + Sync + 'static {
    // =========================================================================
    // Schema & Metadata
    // =========================================================================

    /// Return the provider's schema for every surface it exposes.
    fn schema(&self) -> ProviderSchema;

    /// Return provider metadata for performance optimization.
    /// By default, this is derived from the schema.
    fn metadata(&self) -> ProviderMetadata {
        let schema = self.schema();
        ProviderMetadata {
            resources: schema.resources.keys().cloned().collect(),
            data_sources: schema.data_sources.keys().cloned().collect(),
            ephemeral_resources: schema.ephemeral_resources.keys().cloned().collect(),
            actions: schema.actions.keys().cloned().collect(),
            functions: schema.functions.keys().cloned().collect(),
            capabilities: Default::default(),
        }
    }

    // =========================================================================
    // Provider Lifecycle
    // =========================================================================

    /// Validate the provider configuration before configuring.
    /// Returns diagnostics (errors and warnings).
    async fn validate_provider_config(
        &self,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        let _ = config;
        Ok(vec![])
    }

    /// Configure the provider with credentials and settings.
    /// Returns diagnostics (errors and warnings).
    async fn configure(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError>;

    /// Stop the provider gracefully.
    async fn stop(&self) -> Result<(), ProviderError> {
        Ok(())
    }

    // =========================================================================
    // Resource Operations
    // =========================================================================

    /// Validate a resource's configuration before planning.
    async fn validate_resource_config(
        &self,
        type_name: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        let _ = (type_name, config);
        Ok(vec![])
    }

    /// Upgrade resource state written by an older schema version.
    ///
    /// `current_type` is the type of the current schema. By default the
    /// stored JSON is decoded directly against it.
    async fn upgrade_resource_state(
        &self,
        type_name: &str,
        version: i64,
        raw_state: RawState,
        current_type: &Type,
    ) -> Result<Value, ProviderError> {
        let _ = (type_name, version);
        Ok(raw_state.unmarshal(current_type)?)
    }

    /// Upgrade a resource identity written by an older identity schema version.
    async fn upgrade_resource_identity(
        &self,
        type_name: &str,
        version: i64,
        raw_identity: RawIdentity,
        current_type: &Type,
    ) -> Result<Value, ProviderError> {
        let _ = (type_name, version);
        Ok(raw_identity.unmarshal(current_type)?)
    }

    /// Plan changes for a resource.
    ///
    /// `prior_state` is `None` when the resource is being created.
    async fn plan(
        &self,
        type_name: &str,
        prior_state: Option<Value>,
        proposed_state: Value,
        config: Value,
    ) -> Result<PlanResult, ProviderError>;

    /// Create a new resource.
    async fn create(
        &self,
        type_name: &str,
        planned_state: Value,
        config: Value,
    ) -> Result<Value, ProviderError>;

    /// Read the current state of a resource.
    ///
    /// Return a null value if the resource no longer exists.
    async fn read(&self, type_name: &str, current_state: Value) -> Result<Value, ProviderError>;

    /// Update an existing resource.
    async fn update(
        &self,
        type_name: &str,
        prior_state: Value,
        planned_state: Value,
        config: Value,
    ) -> Result<Value, ProviderError>;

    /// Delete a resource.
    async fn delete(&self, type_name: &str, current_state: Value) -> Result<(), ProviderError>;

    /// Import existing infrastructure into management.
    async fn import_resource(
        &self,
        type_name: &str,
        _id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError> {
        Err(ProviderError::Unimplemented(format!(
            "Import not supported for resource type: {}",
            type_name
        )))
    }

    // =========================================================================
    // Data Source Operations
    // =========================================================================

    /// Validate a data source's configuration.
    async fn validate_data_source_config(
        &self,
        type_name: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        let _ = (type_name, config);
        Ok(vec![])
    }

    /// Read data from an external source.
    async fn read_data_source(
        &self,
        type_name: &str,
        _config: Value,
    ) -> Result<Value, ProviderError> {
        Err(ProviderError::UnknownType(format!(
            "Unknown data source type: {}",
            type_name
        )))
    }

    // =========================================================================
    // Functions
    // =========================================================================

    /// Call a provider function with decoded arguments.
    ///
    /// Arguments have already been checked against the function's parameters.
    async fn call_function(
        &self,
        name: &str,
        _arguments: Vec<Value>,
    ) -> Result<Value, FunctionError> {
        Err(FunctionError::new(format!(
            "Function not implemented: {}",
            name
        )))
    }

    // =========================================================================
    // Ephemeral Resources
    // =========================================================================

    /// Validate an ephemeral resource's configuration.
    async fn validate_ephemeral_resource_config(
        &self,
        type_name: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        let _ = (type_name, config);
        Ok(vec![])
    }

    /// Open an ephemeral resource.
    async fn open_ephemeral_resource(
        &self,
        type_name: &str,
        _config: Value,
    ) -> Result<EphemeralResult, ProviderError> {
        Err(ProviderError::Unimplemented(format!(
            "Ephemeral resources not supported: {}",
            type_name
        )))
    }

    /// Release an ephemeral resource opened earlier.
    async fn close_ephemeral_resource(
        &self,
        type_name: &str,
        private: Vec<u8>,
    ) -> Result<(), ProviderError> {
        let _ = (type_name, private);
        Ok(())
    }

    // =========================================================================
    // Actions
    // =========================================================================

    /// Validate an action's configuration.
    async fn validate_action_config(
        &self,
        type_name: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        let _ = (type_name, config);
        Ok(vec![])
    }

    /// Run an action, reporting progress through `events`.
    ///
    /// The dispatcher emits [`ActionEvent::Started`] before calling this and
    /// the terminal event after it returns. Propagating the
    /// [`Error::StopRequested`] returned by [`EventSender::emit`] ends the
    /// action as cancelled.
    async fn invoke_action(
        &self,
        type_name: &str,
        _config: Value,
        _events: &EventSender<ActionEvent>,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        Err(ProviderError::Unimplemented(format!(
            "Action not supported: {}",
            type_name
        )))
    }

    // =========================================================================
    // State Storage
    // =========================================================================

    /// Load a stored state file.
    async fn read_state_bytes(
        &self,
        type_name: &str,
        _state_id: &str,
    ) -> Result<Vec<u8>, ProviderError> {
        Err(ProviderError::Unimplemented(format!(
            "State storage not supported: {}",
            type_name
        )))
    }

    /// Store a state file.
    async fn write_state_bytes(
        &self,
        type_name: &str,
        _state_id: &str,
        _bytes: Vec<u8>,
    ) -> Result<(), ProviderError> {
        Err(ProviderError::Unimplemented(format!(
            "State storage not supported: {}",
            type_name
        )))
    }
}

/// Binds a [`ProviderService`] to envelope-level requests.
pub struct Dispatcher<P: ProviderService> {
    provider: Arc<P>,
    schema: ProviderSchema,
    options: StreamOptions,
}

impl<P: ProviderService> Dispatcher<P> {
    /// Create a dispatcher for `provider`, capturing its schema.
    pub fn new(provider: P) -> Self {
        Self::from_arc(Arc::new(provider))
    }

    /// Create a dispatcher for a shared provider.
    pub fn from_arc(provider: Arc<P>) -> Self {
        let schema = provider.schema();
        Self {
            provider,
            schema,
            options: StreamOptions::default(),
        }
    }

    /// Use `options` for streaming operations.
    pub fn with_options(mut self, options: StreamOptions) -> Self {
        self.options = options;
        self
    }

    /// The underlying provider.
    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// The schema captured at construction.
    pub fn schema(&self) -> &ProviderSchema {
        &self.schema
    }

    // =========================================================================
    // Schema & Metadata
    // =========================================================================

    /// GetMetadata.
    #[instrument(skip(self), name = "provider.get_metadata")]
    pub fn get_metadata(&self) -> ProviderMetadata {
        debug!("GetMetadata called");
        let metadata = self.provider.metadata();
        info!(
            resources = metadata.resources.len(),
            data_sources = metadata.data_sources.len(),
            "GetMetadata completed"
        );
        metadata
    }

    /// GetProviderSchema.
    ///
    /// Every schema is checked for a derivable type so a broken nesting mode
    /// is reported once, up front.
    #[instrument(skip(self), name = "provider.get_provider_schema")]
    pub fn get_provider_schema(&self) -> (ProviderSchema, Vec<Diagnostic>) {
        debug!("GetProviderSchema called");
        let mut diagnostics = Vec::new();
        let surfaces = [
            ("resource", &self.schema.resources),
            ("data source", &self.schema.data_sources),
            ("ephemeral resource", &self.schema.ephemeral_resources),
            ("list resource", &self.schema.list_resources),
            ("action", &self.schema.actions),
        ];
        let provider = [("provider", &self.schema.provider)];
        let named = surfaces
            .iter()
            .flat_map(|(kind, map)| map.iter().map(move |(name, schema)| (*kind, name.as_str(), schema)))
            .chain(provider.iter().map(|(kind, schema)| (*kind, "", *schema)));
        for (kind, name, schema) in named {
            if let Err(err) = schema.value_type() {
                let summary = if name.is_empty() {
                    format!("Invalid {} schema", kind)
                } else {
                    format!("Invalid {} schema {}", kind, name)
                };
                diagnostics.push(Diagnostic::error(summary).with_detail(err.to_string()));
            }
        }
        log_diagnostics("GetProviderSchema", &diagnostics);
        (self.schema.clone(), diagnostics)
    }

    // =========================================================================
    // Provider Lifecycle
    // =========================================================================

    /// ValidateProviderConfig.
    #[instrument(skip(self, request), name = "provider.validate_provider_config")]
    pub async fn validate_provider_config(
        &self,
        request: ValidateProviderConfigRequest,
    ) -> DiagnosticsResponse {
        debug!("ValidateProviderConfig called");
        let diagnostics = self
            .validate_with(Ok(&self.schema.provider), &request.config, |config| {
                self.provider.validate_provider_config(config)
            })
            .await;
        log_diagnostics("ValidateProviderConfig", &diagnostics);
        DiagnosticsResponse { diagnostics }
    }

    /// ConfigureProvider.
    #[instrument(skip(self, request), name = "provider.configure")]
    pub async fn configure_provider(&self, request: ConfigureProviderRequest) -> DiagnosticsResponse {
        debug!("Configure called");
        let diagnostics = self
            .validate_with(Ok(&self.schema.provider), &request.config, |config| {
                self.provider.configure(config)
            })
            .await;
        log_diagnostics("Configure", &diagnostics);
        DiagnosticsResponse { diagnostics }
    }

    /// StopProvider.
    #[instrument(skip(self), name = "provider.stop")]
    pub async fn stop_provider(&self) -> Result<(), ProviderError> {
        info!("Stop called");
        match self.provider.stop().await {
            Ok(()) => {
                info!("Stop completed successfully");
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Stop failed");
                Err(e)
            }
        }
    }

    // =========================================================================
    // Resource Operations
    // =========================================================================

    /// ValidateResourceConfig.
    #[instrument(skip(self, request), name = "provider.validate_resource_config", fields(type_name = %request.type_name))]
    pub async fn validate_resource_config(
        &self,
        request: ValidateConfigRequest,
    ) -> DiagnosticsResponse {
        debug!("ValidateResourceConfig called");
        let schema = lookup(&self.schema.resources, "resource", &request.type_name);
        let diagnostics = self
            .validate_with(schema, &request.config, |config| {
                self.provider
                    .validate_resource_config(&request.type_name, config)
            })
            .await;
        log_diagnostics("ValidateResourceConfig", &diagnostics);
        DiagnosticsResponse { diagnostics }
    }

    /// UpgradeResourceState.
    #[instrument(skip(self, request), name = "provider.upgrade_resource_state", fields(type_name = %request.type_name, version = request.version))]
    pub async fn upgrade_resource_state(
        &self,
        request: UpgradeResourceStateRequest,
    ) -> UpgradeResourceStateResponse {
        debug!("UpgradeResourceState called");
        match self.upgrade_resource_state_inner(request).await {
            Ok(upgraded_state) => {
                info!("UpgradeResourceState completed");
                UpgradeResourceStateResponse {
                    upgraded_state: Some(upgraded_state),
                    diagnostics: vec![],
                }
            }
            Err(e) => {
                error!(error = %e, "UpgradeResourceState failed");
                UpgradeResourceStateResponse {
                    upgraded_state: None,
                    diagnostics: vec![e.into()],
                }
            }
        }
    }

    async fn upgrade_resource_state_inner(
        &self,
        request: UpgradeResourceStateRequest,
    ) -> Result<DynamicValue, ProviderError> {
        let schema = lookup(&self.schema.resources, "resource", &request.type_name)?;
        let ty = schema.value_type()?;
        let upgraded = self
            .provider
            .upgrade_resource_state(&request.type_name, request.version, request.raw_state, &ty)
            .await?;
        Ok(encode(&ty, &upgraded)?)
    }

    /// UpgradeResourceIdentity.
    #[instrument(skip(self, request), name = "provider.upgrade_resource_identity", fields(type_name = %request.type_name, version = request.version))]
    pub async fn upgrade_resource_identity(
        &self,
        request: UpgradeResourceIdentityRequest,
    ) -> UpgradeResourceIdentityResponse {
        debug!("UpgradeResourceIdentity called");
        match self.upgrade_resource_identity_inner(request).await {
            Ok(upgraded_identity) => {
                info!("UpgradeResourceIdentity completed");
                UpgradeResourceIdentityResponse {
                    upgraded_identity: Some(upgraded_identity),
                    diagnostics: vec![],
                }
            }
            Err(e) => {
                error!(error = %e, "UpgradeResourceIdentity failed");
                UpgradeResourceIdentityResponse {
                    upgraded_identity: None,
                    diagnostics: vec![e.into()],
                }
            }
        }
    }

    async fn upgrade_resource_identity_inner(
        &self,
        request: UpgradeResourceIdentityRequest,
    ) -> Result<DynamicValue, ProviderError> {
        let schema = lookup(
            &self.schema.resource_identities,
            "resource identity",
            &request.type_name,
        )?;
        let ty = schema.value_type()?;
        let upgraded = self
            .provider
            .upgrade_resource_identity(
                &request.type_name,
                request.version,
                request.raw_identity,
                &ty,
            )
            .await?;
        Ok(encode(&ty, &upgraded)?)
    }

    /// PlanResourceChange.
    #[instrument(skip(self, request), name = "provider.plan_resource_change", fields(type_name = %request.type_name))]
    pub async fn plan_resource_change(
        &self,
        request: PlanResourceChangeRequest,
    ) -> PlanResourceChangeResponse {
        match self.plan_resource_change_inner(request).await {
            Ok(response) => {
                info!(
                    requires_replace = response.requires_replace.len(),
                    "Plan completed"
                );
                response
            }
            Err(e) => {
                error!(error = %e, "Plan failed");
                PlanResourceChangeResponse {
                    planned_state: None,
                    requires_replace: vec![],
                    diagnostics: vec![e.into()],
                }
            }
        }
    }

    async fn plan_resource_change_inner(
        &self,
        request: PlanResourceChangeRequest,
    ) -> Result<PlanResourceChangeResponse, ProviderError> {
        let schema = lookup(&self.schema.resources, "resource", &request.type_name)?;
        let ty = schema.value_type()?;
        let prior_state = decode(&request.prior_state, &ty)?;
        let proposed_state = decode(&request.proposed_new_state, &ty)?;
        let config = decode(&request.config, &ty)?;
        debug!(
            is_create = prior_state.is_null(),
            is_destroy = proposed_state.is_null(),
            "Plan called"
        );

        if proposed_state.is_null() {
            return Ok(PlanResourceChangeResponse {
                planned_state: Some(encode(&ty, &proposed_state)?),
                requires_replace: vec![],
                diagnostics: vec![],
            });
        }

        let prior_state = (!prior_state.is_null()).then_some(prior_state);
        let result = self
            .provider
            .plan(&request.type_name, prior_state, proposed_state, config)
            .await?;
        Ok(PlanResourceChangeResponse {
            planned_state: Some(encode(&ty, &result.planned_state)?),
            requires_replace: result.requires_replace,
            diagnostics: result.diagnostics,
        })
    }

    /// ApplyResourceChange: create, update, or delete depending on which
    /// states are null.
    #[instrument(skip(self, request), name = "provider.apply_resource_change", fields(type_name = %request.type_name))]
    pub async fn apply_resource_change(&self, request: ApplyResourceChangeRequest) -> NewStateResponse {
        match self.apply_resource_change_inner(request).await {
            Ok(new_state) => NewStateResponse {
                new_state: Some(new_state),
                diagnostics: vec![],
            },
            Err(e) => {
                error!(error = %e, "Apply failed");
                NewStateResponse {
                    new_state: None,
                    diagnostics: vec![e.into()],
                }
            }
        }
    }

    async fn apply_resource_change_inner(
        &self,
        request: ApplyResourceChangeRequest,
    ) -> Result<DynamicValue, ProviderError> {
        let type_name = request.type_name.as_str();
        let schema = lookup(&self.schema.resources, "resource", type_name)?;
        let ty = schema.value_type()?;
        let prior_state = decode(&request.prior_state, &ty)?;
        let planned_state = decode(&request.planned_state, &ty)?;
        let config = decode(&request.config, &ty)?;

        let new_state = if planned_state.is_null() {
            info!("Delete called");
            self.provider.delete(type_name, prior_state).await?;
            info!("Delete completed successfully");
            Value::null(ty.clone())
        } else if prior_state.is_null() {
            info!("Create called");
            let state = self.provider.create(type_name, planned_state, config).await?;
            info!("Create completed successfully");
            state
        } else {
            info!("Update called");
            let state = self
                .provider
                .update(type_name, prior_state, planned_state, config)
                .await?;
            info!("Update completed successfully");
            state
        };
        Ok(encode(&ty, &new_state)?)
    }

    /// ReadResource.
    #[instrument(skip(self, request), name = "provider.read_resource", fields(type_name = %request.type_name))]
    pub async fn read_resource(&self, request: ReadResourceRequest) -> NewStateResponse {
        debug!("Read called");
        let result = async {
            let schema = lookup(&self.schema.resources, "resource", &request.type_name)?;
            let ty = schema.value_type()?;
            let current_state = decode(&request.current_state, &ty)?;
            let state = self
                .provider
                .read(&request.type_name, current_state)
                .await?;
            Ok::<_, ProviderError>(encode(&ty, &state)?)
        }
        .await;

        match result {
            Ok(new_state) => {
                debug!("Read completed successfully");
                NewStateResponse {
                    new_state: Some(new_state),
                    diagnostics: vec![],
                }
            }
            Err(e) => {
                error!(error = %e, "Read failed");
                NewStateResponse {
                    new_state: None,
                    diagnostics: vec![e.into()],
                }
            }
        }
    }

    /// ImportResourceState.
    #[instrument(skip(self, request), name = "provider.import_resource_state", fields(type_name = %request.type_name))]
    pub async fn import_resource_state(
        &self,
        request: ImportResourceStateRequest,
    ) -> ImportResourceStateResponse {
        info!(id = %request.id, "ImportResourceState called");
        let result = async {
            lookup(&self.schema.resources, "resource", &request.type_name)?;
            let imported = self
                .provider
                .import_resource(&request.type_name, &request.id)
                .await?;
            imported
                .into_iter()
                .map(|resource| -> Result<ImportedResourceState, ProviderError> {
                    let schema =
                        lookup(&self.schema.resources, "resource", &resource.type_name)?;
                    let ty = schema.value_type()?;
                    Ok(ImportedResourceState {
                        state: encode(&ty, &resource.state)?,
                        type_name: resource.type_name,
                    })
                })
                .collect::<Result<Vec<_>, ProviderError>>()
        }
        .await;

        match result {
            Ok(imported_resources) => {
                info!(
                    count = imported_resources.len(),
                    "ImportResourceState completed"
                );
                ImportResourceStateResponse {
                    imported_resources,
                    diagnostics: vec![],
                }
            }
            Err(e) => {
                error!(error = %e, "ImportResourceState failed");
                ImportResourceStateResponse {
                    imported_resources: vec![],
                    diagnostics: vec![e.into()],
                }
            }
        }
    }

    // =========================================================================
    // Data Source Operations
    // =========================================================================

    /// ValidateDataResourceConfig.
    #[instrument(skip(self, request), name = "provider.validate_data_resource_config", fields(type_name = %request.type_name))]
    pub async fn validate_data_resource_config(
        &self,
        request: ValidateConfigRequest,
    ) -> DiagnosticsResponse {
        debug!("ValidateDataResourceConfig called");
        let schema = lookup(&self.schema.data_sources, "data source", &request.type_name);
        let diagnostics = self
            .validate_with(schema, &request.config, |config| {
                self.provider
                    .validate_data_source_config(&request.type_name, config)
            })
            .await;
        log_diagnostics("ValidateDataResourceConfig", &diagnostics);
        DiagnosticsResponse { diagnostics }
    }

    /// ReadDataSource.
    #[instrument(skip(self, request), name = "provider.read_data_source", fields(type_name = %request.type_name))]
    pub async fn read_data_source(&self, request: ReadDataSourceRequest) -> ReadDataSourceResponse {
        debug!("ReadDataSource called");
        let result = async {
            let schema = lookup(&self.schema.data_sources, "data source", &request.type_name)?;
            let ty = schema.value_type()?;
            let config = decode(&request.config, &ty)?;
            let state = self
                .provider
                .read_data_source(&request.type_name, config)
                .await?;
            Ok::<_, ProviderError>(encode(&ty, &state)?)
        }
        .await;

        match result {
            Ok(state) => {
                info!("ReadDataSource completed successfully");
                ReadDataSourceResponse {
                    state: Some(state),
                    diagnostics: vec![],
                }
            }
            Err(e) => {
                error!(error = %e, "ReadDataSource failed");
                ReadDataSourceResponse {
                    state: None,
                    diagnostics: vec![e.into()],
                }
            }
        }
    }

    // =========================================================================
    // Functions
    // =========================================================================

    /// CallFunction.
    ///
    /// Arguments are decoded against their parameter types. A null argument
    /// is rejected unless the parameter allows it. An unknown argument to a
    /// parameter that does not accept unknowns makes the result unknown
    /// without calling the provider.
    #[instrument(skip(self, request), name = "provider.call_function", fields(name = %request.name))]
    pub async fn call_function(&self, request: CallFunctionRequest) -> CallFunctionResponse {
        debug!(arguments = request.arguments.len(), "CallFunction called");
        match self.call_function_inner(request).await {
            Ok(result) => {
                info!("CallFunction completed successfully");
                CallFunctionResponse {
                    result: Some(result),
                    error: None,
                }
            }
            Err(e) => {
                error!(error = %e.text, argument = ?e.function_argument, "CallFunction failed");
                CallFunctionResponse {
                    result: None,
                    error: Some(e),
                }
            }
        }
    }

    async fn call_function_inner(
        &self,
        request: CallFunctionRequest,
    ) -> Result<DynamicValue, FunctionError> {
        let function = self
            .schema
            .functions
            .get(&request.name)
            .ok_or_else(|| FunctionError::new(format!("Unknown function: {}", request.name)))?;

        if request.arguments.len() < function.parameters.len() {
            return Err(FunctionError::new(format!(
                "Expected {} argument(s), got {}",
                function.parameters.len(),
                request.arguments.len()
            )));
        }

        let mut arguments = Vec::with_capacity(request.arguments.len());
        let mut short_circuit = false;
        for (index, argument) in request.arguments.iter().enumerate() {
            let parameter = function
                .parameter_at(index)
                .ok_or_else(|| FunctionError::argument(index, "Too many arguments"))?;
            let value = decode(argument, &parameter.ty)
                .map_err(|e| FunctionError::argument(index, e.to_string()))?;
            if value.is_null() && !parameter.allow_null_value {
                return Err(FunctionError::argument(
                    index,
                    format!("Argument \"{}\" cannot be null", parameter.name),
                ));
            }
            if !value.is_fully_known() && !parameter.allow_unknown_values {
                short_circuit = true;
            }
            arguments.push(value);
        }

        let result = if short_circuit {
            debug!("CallFunction received unknown arguments, returning unknown");
            Value::unknown(function.return_type.clone())
        } else {
            self.provider.call_function(&request.name, arguments).await?
        };
        encode(&function.return_type, &result).map_err(|e| FunctionError::new(e.to_string()))
    }

    // =========================================================================
    // Ephemeral Resources
    // =========================================================================

    /// ValidateEphemeralResourceConfig.
    #[instrument(skip(self, request), name = "provider.validate_ephemeral_resource_config", fields(type_name = %request.type_name))]
    pub async fn validate_ephemeral_resource_config(
        &self,
        request: ValidateConfigRequest,
    ) -> DiagnosticsResponse {
        debug!("ValidateEphemeralResourceConfig called");
        let schema = lookup(
            &self.schema.ephemeral_resources,
            "ephemeral resource",
            &request.type_name,
        );
        let diagnostics = self
            .validate_with(schema, &request.config, |config| {
                self.provider
                    .validate_ephemeral_resource_config(&request.type_name, config)
            })
            .await;
        log_diagnostics("ValidateEphemeralResourceConfig", &diagnostics);
        DiagnosticsResponse { diagnostics }
    }

    /// OpenEphemeralResource.
    #[instrument(skip(self, request), name = "provider.open_ephemeral_resource", fields(type_name = %request.type_name))]
    pub async fn open_ephemeral_resource(
        &self,
        request: OpenEphemeralResourceRequest,
    ) -> OpenEphemeralResourceResponse {
        debug!("OpenEphemeralResource called");
        let result = async {
            let schema = lookup(
                &self.schema.ephemeral_resources,
                "ephemeral resource",
                &request.type_name,
            )?;
            let ty = schema.value_type()?;
            let config = decode(&request.config, &ty)?;
            let opened = self
                .provider
                .open_ephemeral_resource(&request.type_name, config)
                .await?;
            Ok::<_, ProviderError>((encode(&ty, &opened.result)?, opened.private))
        }
        .await;

        match result {
            Ok((result, private)) => {
                info!("OpenEphemeralResource completed successfully");
                OpenEphemeralResourceResponse {
                    result: Some(result),
                    private,
                    diagnostics: vec![],
                }
            }
            Err(e) => {
                error!(error = %e, "OpenEphemeralResource failed");
                OpenEphemeralResourceResponse {
                    result: None,
                    private: vec![],
                    diagnostics: vec![e.into()],
                }
            }
        }
    }

    /// CloseEphemeralResource.
    #[instrument(skip(self, request), name = "provider.close_ephemeral_resource", fields(type_name = %request.type_name))]
    pub async fn close_ephemeral_resource(
        &self,
        request: CloseEphemeralResourceRequest,
    ) -> DiagnosticsResponse {
        debug!("CloseEphemeralResource called");
        match self
            .provider
            .close_ephemeral_resource(&request.type_name, request.private)
            .await
        {
            Ok(()) => {
                info!("CloseEphemeralResource completed successfully");
                DiagnosticsResponse::default()
            }
            Err(e) => {
                error!(error = %e, "CloseEphemeralResource failed");
                DiagnosticsResponse {
                    diagnostics: vec![e.into()],
                }
            }
        }
    }

    // =========================================================================
    // Actions
    // =========================================================================

    /// ValidateActionConfig.
    #[instrument(skip(self, request), name = "provider.validate_action_config", fields(type_name = %request.type_name))]
    pub async fn validate_action_config(&self, request: ValidateConfigRequest) -> DiagnosticsResponse {
        debug!("ValidateActionConfig called");
        let schema = lookup(&self.schema.actions, "action", &request.type_name);
        let diagnostics = self
            .validate_with(schema, &request.config, |config| {
                self.provider
                    .validate_action_config(&request.type_name, config)
            })
            .await;
        log_diagnostics("ValidateActionConfig", &diagnostics);
        DiagnosticsResponse { diagnostics }
    }

    /// InvokeAction.
    ///
    /// The returned stream yields [`ActionEvent::Started`], any progress the
    /// provider reports, and exactly one terminal event. A configuration that
    /// fails to decode or validate yields only the terminal event.
    #[instrument(skip(self, request), name = "provider.invoke_action", fields(type_name = %request.type_name))]
    pub fn invoke_action(&self, request: InvokeActionRequest) -> EventStream<ActionEvent> {
        debug!("InvokeAction called");
        let (tx, rx) = event_channel(&self.options);
        let prepared = self.prepare_action(&request);
        let provider = Arc::clone(&self.provider);
        let type_name = request.type_name;

        tokio::spawn(
            async move {
                let config = match prepared {
                    Ok(config) => config,
                    Err(diagnostics) => {
                        warn!(
                            diagnostics = diagnostics.len(),
                            "InvokeAction rejected configuration"
                        );
                        let _ = tx.finish(ActionEvent::Finished { diagnostics }).await;
                        return;
                    }
                };

                if tx.emit(ActionEvent::Started).await.is_err() {
                    debug!("InvokeAction stopped before start");
                    let _ = tx.finish(ActionEvent::Cancelled).await;
                    return;
                }

                let terminal = match provider.invoke_action(&type_name, config, &tx).await {
                    Ok(diagnostics) => {
                        log_diagnostics("InvokeAction", &diagnostics);
                        ActionEvent::Finished { diagnostics }
                    }
                    Err(ProviderError::Value(Error::StopRequested)) => {
                        info!("InvokeAction cancelled");
                        ActionEvent::Cancelled
                    }
                    Err(e) => {
                        error!(error = %e, "InvokeAction failed");
                        ActionEvent::Finished {
                            diagnostics: vec![e.into()],
                        }
                    }
                };
                if tx.finish(terminal).await.is_err() {
                    debug!("InvokeAction consumer went away before the final event");
                }
            }
            .in_current_span(),
        );
        rx
    }

    fn prepare_action(&self, request: &InvokeActionRequest) -> Result<Value, Vec<Diagnostic>> {
        let decoded = lookup(&self.schema.actions, "action", &request.type_name)
            .and_then(|schema| Ok((schema, decode_with(schema, &request.config)?)));
        match decoded {
            Ok((schema, config)) => {
                let diagnostics = validation::validate(schema, &config);
                if has_errors(&diagnostics) {
                    Err(diagnostics)
                } else {
                    Ok(config)
                }
            }
            Err(e) => Err(vec![e.into()]),
        }
    }

    // =========================================================================
    // State Storage
    // =========================================================================

    /// ReadStateBytes.
    ///
    /// The state file is streamed in chunks of the configured size. If the
    /// provider fails, the stream carries one empty chunk with the diagnostic.
    #[instrument(skip(self, request), name = "provider.read_state_bytes", fields(type_name = %request.type_name))]
    pub fn read_state_bytes(&self, request: StateBytesRequest) -> EventStream<StateChunk> {
        debug!(state_id = %request.state_id, "ReadStateBytes called");
        let (tx, rx) = event_channel(&self.options);
        let provider = Arc::clone(&self.provider);
        let chunk_size = self.options.chunk_size;

        tokio::spawn(
            async move {
                match provider
                    .read_state_bytes(&request.type_name, &request.state_id)
                    .await
                {
                    Ok(bytes) => match send_state_bytes(&tx, &bytes, chunk_size).await {
                        Ok(()) => info!(bytes = bytes.len(), "ReadStateBytes completed"),
                        Err(_) => info!("ReadStateBytes stopped by consumer"),
                    },
                    Err(e) => {
                        error!(error = %e, "ReadStateBytes failed");
                        let failed = StateChunk {
                            bytes: vec![],
                            total_length: 0,
                            range: ByteRange { start: 0, end: 0 },
                            diagnostics: vec![e.into()],
                        };
                        let _ = tx.finish(failed).await;
                    }
                }
            }
            .in_current_span(),
        );
        rx
    }

    /// WriteStateBytes: reassemble `chunks` and hand the file to the provider.
    #[instrument(skip(self, request, chunks), name = "provider.write_state_bytes", fields(type_name = %request.type_name))]
    pub async fn write_state_bytes<S>(&self, request: StateBytesRequest, mut chunks: S) -> DiagnosticsResponse
    where
        S: Stream<Item = StateChunk> + Unpin,
    {
        debug!(state_id = %request.state_id, "WriteStateBytes called");
        let mut assembler = StateChunkAssembler::new();
        while let Some(chunk) = chunks.next().await {
            if let Err(e) = assembler.push(chunk) {
                error!(error = %e, "WriteStateBytes received a malformed chunk");
                return DiagnosticsResponse {
                    diagnostics: vec![e.into()],
                };
            }
        }

        let (bytes, mut diagnostics) = match assembler.finish() {
            Ok(assembled) => assembled,
            Err(e) => {
                error!(error = %e, "WriteStateBytes stream ended early");
                return DiagnosticsResponse {
                    diagnostics: vec![e.into()],
                };
            }
        };

        let len = bytes.len();
        match self
            .provider
            .write_state_bytes(&request.type_name, &request.state_id, bytes)
            .await
        {
            Ok(()) => info!(bytes = len, "WriteStateBytes completed"),
            Err(e) => {
                error!(error = %e, "WriteStateBytes failed");
                diagnostics.push(e.into());
            }
        }
        DiagnosticsResponse { diagnostics }
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    /// Decode `config`, validate it against `schema`, then ask the provider.
    ///
    /// The provider is only consulted when schema validation found no errors.
    async fn validate_with<'a, F, Fut>(
        &self,
        schema: Result<&'a Schema, ProviderError>,
        config: &DynamicValue,
        call: F,
    ) -> Vec<Diagnostic>
    where
        F: FnOnce(Value) -> Fut,
        Fut: Future<Output = Result<Vec<Diagnostic>, ProviderError>>,
    {
        let decoded = schema.and_then(|schema| Ok((schema, decode_with(schema, config)?)));
        let (schema, config) = match decoded {
            Ok(decoded) => decoded,
            Err(e) => return vec![e.into()],
        };

        let mut diagnostics = validation::validate(schema, &config);
        if has_errors(&diagnostics) {
            return diagnostics;
        }
        match call(config).await {
            Ok(more) => diagnostics.extend(more),
            Err(e) => {
                error!(error = %e, "provider returned an error");
                diagnostics.push(e.into());
            }
        }
        diagnostics
    }
}

fn lookup<'a, T>(
    map: &'a BTreeMap<String, T>,
    kind: &str,
    type_name: &str,
) -> Result<&'a T, ProviderError> {
    map.get(type_name)
        .ok_or_else(|| ProviderError::UnknownType(format!("Unknown {} type: {}", kind, type_name)))
}

fn decode(value: &DynamicValue, ty: &Type) -> Result<Value, Error> {
    trace!(ty = %ty, "decoding DynamicValue");
    value.unmarshal(ty)
}

fn decode_with(schema: &Schema, value: &DynamicValue) -> Result<Value, ProviderError> {
    let ty = schema.value_type()?;
    Ok(decode(value, &ty)?)
}

fn encode(ty: &Type, value: &Value) -> Result<DynamicValue, Error> {
    trace!(ty = %ty, "encoding DynamicValue");
    DynamicValue::new(ty, value)
}

fn log_diagnostics(operation: &str, diagnostics: &[Diagnostic]) {
    if has_errors(diagnostics) {
        warn!(
            diagnostics = diagnostics.len(),
            "{} completed with errors", operation
        );
    } else {
        info!("{} completed successfully", operation);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Attribute, Function, FunctionParameter, IdentityAttribute, IdentitySchema};
    use crate::tftypes::AttributePath;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct TestProvider {
        calls: AtomicUsize,
        stored: Mutex<Vec<u8>>,
    }

    impl TestProvider {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                stored: Mutex::new(Vec::new()),
            }
        }
    }

    fn resource_schema() -> Schema {
        Schema::v0()
            .with_attribute("name", Attribute::required_string())
            .with_attribute("id", Attribute::computed_string())
    }

    fn resource_type() -> Type {
        resource_schema().value_type().unwrap()
    }

    fn resource(name: Value, id: Value) -> Value {
        Value::new(
            resource_type(),
            BTreeMap::from([("id".to_string(), id), ("name".to_string(), name)]),
        )
    }

    #[async_trait::async_trait]
    impl ProviderService for TestProvider {
        fn schema(&self) -> ProviderSchema {
            ProviderSchema::new()
                .with_resource("test_resource", resource_schema())
                .with_resource_identity(
                    "test_resource",
                    IdentitySchema::new(0)
                        .with_attribute(IdentityAttribute::required_for_import("id", Type::String)),
                )
                .with_action(
                    "test_action",
                    Schema::v0().with_attribute("steps", Attribute::required_number()),
                )
                .with_function(
                    "upper",
                    Function::new(Type::String)
                        .with_parameter(FunctionParameter::new("input", Type::String)),
                )
        }

        async fn configure(&self, _config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
            Ok(vec![])
        }

        async fn plan(
            &self,
            _type_name: &str,
            prior_state: Option<Value>,
            proposed_state: Value,
            _config: Value,
        ) -> Result<PlanResult, ProviderError> {
            let name = proposed_state.get("name").cloned().unwrap_or(Value::null(Type::String));
            match prior_state {
                None => Ok(PlanResult::no_change(resource(
                    name,
                    Value::unknown(Type::String),
                ))),
                Some(prior) => {
                    let id = prior.get("id").cloned().unwrap_or(Value::null(Type::String));
                    let planned = resource(name, id);
                    Ok(PlanResult::with_replace_triggers(
                        Some(&prior),
                        planned,
                        &[AttributePath::new().with_attribute_name("name")],
                    )?)
                }
            }
        }

        async fn create(
            &self,
            _type_name: &str,
            planned_state: Value,
            _config: Value,
        ) -> Result<Value, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let name = planned_state.get("name").cloned().unwrap_or(Value::null(Type::String));
            Ok(resource(name, Value::from("generated-id")))
        }

        async fn read(
            &self,
            _type_name: &str,
            current_state: Value,
        ) -> Result<Value, ProviderError> {
            Ok(current_state)
        }

        async fn update(
            &self,
            _type_name: &str,
            _prior_state: Value,
            planned_state: Value,
            _config: Value,
        ) -> Result<Value, ProviderError> {
            Ok(planned_state)
        }

        async fn delete(&self, _type_name: &str, _current_state: Value) -> Result<(), ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn call_function(
            &self,
            _name: &str,
            arguments: Vec<Value>,
        ) -> Result<Value, FunctionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let input: String = arguments[0]
                .to()
                .map_err(|e| FunctionError::argument(0, e.to_string()))?;
            Ok(Value::from(input.to_uppercase()))
        }

        async fn invoke_action(
            &self,
            _type_name: &str,
            config: Value,
            events: &EventSender<ActionEvent>,
        ) -> Result<Vec<Diagnostic>, ProviderError> {
            let steps: i64 = config.get("steps").map(Value::to).transpose()?.unwrap_or(0);
            for step in 0..steps {
                events.emit(ActionEvent::progress(format!("step {}", step))).await?;
            }
            Ok(vec![Diagnostic::warning("done")])
        }

        async fn read_state_bytes(
            &self,
            _type_name: &str,
            state_id: &str,
        ) -> Result<Vec<u8>, ProviderError> {
            if state_id == "missing" {
                return Err(ProviderError::NotFound(state_id.to_string()));
            }
            Ok(self.stored.lock().unwrap().clone())
        }

        async fn write_state_bytes(
            &self,
            _type_name: &str,
            _state_id: &str,
            bytes: Vec<u8>,
        ) -> Result<(), ProviderError> {
            *self.stored.lock().unwrap() = bytes;
            Ok(())
        }
    }

    fn envelope(value: &Value) -> DynamicValue {
        DynamicValue::new(value.ty(), value).unwrap()
    }

    #[tokio::test]
    async fn test_unknown_resource_type() {
        let dispatcher = Dispatcher::new(TestProvider::new());
        let response = dispatcher
            .validate_resource_config(ValidateConfigRequest {
                type_name: "nope".to_string(),
                config: DynamicValue::null(),
            })
            .await;
        assert_eq!(response.diagnostics.len(), 1);
        assert!(response.diagnostics[0].summary.contains("Unknown resource type"));
    }

    #[tokio::test]
    async fn test_validate_resource_config_reports_paths() {
        let dispatcher = Dispatcher::new(TestProvider::new());
        let config = resource(Value::null(Type::String), Value::from("set-by-user"));
        let response = dispatcher
            .validate_resource_config(ValidateConfigRequest {
                type_name: "test_resource".to_string(),
                config: envelope(&config),
            })
            .await;

        let paths: Vec<_> = response
            .diagnostics
            .iter()
            .filter_map(|d| d.attribute.clone())
            .collect();
        assert_eq!(
            paths,
            vec![
                AttributePath::new().with_attribute_name("id"),
                AttributePath::new().with_attribute_name("name"),
            ]
        );
    }

    #[tokio::test]
    async fn test_decode_error_becomes_diagnostic() {
        let dispatcher = Dispatcher::new(TestProvider::new());
        let response = dispatcher
            .read_resource(ReadResourceRequest {
                type_name: "test_resource".to_string(),
                current_state: DynamicValue::from_json(br#"{"name":"a","id":"b","extra":1}"#.to_vec()),
            })
            .await;
        assert!(response.new_state.is_none());
        assert_eq!(
            response.diagnostics[0].attribute,
            Some(AttributePath::new().with_attribute_name("extra"))
        );
    }

    #[tokio::test]
    async fn test_plan_create_keeps_unknown() {
        let dispatcher = Dispatcher::new(TestProvider::new());
        let proposed = resource(Value::from("web"), Value::null(Type::String));
        let response = dispatcher
            .plan_resource_change(PlanResourceChangeRequest {
                type_name: "test_resource".to_string(),
                prior_state: DynamicValue::null(),
                proposed_new_state: envelope(&proposed),
                config: envelope(&proposed),
            })
            .await;

        assert!(response.diagnostics.is_empty());
        let planned = response.planned_state.unwrap().unmarshal(&resource_type()).unwrap();
        assert!(!planned.get("id").unwrap().is_known());
    }

    #[tokio::test]
    async fn test_plan_update_requires_replace() {
        let dispatcher = Dispatcher::new(TestProvider::new());
        let prior = resource(Value::from("web"), Value::from("id-1"));
        let proposed = resource(Value::from("api"), Value::from("id-1"));
        let response = dispatcher
            .plan_resource_change(PlanResourceChangeRequest {
                type_name: "test_resource".to_string(),
                prior_state: envelope(&prior),
                proposed_new_state: envelope(&proposed),
                config: envelope(&proposed),
            })
            .await;
        assert_eq!(
            response.requires_replace,
            vec![AttributePath::new().with_attribute_name("name")]
        );
    }

    #[tokio::test]
    async fn test_apply_create_and_delete() {
        let dispatcher = Dispatcher::new(TestProvider::new());
        let planned = resource(Value::from("web"), Value::unknown(Type::String));

        let created = dispatcher
            .apply_resource_change(ApplyResourceChangeRequest {
                type_name: "test_resource".to_string(),
                prior_state: DynamicValue::null(),
                planned_state: envelope(&planned),
                config: envelope(&planned),
            })
            .await;
        let state = created.new_state.unwrap().unmarshal(&resource_type()).unwrap();
        assert_eq!(state.get("id"), Some(&Value::from("generated-id")));

        let deleted = dispatcher
            .apply_resource_change(ApplyResourceChangeRequest {
                type_name: "test_resource".to_string(),
                prior_state: envelope(&state),
                planned_state: DynamicValue::null(),
                config: DynamicValue::null(),
            })
            .await;
        assert!(deleted.new_state.unwrap().is_null().unwrap());
        assert_eq!(dispatcher.provider().calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_upgrade_resource_state_default() {
        let dispatcher = Dispatcher::new(TestProvider::new());
        let response = dispatcher
            .upgrade_resource_state(UpgradeResourceStateRequest {
                type_name: "test_resource".to_string(),
                version: 0,
                raw_state: RawState::from_json(r#"{"name":"web","id":"id-1"}"#),
            })
            .await;
        let state = response
            .upgraded_state
            .unwrap()
            .unmarshal(&resource_type())
            .unwrap();
        assert_eq!(state, resource(Value::from("web"), Value::from("id-1")));
    }

    #[tokio::test]
    async fn test_upgrade_resource_identity_default() {
        let dispatcher = Dispatcher::new(TestProvider::new());
        let response = dispatcher
            .upgrade_resource_identity(UpgradeResourceIdentityRequest {
                type_name: "test_resource".to_string(),
                version: 0,
                raw_identity: RawIdentity::from_json(r#"{"id":"id-1"}"#),
            })
            .await;
        assert!(response.diagnostics.is_empty());
        assert!(response.upgraded_identity.is_some());
    }

    #[tokio::test]
    async fn test_call_function() {
        let dispatcher = Dispatcher::new(TestProvider::new());
        let response = dispatcher
            .call_function(CallFunctionRequest {
                name: "upper".to_string(),
                arguments: vec![envelope(&Value::from("abc"))],
            })
            .await;
        assert_eq!(
            response.result.unwrap().unmarshal(&Type::String).unwrap(),
            Value::from("ABC")
        );
    }

    #[tokio::test]
    async fn test_call_function_argument_checks() {
        let dispatcher = Dispatcher::new(TestProvider::new());

        let null = dispatcher
            .call_function(CallFunctionRequest {
                name: "upper".to_string(),
                arguments: vec![envelope(&Value::null(Type::String))],
            })
            .await;
        assert_eq!(null.error.unwrap().function_argument, Some(0));

        let unknown = dispatcher
            .call_function(CallFunctionRequest {
                name: "upper".to_string(),
                arguments: vec![envelope(&Value::unknown(Type::String))],
            })
            .await;
        let result = unknown.result.unwrap().unmarshal(&Type::String).unwrap();
        assert!(!result.is_known());
        assert_eq!(dispatcher.provider().calls.load(Ordering::SeqCst), 0);

        let too_many = dispatcher
            .call_function(CallFunctionRequest {
                name: "upper".to_string(),
                arguments: vec![envelope(&Value::from("a")), envelope(&Value::from("b"))],
            })
            .await;
        assert_eq!(too_many.error.unwrap().function_argument, Some(1));
    }

    #[tokio::test]
    async fn test_invoke_action_stream() {
        let dispatcher = Dispatcher::new(TestProvider::new());
        let config = Value::new(
            Type::object([("steps".to_string(), Type::Number)]),
            BTreeMap::from([("steps".to_string(), Value::from(2_i64))]),
        );
        let events = dispatcher
            .invoke_action(InvokeActionRequest {
                type_name: "test_action".to_string(),
                config: envelope(&config),
            })
            .collect_events()
            .await;

        assert_eq!(events.len(), 4);
        assert_eq!(events[0], ActionEvent::Started);
        assert_eq!(events[1], ActionEvent::progress("step 0"));
        assert!(matches!(
            &events[3],
            ActionEvent::Finished { diagnostics } if diagnostics[0].summary == "done"
        ));
    }

    #[tokio::test]
    async fn test_invoke_action_cancelled() {
        let dispatcher = Dispatcher::new(TestProvider::new());
        let config = Value::new(
            Type::object([("steps".to_string(), Type::Number)]),
            BTreeMap::from([("steps".to_string(), Value::from(1000_i64))]),
        );
        let mut events = dispatcher.invoke_action(InvokeActionRequest {
            type_name: "test_action".to_string(),
            config: envelope(&config),
        });

        assert_eq!(events.next_event().await, Some(ActionEvent::Started));
        assert_eq!(events.next_event().await, Some(ActionEvent::progress("step 0")));
        events.stop();

        let rest = events.collect_events().await;
        assert_eq!(rest.last(), Some(&ActionEvent::Cancelled));
        assert!(rest.len() <= 2);
    }

    #[tokio::test]
    async fn test_invoke_action_invalid_config() {
        let dispatcher = Dispatcher::new(TestProvider::new());
        let config = Value::new(
            Type::object([("steps".to_string(), Type::Number)]),
            BTreeMap::from([("steps".to_string(), Value::null(Type::Number))]),
        );
        let events = dispatcher
            .invoke_action(InvokeActionRequest {
                type_name: "test_action".to_string(),
                config: envelope(&config),
            })
            .collect_events()
            .await;

        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0],
            ActionEvent::Finished { diagnostics } if has_errors(diagnostics)
        ));
    }

    #[tokio::test]
    async fn test_state_bytes_round_trip() {
        let dispatcher = Dispatcher::new(TestProvider::new())
            .with_options(StreamOptions::default().with_chunk_size(4));
        let request = StateBytesRequest {
            type_name: "local".to_string(),
            state_id: "default".to_string(),
        };
        let payload = b"{\"version\":4,\"resources\":[]}".to_vec();

        let chunks = tokio_stream::iter(crate::stream::chunk_state_bytes(&payload, 4));
        let written = dispatcher.write_state_bytes(request.clone(), chunks).await;
        assert!(written.diagnostics.is_empty());

        let mut stream = dispatcher.read_state_bytes(request);
        let mut assembler = StateChunkAssembler::new();
        let mut count = 0;
        while let Some(chunk) = stream.next_event().await {
            assert!(chunk.bytes.len() <= 4);
            assembler.push(chunk).unwrap();
            count += 1;
        }
        assert_eq!(count, payload.len().div_ceil(4));
        assert_eq!(assembler.finish().unwrap().0, payload);
    }

    #[tokio::test]
    async fn test_read_state_bytes_failure() {
        let dispatcher = Dispatcher::new(TestProvider::new());
        let chunks = dispatcher
            .read_state_bytes(StateBytesRequest {
                type_name: "local".to_string(),
                state_id: "missing".to_string(),
            })
            .collect_events()
            .await;
        assert_eq!(chunks.len(), 1);
        assert!(has_errors(&chunks[0].diagnostics));
    }

    #[tokio::test]
    async fn test_get_provider_schema_reports_invalid_nesting() {
        struct Broken;

        #[async_trait::async_trait]
        impl ProviderService for Broken {
            fn schema(&self) -> ProviderSchema {
                let mut block = crate::schema::NestedBlock::list(crate::schema::Block::new());
                block.nesting_mode = crate::schema::BlockNestingMode::Invalid;
                ProviderSchema::new().with_resource("broken", Schema::v0().with_block("b", block))
            }
            async fn configure(&self, _: Value) -> Result<Vec<Diagnostic>, ProviderError> {
                Ok(vec![])
            }
            async fn plan(
                &self,
                _: &str,
                _: Option<Value>,
                proposed: Value,
                _: Value,
            ) -> Result<PlanResult, ProviderError> {
                Ok(PlanResult::no_change(proposed))
            }
            async fn create(&self, _: &str, planned: Value, _: Value) -> Result<Value, ProviderError> {
                Ok(planned)
            }
            async fn read(&self, _: &str, current: Value) -> Result<Value, ProviderError> {
                Ok(current)
            }
            async fn update(
                &self,
                _: &str,
                _: Value,
                planned: Value,
                _: Value,
            ) -> Result<Value, ProviderError> {
                Ok(planned)
            }
            async fn delete(&self, _: &str, _: Value) -> Result<(), ProviderError> {
                Ok(())
            }
        }

        let dispatcher = Dispatcher::new(Broken);
        let (_, diagnostics) = dispatcher.get_provider_schema();
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].summary.contains("broken"));
    }

    #[tokio::test]
    async fn test_metadata_lists_surfaces() {
        let dispatcher = Dispatcher::new(TestProvider::new());
        let metadata = dispatcher.get_metadata();
        assert_eq!(metadata.resources, vec!["test_resource".to_string()]);
        assert_eq!(metadata.actions, vec!["test_action".to_string()]);
        assert_eq!(metadata.functions, vec!["upper".to_string()]);
    }
}
