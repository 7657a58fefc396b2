//! Provider call surface, interception and plugin process management.
//!
//! The planner talks to providers through [`ProviderPlugin`]. Every provider
//! it sees is a [`ProviderInterceptor`] that answers data source reads from
//! the mock registry, overlays expect fixtures onto planned states and
//! forwards the rest to the real plugin, connected on first use.

mod interceptor;
mod launcher;
mod set;

pub use interceptor::ProviderInterceptor;
pub use launcher::{
    Dispenser, Handshake, InProcessConnector, PluginConnection, PluginConnector, PluginMeta,
    PluginProcess, ProcessConnector,
};
pub use set::ProviderSet;

use crate::diag::Diagnostic;
use crate::path::Path;
use crate::value::Value;

/// Errors raised while reaching or calling a provider plugin.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("failed to launch plugin {name}: {reason}")]
    Launch { name: String, reason: String },
    #[error("plugin handshake failed: {0}")]
    Handshake(String),
    #[error("failed to connect to plugin at {address}: {reason}")]
    Connect { address: String, reason: String },
    #[error("plugin {0} is not a provider")]
    Dispense(String),
    #[error("{call} failed: {reason}")]
    Call { call: &'static str, reason: String },
    #[error("no provider configured for {0}")]
    UnknownProvider(String),
}

impl ProviderError {
    /// Reports this error as a technical failure of the call at `path`.
    pub fn to_diagnostic(&self, path: Path) -> Diagnostic {
        Diagnostic::technical(path, "provider error", self.to_string())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GetSchemaResponse {
    pub schema: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlanResourceChangeRequest {
    pub type_name: String,
    pub prior_state: Value,
    pub proposed_new_state: Value,
    pub config: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlanResourceChangeResponse {
    pub planned_state: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApplyResourceChangeRequest {
    pub type_name: String,
    pub prior_state: Value,
    pub planned_state: Value,
    pub config: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApplyResourceChangeResponse {
    pub new_state: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReadDataSourceRequest {
    pub type_name: String,
    pub config: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReadDataSourceResponse {
    pub state: Value,
}

/// The calls a planner makes on a provider.
///
/// Implementations can be:
/// - `EchoPlugin` for tests and recorded plans (answers with its inputs)
/// - a wire-protocol client handed out by a [`Dispenser`]
/// - `ProviderInterceptor`, which wraps either of the above
pub trait ProviderPlugin: Send + Sync {
    fn get_schema(&self) -> Result<GetSchemaResponse, ProviderError>;

    fn plan_resource_change(
        &self,
        req: PlanResourceChangeRequest,
    ) -> Result<PlanResourceChangeResponse, ProviderError>;

    fn apply_resource_change(
        &self,
        req: ApplyResourceChangeRequest,
    ) -> Result<ApplyResourceChangeResponse, ProviderError>;

    fn read_data_source(
        &self,
        req: ReadDataSourceRequest,
    ) -> Result<ReadDataSourceResponse, ProviderError>;
}

/// Plugin that answers every call with its own inputs: planned state is the
/// proposed state, data source state is the config.
#[derive(Debug, Clone, Default)]
pub struct EchoPlugin {
    pub schema: Value,
}

impl ProviderPlugin for EchoPlugin {
    fn get_schema(&self) -> Result<GetSchemaResponse, ProviderError> {
        Ok(GetSchemaResponse {
            schema: self.schema.clone(),
        })
    }

    fn plan_resource_change(
        &self,
        req: PlanResourceChangeRequest,
    ) -> Result<PlanResourceChangeResponse, ProviderError> {
        Ok(PlanResourceChangeResponse {
            planned_state: req.proposed_new_state,
        })
    }

    fn apply_resource_change(
        &self,
        req: ApplyResourceChangeRequest,
    ) -> Result<ApplyResourceChangeResponse, ProviderError> {
        Ok(ApplyResourceChangeResponse {
            new_state: req.planned_state,
        })
    }

    fn read_data_source(
        &self,
        req: ReadDataSourceRequest,
    ) -> Result<ReadDataSourceResponse, ProviderError> {
        Ok(ReadDataSourceResponse { state: req.config })
    }
}
