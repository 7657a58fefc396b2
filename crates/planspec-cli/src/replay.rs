//! Replays a recorded plan through the provider interceptors.
//!
//! A recording lists the data source reads, resource configurations and
//! outputs of a configuration. Replaying sends every read and every
//! resource through its provider interceptor, so mocks answer the reads
//! and expects shape the planned states, exactly as they would during a
//! real plan. A string of the form `${address.attr}` refers to an earlier
//! read or resource.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Deserialize;

use planspec_core::harness::Planner;
use planspec_core::plan::{provider_for_type, OutputChange, Plan, ResourceChange};
use planspec_core::provider::{
    EchoPlugin, InProcessConnector, PlanResourceChangeRequest, ProviderError, ProviderPlugin, ProviderSet,
    ReadDataSourceRequest,
};
use planspec_core::{Diagnostic, Diagnostics, Path, Value};

/// A provider configuration declared by the recording.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ProviderConfig {
    pub name: String,
    #[serde(default)]
    pub alias: Option<String>,
}

/// A data source read or resource configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RecordedBlock {
    pub address: String,
    /// Provider configuration, defaulting to the type's prefix.
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub config: Value,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RecordedOutput {
    pub name: String,
    #[serde(default)]
    pub value: Value,
}

/// What a configuration asks of its providers.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RecordedPlan {
    /// Workspace the recording was made in.
    #[serde(default)]
    pub workspace: Option<String>,
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
    #[serde(default)]
    pub data_sources: Vec<RecordedBlock>,
    #[serde(default)]
    pub resources: Vec<RecordedBlock>,
    #[serde(default)]
    pub outputs: Vec<RecordedOutput>,
}

impl RecordedBlock {
    fn block_type(&self) -> &str {
        let mut parts = self.address.rsplit('.');
        let _name = parts.next();
        parts.next().unwrap_or(&self.address)
    }

    fn provider_config(&self) -> &str {
        match &self.provider {
            Some(p) => p,
            None => provider_for_type(self.block_type()),
        }
    }
}

impl RecordedPlan {
    /// Builds the interceptors for every provider configuration the
    /// recording uses, each backed by an in-process plugin that plans the
    /// proposed state as is.
    pub fn provider_set(&self) -> ProviderSet {
        let mut configs: BTreeMap<String, (String, Option<String>)> = BTreeMap::new();
        for p in &self.providers {
            let key = match &p.alias {
                Some(alias) => format!("{}.{}", p.name, alias),
                None => p.name.clone(),
            };
            configs.insert(key, (p.name.clone(), p.alias.clone()));
        }
        for block in self.data_sources.iter().chain(&self.resources) {
            let config = block.provider_config();
            if !configs.contains_key(config) {
                let (name, alias) = match config.split_once('.') {
                    Some((name, alias)) => (name.to_string(), Some(alias.to_string())),
                    None => (config.to_string(), None),
                };
                configs.insert(config.to_string(), (name, alias));
            }
        }

        let plugin: Arc<dyn ProviderPlugin> = Arc::new(EchoPlugin::default());
        let mut set = ProviderSet::new();
        for (name, alias) in configs.values() {
            set.register(name, alias.as_deref(), Arc::new(InProcessConnector::new(Arc::clone(&plugin))));
        }
        set
    }
}

/// A [`Planner`] that replays a [`RecordedPlan`].
pub struct RecordedPlanner {
    recording: RecordedPlan,
}

impl RecordedPlanner {
    pub fn new(recording: RecordedPlan) -> Self {
        Self { recording }
    }
}

impl Planner for RecordedPlanner {
    fn plan(&self, workspace: Option<&str>, providers: &ProviderSet) -> Result<Plan, Diagnostics> {
        if let (Some(wanted), Some(recorded)) = (workspace, self.recording.workspace.as_deref()) {
            if wanted != recorded {
                return Err(Diagnostic::technical(
                    Path::root(),
                    "workspace mismatch",
                    format!("plan was recorded in workspace {}, not {}", recorded, wanted),
                )
                .into());
            }
        }

        let mut state: BTreeMap<String, Value> = BTreeMap::new();
        let mut plan = Plan::default();

        for read in &self.recording.data_sources {
            let path = Path::attr_path(read.address.clone());
            let fail = |e: ProviderError| Diagnostics::from(e.to_diagnostic(path.clone()));
            let config = resolve(&read.config, &state).map_err(|d| d.at(&path))?;
            let provider = providers.get(read.provider_config()).map_err(fail)?;
            let resp = provider
                .read_data_source(ReadDataSourceRequest {
                    type_name: read.block_type().to_string(),
                    config,
                })
                .map_err(fail)?;
            state.insert(read.address.clone(), resp.state);
        }

        for resource in &self.recording.resources {
            let path = Path::attr_path(resource.address.clone());
            let fail = |e: ProviderError| Diagnostics::from(e.to_diagnostic(path.clone()));
            let config = resolve(&resource.config, &state).map_err(|d| d.at(&path))?;
            let provider = providers.get(resource.provider_config()).map_err(fail)?;
            let resp = provider
                .plan_resource_change(PlanResourceChangeRequest {
                    type_name: resource.block_type().to_string(),
                    prior_state: Value::Null,
                    proposed_new_state: config.clone(),
                    config,
                })
                .map_err(fail)?;
            state.insert(resource.address.clone(), resp.planned_state.clone());
            plan.resources.push(
                ResourceChange::new(resource.address.clone(), resp.planned_state)
                    .with_provider(resource.provider_config()),
            );
        }

        for output in &self.recording.outputs {
            let path = Path::attr_path("output").attr(output.name.clone());
            let value = resolve(&output.value, &state).map_err(|d| d.at(&path))?;
            plan.outputs.push(OutputChange::new(output.name.clone(), value));
        }

        tracing::debug!(
            resources = plan.resources.len(),
            outputs = plan.outputs.len(),
            "recorded plan replayed"
        );
        Ok(plan)
    }
}

/// A reference that names no earlier read or resource.
#[derive(Debug)]
struct Unresolved(String);

impl Unresolved {
    fn at(self, path: &Path) -> Diagnostics {
        Diagnostic::technical(path.clone(), "unresolved reference", self.0).into()
    }
}

/// Replaces every `${...}` reference in `value` with the value it names.
fn resolve(value: &Value, state: &BTreeMap<String, Value>) -> Result<Value, Unresolved> {
    match value {
        Value::String(s) => match s.strip_prefix("${").and_then(|r| r.strip_suffix('}')) {
            Some(reference) => lookup(reference, state),
            None => Ok(value.clone()),
        },
        Value::List(items) => Ok(Value::List(resolve_all(items, state)?)),
        Value::Set(items) => Ok(Value::Set(resolve_all(items, state)?)),
        Value::Object(fields) => Ok(Value::Object(resolve_fields(fields, state)?)),
        Value::Map(fields) => Ok(Value::Map(resolve_fields(fields, state)?)),
        _ => Ok(value.clone()),
    }
}

fn resolve_all(items: &[Value], state: &BTreeMap<String, Value>) -> Result<Vec<Value>, Unresolved> {
    items.iter().map(|v| resolve(v, state)).collect()
}

fn resolve_fields(
    fields: &BTreeMap<String, Value>,
    state: &BTreeMap<String, Value>,
) -> Result<BTreeMap<String, Value>, Unresolved> {
    fields
        .iter()
        .map(|(k, v)| Ok((k.clone(), resolve(v, state)?)))
        .collect()
}

/// Resolves `address.attr.0.nested` against the recorded state. The
/// longest address that prefixes the reference wins.
fn lookup(reference: &str, state: &BTreeMap<String, Value>) -> Result<Value, Unresolved> {
    let (address, root) = state
        .iter()
        .filter(|(address, _)| {
            reference == address.as_str()
                || reference
                    .strip_prefix(address.as_str())
                    .is_some_and(|rest| rest.starts_with('.'))
        })
        .max_by_key(|(address, _)| address.len())
        .ok_or_else(|| Unresolved(reference.to_string()))?;

    let mut path = Path::root();
    for step in reference[address.len()..].split('.').filter(|s| !s.is_empty()) {
        path = match step.parse::<usize>() {
            Ok(i) => path.index(i),
            Err(_) => path.attr(step),
        };
    }
    Ok(path.apply(root).cloned().unwrap_or(Value::Null))
}
