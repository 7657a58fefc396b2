//! Declared expectations of a test case and their validation against a plan.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::check::{check_output, check_reject, compare, planned_output};
use crate::diag::{closest_match, Diagnostic, Diagnostics};
use crate::path::Path;
use crate::plan::Plan;
use crate::render;
use crate::value::Value;

/// Type used by assertions on planned outputs.
pub const OUTPUT_TYPE: &str = "output";

/// Identifies one declared record by type and name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeName {
    #[serde(rename = "type")]
    pub type_name: String,
    pub name: String,
}

impl TypeName {
    pub fn new(type_name: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            name: name.into(),
        }
    }

    /// Returns the `type.name` key used to find a change in a plan.
    pub fn key(&self) -> String {
        format!("{}.{}", self.type_name, self.name)
    }

    pub fn path(&self) -> Path {
        Path::attr_path(self.type_name.clone()).attr(self.name.clone())
    }

    pub fn is_output(&self) -> bool {
        self.type_name == OUTPUT_TYPE
    }
}

impl fmt::Display for TypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.type_name, self.name)
    }
}

/// Expects the planned value of a resource or output to match `value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assert {
    #[serde(flatten)]
    pub type_name: TypeName,
    #[serde(default)]
    pub value: Value,
}

/// Expects the planned value of a resource not to match `shape`.
///
/// Without a shape, the rejection is carried by `reject` blocks nested in
/// the resource's asserts and this record only requires the resource to be
/// planned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reject {
    #[serde(flatten)]
    pub type_name: TypeName,
    #[serde(default)]
    pub shape: Option<Value>,
}

/// A mock (data source answer) or expect (planned attribute override).
///
/// `data` is what a matching call receives. Null leaves of the declared
/// data are filled from `query` at construction, so a fixture only spells
/// out what it overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "FixtureDef", into = "FixtureDef")]
pub struct Fixture {
    pub type_name: TypeName,
    pub query: Value,
    pub data: Value,
    /// Source text shown when the fixture is reported unused.
    pub body: String,
    /// Provider configuration alias the fixture is scoped to.
    pub provider: Option<String>,
    pub(crate) calls: usize,
}

#[derive(Serialize, Deserialize)]
struct FixtureDef {
    #[serde(flatten)]
    type_name: TypeName,
    #[serde(default)]
    query: Value,
    #[serde(default, rename = "return")]
    data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    body: Option<String>,
}

impl From<FixtureDef> for Fixture {
    fn from(def: FixtureDef) -> Self {
        let mut fixture = Fixture::new(def.type_name, def.query, def.data);
        fixture.provider = def.provider;
        if let Some(body) = def.body {
            fixture.body = body;
        }
        fixture
    }
}

impl From<Fixture> for FixtureDef {
    fn from(f: Fixture) -> Self {
        FixtureDef {
            type_name: f.type_name,
            query: f.query,
            data: f.data,
            provider: f.provider,
            body: Some(f.body),
        }
    }
}

impl Fixture {
    pub fn new(type_name: TypeName, query: Value, data: Value) -> Self {
        let data = data.backfill(&query);
        let body = format!("{{\n{}}}\n", render::to_hcl(&query));
        Self {
            type_name,
            query,
            data,
            body,
            provider: None,
            calls: 0,
        }
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_provider(mut self, alias: impl Into<String>) -> Self {
        self.provider = Some(alias.into());
        self
    }

    /// Number of calls this fixture answered.
    pub fn calls(&self) -> usize {
        self.calls
    }

    pub fn called(&self) -> bool {
        self.calls > 0
    }
}

/// Everything a test case declares.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Spec {
    /// Workspace the plan is computed in.
    #[serde(default)]
    pub workspace: Option<String>,
    #[serde(default)]
    pub asserts: Vec<Assert>,
    #[serde(default)]
    pub rejects: Vec<Reject>,
    #[serde(default)]
    pub mocks: Vec<Fixture>,
    #[serde(default)]
    pub expects: Vec<Fixture>,
}

impl Spec {
    /// Checks every assert and reject against the plan.
    ///
    /// A missing resource or output is reported for that record only and
    /// does not stop the others from being checked.
    pub fn validate(&self, plan: &Plan) -> Diagnostics {
        let mut diags = Diagnostics::new();

        if !plan.has_changes() {
            diags.add(Diagnostic::technical(Path::root(), "plan has no changes", ""));
            return diags;
        }

        for assert in &self.asserts {
            let key = assert.type_name.key();
            let path = Path::attr_path(key.clone());
            if assert.type_name.is_output() {
                match plan.output(&assert.type_name.name) {
                    Some(output) => diags.extend(check_output(&path, &assert.value, &output.after)),
                    None => diags.error(path, "Missing value"),
                }
                continue;
            }
            match plan.resource(&key) {
                Some(change) => diags.extend(compare(&path, &assert.value, &change.after)),
                None => diags.add(missing_resource(plan, &key)),
            }
        }

        for reject in &self.rejects {
            let key = reject.type_name.key();
            let path = Path::attr_path(key.clone());
            let planned = if reject.type_name.is_output() {
                match plan.output(&reject.type_name.name).map(|o| planned_output(&path, &o.after)) {
                    Some(Err(unreadable)) => {
                        diags.add(unreadable);
                        continue;
                    }
                    Some(Ok(value)) => Some(value),
                    None => None,
                }
            } else {
                plan.resource(&key).map(|r| &r.after)
            };
            match (planned, &reject.shape) {
                (None, _) => diags.add(missing_resource(plan, &key)),
                (Some(actual), Some(shape)) => diags.extend(check_reject(&path, shape, actual)),
                (Some(_), None) => {}
            }
        }

        diags
    }

    /// Returns the spec's fixtures with every call count reset.
    pub fn fixtures(&self) -> (Vec<Fixture>, Vec<Fixture>) {
        let reset = |fixtures: &[Fixture]| {
            fixtures
                .iter()
                .cloned()
                .map(|mut f| {
                    f.calls = 0;
                    f
                })
                .collect()
        };
        (reset(&self.mocks), reset(&self.expects))
    }
}

fn missing_resource(plan: &Plan, key: &str) -> Diagnostic {
    let hint = closest_match(plan.addresses(), key)
        .map(|m| format!("did you mean {}?", m))
        .unwrap_or_default();
    Diagnostic::technical(
        Path::attr_path(key.to_string()),
        format!("Could not find resource {} in changes", key),
        hint,
    )
}
