use serde::{Deserialize, Serialize};

use crate::value::Value;

/// A computed set of resource and output changes, as handed over by the
/// planner.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    #[serde(default)]
    pub resources: Vec<ResourceChange>,
    #[serde(default)]
    pub outputs: Vec<OutputChange>,
}

/// The planned change of one resource instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceChange {
    /// Fully qualified instance address, e.g. `module.net.aws_vpc.main`.
    pub address: String,
    /// Provider configuration name, `aws` or `aws.east`.
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub after: Value,
}

/// The planned value of one output. `after` is a one-element sequence
/// wrapping the output value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputChange {
    pub name: String,
    #[serde(default)]
    pub after: Value,
}

impl Plan {
    /// Returns true if the plan carries at least one change.
    pub fn has_changes(&self) -> bool {
        !self.resources.is_empty() || !self.outputs.is_empty()
    }

    /// Finds a resource change by exact address.
    pub fn resource(&self, address: &str) -> Option<&ResourceChange> {
        self.resources.iter().find(|r| r.address == address)
    }

    /// Finds an output change by name.
    pub fn output(&self, name: &str) -> Option<&OutputChange> {
        self.outputs.iter().find(|o| o.name == name)
    }

    pub fn addresses(&self) -> impl Iterator<Item = &str> {
        self.resources.iter().map(|r| r.address.as_str())
    }
}

impl ResourceChange {
    pub fn new(address: impl Into<String>, after: Value) -> Self {
        Self {
            address: address.into(),
            provider: None,
            after,
        }
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Returns the resource type, the second to last address segment.
    pub fn resource_type(&self) -> &str {
        let mut parts = self.address.rsplit('.');
        let _name = parts.next();
        parts.next().unwrap_or(&self.address)
    }

    /// Returns the instance name, the last address segment.
    pub fn name(&self) -> &str {
        self.address.rsplit('.').next().unwrap_or(&self.address)
    }

    /// Returns the provider configuration this resource is planned by,
    /// defaulting to the type's prefix (`aws` for `aws_instance`).
    pub fn provider_config(&self) -> &str {
        match &self.provider {
            Some(p) => p,
            None => provider_for_type(self.resource_type()),
        }
    }
}

impl OutputChange {
    /// Wraps a plain output value the way planners report it.
    pub fn new(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            after: Value::List(vec![value]),
        }
    }
}

/// Returns the provider name implied by a resource type.
pub fn provider_for_type(resource_type: &str) -> &str {
    resource_type.split('_').next().unwrap_or(resource_type)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_address_parts() {
        let r = ResourceChange::new("module.net.aws_vpc.main", Value::Null);
        assert_eq!(r.resource_type(), "aws_vpc");
        assert_eq!(r.name(), "main");
        assert_eq!(r.provider_config(), "aws");
        let r = r.with_provider("aws.east");
        assert_eq!(r.provider_config(), "aws.east");
    }

    #[test]
    fn test_plan_lookup() {
        let plan = Plan {
            resources: vec![ResourceChange::new("aws_instance.web", Value::Null)],
            outputs: vec![OutputChange::new("ip", Value::from("10.0.0.1"))],
        };
        assert!(plan.has_changes());
        assert!(plan.resource("aws_instance.web").is_some());
        assert!(plan.resource("aws_instance").is_none());
        assert_eq!(
            plan.output("ip").map(|o| &o.after),
            Some(&Value::List(vec![Value::from("10.0.0.1")]))
        );
        assert!(!Plan::default().has_changes());
    }

    #[test]
    fn test_plan_deserialize() {
        let plan: Plan = serde_json::from_str(
            r#"{"resources": [{"address": "aws_s3_bucket.logs", "after": {"bucket": "logs"}}]}"#,
        )
        .unwrap();
        assert_eq!(plan.resources[0].resource_type(), "aws_s3_bucket");
        assert!(plan.outputs.is_empty());
    }
}
