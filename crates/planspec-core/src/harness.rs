//! Runs one test case: fixtures in, plan through the interceptors, checks out.

use std::time::{Duration, Instant};

use crate::diag::Diagnostics;
use crate::plan::Plan;
use crate::provider::ProviderSet;
use crate::spec::Spec;

/// Computes a plan while routing every provider call through `providers`.
pub trait Planner: Send + Sync {
    /// Returns the plan, or the diagnostics explaining why none could be
    /// produced.
    fn plan(&self, workspace: Option<&str>, providers: &ProviderSet) -> Result<Plan, Diagnostics>;
}

/// Outcome of one test case.
#[derive(Debug, Clone)]
pub struct CaseReport {
    pub name: String,
    pub diagnostics: Diagnostics,
    /// Absent when the planner failed.
    pub plan: Option<Plan>,
    pub duration: Duration,
}

impl CaseReport {
    pub fn has_errors(&self) -> bool {
        self.diagnostics.has_errors()
    }
}

/// Installs the spec's fixtures, plans, and validates the result.
///
/// The report lists mock usage, then expect usage, then the assert and
/// reject results. Providers are closed before validation whether or not
/// planning succeeded.
pub fn run_case(name: &str, spec: &Spec, providers: &ProviderSet, planner: &dyn Planner) -> CaseReport {
    let started = Instant::now();
    let (mocks, expects) = spec.fixtures();
    providers.mocks().install(mocks);
    providers.expects().install(expects);

    let planned = planner.plan(spec.workspace.as_deref(), providers);
    providers.close_all();

    let (diagnostics, plan) = match planned {
        Ok(plan) => {
            let mut diags = providers.mocks().report();
            diags.extend(providers.expects().report());
            diags.extend(spec.validate(&plan));
            (diags, Some(plan))
        }
        Err(diags) => {
            tracing::warn!(case = name, errors = diags.error_count(), "planning failed");
            (diags, None)
        }
    };

    let report = CaseReport {
        name: name.to_string(),
        diagnostics,
        plan,
        duration: started.elapsed(),
    };
    tracing::info!(
        case = name,
        errors = report.diagnostics.error_count(),
        elapsed_ms = report.duration.as_millis() as u64,
        "case finished"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diag::Diagnostic;
    use crate::path::Path;
    use crate::plan::ResourceChange;
    use crate::provider::{
        EchoPlugin, InProcessConnector, PlanResourceChangeRequest, ProviderPlugin, ReadDataSourceRequest,
    };
    use crate::spec::{Assert, Fixture, TypeName};
    use crate::value::Value;
    use std::sync::Arc;

    /// Reads one data source and plans one instance using the AMI it returned.
    struct AmiPlanner;

    impl Planner for AmiPlanner {
        fn plan(&self, _workspace: Option<&str>, providers: &ProviderSet) -> Result<Plan, Diagnostics> {
            let aws = providers
                .get("aws")
                .map_err(|e| Diagnostics::from(e.to_diagnostic(Path::root())))?;
            let ami = aws
                .read_data_source(ReadDataSourceRequest {
                    type_name: "aws_ami".to_string(),
                    config: Value::object([("owner", Value::from("self"))]),
                })
                .map_err(|e| Diagnostics::from(e.to_diagnostic(Path::root())))?;
            let config = Value::object([
                ("ami", ami.state.get_attr("id").cloned().unwrap_or_default()),
                ("arn", Value::Unknown),
            ]);
            let planned = aws
                .plan_resource_change(PlanResourceChangeRequest {
                    type_name: "aws_instance".to_string(),
                    prior_state: Value::Null,
                    proposed_new_state: config.clone(),
                    config,
                })
                .map_err(|e| Diagnostics::from(e.to_diagnostic(Path::root())))?;
            Ok(Plan {
                resources: vec![ResourceChange::new("aws_instance.web", planned.planned_state)],
                outputs: vec![],
            })
        }
    }

    struct FailingPlanner;

    impl Planner for FailingPlanner {
        fn plan(&self, _workspace: Option<&str>, _providers: &ProviderSet) -> Result<Plan, Diagnostics> {
            Err(Diagnostic::technical(Path::root(), "init failed", "no backend").into())
        }
    }

    fn providers() -> ProviderSet {
        let mut set = ProviderSet::new();
        set.register(
            "aws",
            None,
            Arc::new(InProcessConnector::new(Arc::new(EchoPlugin::default()))),
        );
        set
    }

    fn ami_spec() -> Spec {
        Spec {
            mocks: vec![Fixture::new(
                TypeName::new("aws_ami", "self"),
                Value::object([("owner", Value::from("self"))]),
                Value::object([("id", Value::from("ami-1"))]),
            )],
            expects: vec![Fixture::new(
                TypeName::new("aws_instance", "web"),
                Value::object([("ami", Value::from("ami-1"))]),
                Value::object([("arn", Value::from("arn:web"))]),
            )],
            asserts: vec![Assert {
                type_name: TypeName::new("aws_instance", "web"),
                value: Value::object([("ami", Value::from("ami-1")), ("arn", Value::from("arn:web"))]),
            }],
            ..Spec::default()
        }
    }

    #[test]
    fn test_run_case_passes() {
        let providers = providers();
        let report = run_case("web", &ami_spec(), &providers, &AmiPlanner);

        assert!(!report.has_errors(), "{}", report.diagnostics);
        let details: Vec<_> = report.diagnostics.iter().map(|d| d.detail.clone()).collect();
        assert_eq!(
            details,
            vec![
                "mock has been called 1 time(s)",
                "expect has been called 1 time(s)",
                "ami-1",
                "arn:web",
            ]
        );
        assert!(report.plan.is_some());
        assert!(!providers.get("aws").unwrap().is_connected());
    }

    #[test]
    fn test_run_case_reports_unused_fixture() {
        let mut spec = ami_spec();
        spec.mocks[0].query = Value::object([("owner", Value::from("amazon"))]);
        spec.mocks[0].data = Value::object([("id", Value::from("ami-2"))]);
        let report = run_case("web", &spec, &providers(), &AmiPlanner);

        assert!(report.has_errors());
        let first = report.diagnostics.iter().next().unwrap();
        assert!(first.detail.starts_with("No data source matched :\n"));
    }

    #[test]
    fn test_planner_failure_is_the_report() {
        let report = run_case("broken", &ami_spec(), &providers(), &FailingPlanner);
        assert!(report.plan.is_none());
        assert_eq!(report.diagnostics.len(), 1);
        assert_eq!(report.diagnostics.iter().next().unwrap().summary, "init failed");
    }

    #[test]
    fn test_runs_reset_fixture_counts() {
        let providers = providers();
        let spec = ami_spec();
        run_case("first", &spec, &providers, &AmiPlanner);
        let report = run_case("second", &spec, &providers, &AmiPlanner);
        assert!(report
            .diagnostics
            .iter()
            .any(|d| d.detail == "mock has been called 1 time(s)"));
    }
}
