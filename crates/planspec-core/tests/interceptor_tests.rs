//! Tests for provider interception against launched plugin processes and
//! for a full case run through several provider configurations.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use planspec_core::harness::{run_case, Planner};
use planspec_core::plan::{OutputChange, Plan, ResourceChange};
use planspec_core::provider::{
    Dispenser, EchoPlugin, InProcessConnector, PlanResourceChangeRequest, PluginConnector, PluginMeta,
    ProcessConnector, ProviderError, ProviderInterceptor, ProviderPlugin, ProviderSet, ReadDataSourceRequest,
};
use planspec_core::registry::Registry;
use planspec_core::spec::{Assert, Fixture, Reject, Spec, TypeName};
use planspec_core::{Diagnostics, Path, Value};
use tokio::runtime::Handle;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

#[derive(Default)]
struct CountingDispenser {
    calls: AtomicUsize,
}

impl Dispenser for CountingDispenser {
    fn dispense(
        &self,
        _name: &str,
        _channel: tonic::transport::Channel,
    ) -> Result<Arc<dyn ProviderPlugin>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(EchoPlugin::default()))
    }
}

fn sh_plugin(script: &str) -> PluginMeta {
    PluginMeta::new("sh", "sh").with_args(["-c", script])
}

fn interceptor(connector: Arc<dyn PluginConnector>) -> (ProviderInterceptor, Arc<Registry>) {
    let mocks = Arc::new(Registry::mocks());
    let i = ProviderInterceptor::new("aws", connector, Arc::clone(&mocks), Arc::new(Registry::expects()));
    (i, mocks)
}

// ---------------------------------------------------------------------------
// Launched plugins
// ---------------------------------------------------------------------------

#[cfg(unix)]
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_unreachable_plugin_is_a_connect_error() {
    let dispenser = Arc::new(CountingDispenser::default());
    let connector = Arc::new(ProcessConnector::new(
        sh_plugin("echo '1|5|tcp|127.0.0.1:1|grpc'; sleep 30"),
        Arc::clone(&dispenser) as Arc<dyn Dispenser>,
        Handle::current(),
    ));
    let (i, _) = interceptor(connector);

    let err = i.get_schema().unwrap_err();
    assert!(matches!(err, ProviderError::Connect { .. }), "{}", err);
    assert!(!i.is_connected());
    assert_eq!(dispenser.calls.load(Ordering::SeqCst), 0);

    let diag = err.to_diagnostic(Path::attr_path("aws_instance.web"));
    assert!(diag.is_error());
}

#[cfg(unix)]
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_non_grpc_plugin_is_rejected() {
    let connector = Arc::new(ProcessConnector::new(
        sh_plugin("echo '1|5|tcp|127.0.0.1:1|netrpc'; sleep 30"),
        Arc::new(CountingDispenser::default()),
        Handle::current(),
    ));
    let (i, _) = interceptor(connector);
    assert!(matches!(i.get_schema(), Err(ProviderError::Handshake(_))));
}

#[cfg(unix)]
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_data_reads_never_launch_the_plugin() {
    // Any launch attempt would fail on the missing binary.
    let connector = Arc::new(ProcessConnector::new(
        PluginMeta::new("ghost", "/nonexistent/terraform-provider-ghost"),
        Arc::new(CountingDispenser::default()),
        Handle::current(),
    ));
    let (i, mocks) = interceptor(connector);
    let query = Value::object([("name", Value::from("vpc"))]);
    mocks.install(vec![Fixture::new(
        TypeName::new("aws_vpc", "main"),
        query.clone(),
        Value::object([("id", Value::from("vpc-1"))]),
    )]);

    let resp = i
        .read_data_source(ReadDataSourceRequest {
            type_name: "aws_vpc".to_string(),
            config: query,
        })
        .unwrap();
    assert_eq!(resp.state.get_attr("id"), Some(&Value::from("vpc-1")));
    assert!(matches!(i.get_schema(), Err(ProviderError::Launch { .. })));
}

// ---------------------------------------------------------------------------
// Case runs across provider configurations
// ---------------------------------------------------------------------------

/// Plans one bucket through the default `aws` configuration and one through
/// `aws.replica`, each named after the account its data source returned.
struct ReplicaPlanner;

impl ReplicaPlanner {
    fn bucket(providers: &ProviderSet, config: &str, address: &str) -> Result<ResourceChange, ProviderError> {
        let provider = providers.get(config)?;
        let account = provider.read_data_source(ReadDataSourceRequest {
            type_name: "aws_caller_identity".to_string(),
            config: Value::object([("id", Value::Null)]),
        })?;
        let bucket = Value::object([
            (
                "bucket",
                account.state.get_attr("account_id").cloned().unwrap_or_default(),
            ),
            ("arn", Value::Unknown),
            ("acl", Value::from("private")),
        ]);
        let planned = provider.plan_resource_change(PlanResourceChangeRequest {
            type_name: "aws_s3_bucket".to_string(),
            prior_state: Value::Null,
            proposed_new_state: bucket.clone(),
            config: bucket,
        })?;
        Ok(ResourceChange::new(address, planned.planned_state).with_provider(config))
    }
}

impl Planner for ReplicaPlanner {
    fn plan(&self, _workspace: Option<&str>, providers: &ProviderSet) -> Result<Plan, Diagnostics> {
        let to_diags = |e: ProviderError| Diagnostics::from(e.to_diagnostic(Path::root()));
        let primary = Self::bucket(providers, "aws", "aws_s3_bucket.primary").map_err(to_diags)?;
        let replica = Self::bucket(providers, "aws.replica", "aws_s3_bucket.replica").map_err(to_diags)?;
        let arn = primary.after.get_attr("arn").cloned().unwrap_or_default();
        Ok(Plan {
            resources: vec![primary, replica],
            outputs: vec![OutputChange::new("primary_arn", arn)],
        })
    }
}

fn account(id: &str) -> Fixture {
    Fixture::new(
        TypeName::new("aws_caller_identity", "current"),
        Value::object([("id", Value::Null)]),
        Value::object([("account_id", Value::from(id))]),
    )
}

fn replica_providers() -> ProviderSet {
    let echo = || -> Arc<dyn PluginConnector> { Arc::new(InProcessConnector::new(Arc::new(EchoPlugin::default()))) };
    let mut set = ProviderSet::new();
    set.register("aws", None, echo());
    set.register("aws", Some("replica"), echo());
    set
}

fn replica_spec() -> Spec {
    Spec {
        mocks: vec![account("111"), account("222").with_provider("replica")],
        expects: vec![
            Fixture::new(
                TypeName::new("aws_s3_bucket", "primary"),
                Value::object([("bucket", Value::from("111"))]),
                Value::object([("arn", Value::from("arn:aws:s3:::111"))]),
            ),
            Fixture::new(
                TypeName::new("aws_s3_bucket", "replica"),
                Value::object([("bucket", Value::from("222"))]),
                Value::object([("arn", Value::from("arn:aws:s3:::222"))]),
            )
            .with_provider("replica"),
        ],
        asserts: vec![
            Assert {
                type_name: TypeName::new("aws_s3_bucket", "primary"),
                value: Value::object([("bucket", Value::from("111")), ("arn", Value::from("arn:aws:s3:::111"))]),
            },
            Assert {
                type_name: TypeName::new("aws_s3_bucket", "replica"),
                value: Value::object([("bucket", Value::from("222"))]),
            },
            Assert {
                type_name: TypeName::new("output", "primary_arn"),
                value: Value::object([("value", Value::from("arn:aws:s3:::111"))]),
            },
        ],
        rejects: vec![Reject {
            type_name: TypeName::new("aws_s3_bucket", "replica"),
            shape: Some(Value::object([("acl", Value::from("public-read"))])),
        }],
        ..Spec::default()
    }
}

#[test]
fn test_scoped_fixtures_per_provider_configuration() {
    let providers = replica_providers();
    let report = run_case("replica", &replica_spec(), &providers, &ReplicaPlanner);

    assert!(!report.has_errors(), "{}", report.diagnostics);
    let plan = report.plan.as_ref().unwrap();
    assert_eq!(
        plan.resource("aws_s3_bucket.replica").unwrap().after.get_attr("bucket"),
        Some(&Value::from("222"))
    );
    assert_eq!(
        plan.resource("aws_s3_bucket.primary").unwrap().after.get_attr("arn"),
        Some(&Value::from("arn:aws:s3:::111"))
    );
    // The scoped expect wins over the unscoped one for the aliased provider.
    assert_eq!(
        plan.resource("aws_s3_bucket.replica").unwrap().after.get_attr("arn"),
        Some(&Value::from("arn:aws:s3:::222"))
    );
    assert!(!providers.get("aws.replica").unwrap().is_connected());
}

#[test]
fn test_failed_assertions_do_not_stop_the_case() {
    let mut spec = replica_spec();
    spec.asserts[1].value = Value::object([("bucket", Value::from("333"))]);
    spec.asserts.push(Assert {
        type_name: TypeName::new("aws_s3_bucket", "replca"),
        value: Value::object([("bucket", Value::from("222"))]),
    });
    let report = run_case("replica", &spec, &replica_providers(), &ReplicaPlanner);

    let errors: Vec<_> = report.diagnostics.iter().filter(|d| d.is_error()).collect();
    assert_eq!(errors.len(), 2);
    assert_eq!(errors[0].detail, "222 != 333");
    assert_eq!(errors[1].summary, "Could not find resource aws_s3_bucket.replca in changes");
    assert_eq!(errors[1].detail, "did you mean aws_s3_bucket.replica?");
}

#[test]
fn test_unknown_provider_configuration_fails_the_case() {
    let mut providers = ProviderSet::new();
    providers.register(
        "aws",
        None,
        Arc::new(InProcessConnector::new(Arc::new(EchoPlugin::default()))),
    );
    let report = run_case("replica", &replica_spec(), &providers, &ReplicaPlanner);
    assert!(report.plan.is_none());
    assert!(report.has_errors());
}
