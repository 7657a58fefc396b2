use std::sync::{Arc, Mutex, PoisonError, RwLock};

use crate::check::merge;
use crate::provider::{
    ApplyResourceChangeRequest, ApplyResourceChangeResponse, GetSchemaResponse, PlanResourceChangeRequest,
    PlanResourceChangeResponse, PluginConnector, PluginProcess, ProviderError, ProviderPlugin,
    ReadDataSourceRequest, ReadDataSourceResponse,
};
use crate::registry::Registry;

/// Stands in for one provider configuration during planning.
///
/// Data source reads are answered from the mock registry and never reach
/// the plugin. Planned resource states come from the plugin with the closest
/// expect fixture merged on top. Applies echo the planned state. The plugin
/// is connected on first use, at most once until [`close`](Self::close).
pub struct ProviderInterceptor {
    name: String,
    alias: Option<String>,
    connector: Arc<dyn PluginConnector>,
    mocks: Arc<Registry>,
    expects: Arc<Registry>,
    cached: RwLock<Option<Arc<dyn ProviderPlugin>>>,
    /// Guards connection and teardown; holds the plugin process if any.
    guarded: Mutex<Option<PluginProcess>>,
}

impl ProviderInterceptor {
    pub fn new(
        name: impl Into<String>,
        connector: Arc<dyn PluginConnector>,
        mocks: Arc<Registry>,
        expects: Arc<Registry>,
    ) -> Self {
        Self {
            name: name.into(),
            alias: None,
            connector,
            mocks,
            expects,
            cached: RwLock::new(None),
            guarded: Mutex::new(None),
        }
    }

    /// Scopes fixture lookups to a provider configuration alias.
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    /// Returns true while a plugin connection is cached.
    pub fn is_connected(&self) -> bool {
        self.cached
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    fn cached_plugin(&self) -> Option<Arc<dyn ProviderPlugin>> {
        self.cached
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(Arc::clone)
    }

    /// Returns the connected plugin, connecting on first use.
    fn plugin(&self) -> Result<Arc<dyn ProviderPlugin>, ProviderError> {
        if let Some(plugin) = self.cached_plugin() {
            return Ok(plugin);
        }

        let mut process = self.guarded.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(plugin) = self.cached_plugin() {
            return Ok(plugin);
        }

        let connection = self.connector.connect().map_err(|e| {
            tracing::warn!(provider = %self.name, error = %e, "plugin connection failed");
            e
        })?;
        tracing::info!(
            provider = %self.name,
            pid = connection.process.as_ref().map(PluginProcess::id),
            "plugin connected"
        );
        *process = connection.process;
        *self.cached.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&connection.plugin));
        Ok(connection.plugin)
    }

    /// Drops the plugin connection and stops its process. Does nothing if
    /// no connection is open; a later call connects again.
    pub fn close(&self) {
        let mut process = self.guarded.lock().unwrap_or_else(PoisonError::into_inner);
        let plugin = self.cached.write().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(mut p) = process.take() {
            if let Err(e) = p.kill() {
                tracing::warn!(provider = %self.name, error = %e, "failed to stop plugin");
            }
        }
        if plugin.is_some() {
            tracing::info!(provider = %self.name, "plugin closed");
        }
    }
}

impl ProviderPlugin for ProviderInterceptor {
    fn get_schema(&self) -> Result<GetSchemaResponse, ProviderError> {
        self.plugin()?.get_schema()
    }

    fn plan_resource_change(
        &self,
        req: PlanResourceChangeRequest,
    ) -> Result<PlanResourceChangeResponse, ProviderError> {
        let type_name = req.type_name.clone();
        let config = req.config.clone();
        let destroying = req.proposed_new_state.is_null();

        let mut resp = self.plugin()?.plan_resource_change(req)?;
        if destroying {
            return Ok(resp);
        }
        if let Some(fake) = self.expects.lookup(&type_name, &config, self.alias()) {
            resp.planned_state = merge(&resp.planned_state, &fake);
        }
        Ok(resp)
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
        let state = self
            .mocks
            .lookup(&req.type_name, &req.config, self.alias())
            .unwrap_or(req.config);
        Ok(ReadDataSourceResponse { state })
    }
}

impl Drop for ProviderInterceptor {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{EchoPlugin, PluginConnection};
    use crate::spec::{Fixture, TypeName};
    use crate::value::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingConnector {
        connects: AtomicUsize,
        fail: bool,
    }

    impl CountingConnector {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                connects: AtomicUsize::new(0),
                fail,
            })
        }
    }

    impl PluginConnector for CountingConnector {
        fn connect(&self) -> Result<PluginConnection, ProviderError> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ProviderError::Dispense("test".to_string()));
            }
            Ok(PluginConnection {
                plugin: Arc::new(EchoPlugin::default()),
                process: None,
            })
        }
    }

    fn interceptor(connector: Arc<CountingConnector>) -> (ProviderInterceptor, Arc<Registry>, Arc<Registry>) {
        let mocks = Arc::new(Registry::mocks());
        let expects = Arc::new(Registry::expects());
        let i = ProviderInterceptor::new("aws", connector, Arc::clone(&mocks), Arc::clone(&expects));
        (i, mocks, expects)
    }

    fn plan_req(config: Value) -> PlanResourceChangeRequest {
        PlanResourceChangeRequest {
            type_name: "aws_instance".to_string(),
            prior_state: Value::Null,
            proposed_new_state: config.clone(),
            config,
        }
    }

    #[test]
    fn test_read_data_source_never_connects() {
        let connector = CountingConnector::new(false);
        let (i, mocks, _) = interceptor(Arc::clone(&connector));
        let query = Value::object([("owner", Value::from("self"))]);
        mocks.install(vec![Fixture::new(
            TypeName::new("aws_ami", "self"),
            query.clone(),
            Value::object([("id", Value::from("ami-1"))]),
        )]);

        let hit = i
            .read_data_source(ReadDataSourceRequest {
                type_name: "aws_ami".to_string(),
                config: query,
            })
            .unwrap();
        assert_eq!(hit.state.get_attr("id"), Some(&Value::from("ami-1")));

        let miss_config = Value::object([("owner", Value::from("other"))]);
        let miss = i
            .read_data_source(ReadDataSourceRequest {
                type_name: "aws_ami".to_string(),
                config: miss_config.clone(),
            })
            .unwrap();
        assert_eq!(miss.state, miss_config);
        assert_eq!(connector.connects.load(Ordering::SeqCst), 0);
        assert!(!i.is_connected());
    }

    #[test]
    fn test_plan_merges_expect() {
        let connector = CountingConnector::new(false);
        let (i, _, expects) = interceptor(Arc::clone(&connector));
        expects.install(vec![Fixture::new(
            TypeName::new("aws_instance", "web"),
            Value::object([("ami", Value::from("ami-1"))]),
            Value::object([("arn", Value::from("arn:web"))]),
        )]);

        let config = Value::object([("ami", Value::from("ami-1")), ("arn", Value::Unknown)]);
        let resp = i.plan_resource_change(plan_req(config)).unwrap();
        assert_eq!(resp.planned_state.get_attr("arn"), Some(&Value::from("arn:web")));
        assert_eq!(resp.planned_state.get_attr("ami"), Some(&Value::from("ami-1")));
        assert_eq!(expects.fixtures()[0].calls(), 1);
        assert_eq!(connector.connects.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_plan_destroy_skips_expects() {
        let (i, _, expects) = interceptor(CountingConnector::new(false));
        expects.install(vec![Fixture::new(TypeName::new("aws_instance", "web"), Value::Null, Value::Null)]);
        let mut req = plan_req(Value::Null);
        req.prior_state = Value::object([("ami", Value::from("ami-1"))]);
        i.plan_resource_change(req).unwrap();
        assert_eq!(expects.fixtures()[0].calls(), 0);
    }

    #[test]
    fn test_apply_echoes_planned_state() {
        let connector = CountingConnector::new(false);
        let (i, _, _) = interceptor(Arc::clone(&connector));
        let planned = Value::object([("id", Value::from("i-1"))]);
        let resp = i
            .apply_resource_change(ApplyResourceChangeRequest {
                type_name: "aws_instance".to_string(),
                prior_state: Value::Null,
                planned_state: planned.clone(),
                config: Value::Null,
            })
            .unwrap();
        assert_eq!(resp.new_state, planned);
        assert_eq!(connector.connects.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_connect_failure_is_call_error() {
        let connector = CountingConnector::new(true);
        let (i, _, _) = interceptor(Arc::clone(&connector));
        let err = i.get_schema().unwrap_err();
        assert!(matches!(err, ProviderError::Dispense(_)));
        assert!(i.plan_resource_change(plan_req(Value::Null)).is_err());
        assert_eq!(connector.connects.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_close_is_idempotent_and_reconnects() {
        let connector = CountingConnector::new(false);
        let (i, _, _) = interceptor(Arc::clone(&connector));
        i.close();
        i.get_schema().unwrap();
        assert!(i.is_connected());
        i.close();
        i.close();
        assert!(!i.is_connected());
        i.get_schema().unwrap();
        assert_eq!(connector.connects.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_concurrent_first_use_connects_once() {
        let connector = CountingConnector::new(false);
        let (i, _, _) = interceptor(Arc::clone(&connector));
        let i = Arc::new(i);
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let i = Arc::clone(&i);
                std::thread::spawn(move || i.get_schema().map(|_| ()))
            })
            .collect();
        for h in handles {
            h.join().unwrap().unwrap();
        }
        assert_eq!(connector.connects.load(Ordering::SeqCst), 1);
    }
}
