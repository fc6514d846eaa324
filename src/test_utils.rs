use crate::connector::{
    AttributeSet, Capability, Configuration, ConfigurationSchema, Connector, ConnectorFactory,
    ConnectorObject, CreateOp, Filter, ObjectClass, OperationOptions, PoolableConnector,
    PropertySpec, PropertyType, ResultsHandler, SearchOp, SearchResult, TestOp, Uid,
};
use crate::error::{ConnectorError, ConnectorResult};
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Default)]
pub struct MockCounters {
    pub inits: AtomicUsize,
    pub disposes: AtomicUsize,
    pub open_cursors: AtomicUsize,
    pub accepted: AtomicUsize,
    /// Makes every liveness check fail while set.
    pub unreachable: AtomicBool,
}

#[derive(Clone)]
pub struct MockConnectorFactory {
    counters: Arc<MockCounters>,
    poolable: bool,
    fail_init: bool,
    fail_alive_after: Option<usize>,
    records: usize,
    operation_delay: Option<Duration>,
    init_delay: Option<Duration>,
}

impl MockConnectorFactory {
    pub fn new() -> Self {
        Self {
            counters: Arc::new(MockCounters::default()),
            poolable: false,
            fail_init: false,
            fail_alive_after: None,
            records: 3,
            operation_delay: None,
            init_delay: None,
        }
    }

    pub fn poolable(mut self) -> Self {
        self.poolable = true;
        self
    }

    pub fn failing_init(mut self) -> Self {
        self.fail_init = true;
        self
    }

    pub fn fail_alive_after(mut self, checks: usize) -> Self {
        self.fail_alive_after = Some(checks);
        self
    }

    pub fn with_records(mut self, records: usize) -> Self {
        self.records = records;
        self
    }

    pub fn with_operation_delay(mut self, delay: Duration) -> Self {
        self.operation_delay = Some(delay);
        self
    }

    pub fn with_init_delay(mut self, delay: Duration) -> Self {
        self.init_delay = Some(delay);
        self
    }

    pub fn counters(&self) -> Arc<MockCounters> {
        self.counters.clone()
    }
}

impl ConnectorFactory for MockConnectorFactory {
    fn capabilities(&self) -> BTreeSet<Capability> {
        let mut capabilities: BTreeSet<Capability> =
            [Capability::Create, Capability::Search, Capability::Test]
                .into_iter()
                .collect();
        if self.poolable {
            capabilities.insert(Capability::Pooling);
        }
        capabilities
    }

    fn configuration_schema(&self) -> ConfigurationSchema {
        ConfigurationSchema::new(vec![
            PropertySpec::new("host", PropertyType::String).with_default("localhost"),
            PropertySpec::new("failTest", PropertyType::Boolean),
        ])
    }

    fn create(&self) -> Box<dyn Connector> {
        Box::new(MockConnector {
            factory: self.clone(),
            configuration: None,
            alive_checks: AtomicUsize::new(0),
        })
    }
}

pub struct MockConnector {
    factory: MockConnectorFactory,
    configuration: Option<Configuration>,
    alive_checks: AtomicUsize,
}

#[async_trait]
impl Connector for MockConnector {
    async fn init(&mut self, configuration: Configuration) -> ConnectorResult<()> {
        if let Some(delay) = self.factory.init_delay {
            tokio::time::sleep(delay).await;
        }
        if self.factory.fail_init {
            return Err(ConnectorError::ConnectionFailed {
                message: "mock init refused".to_string(),
            });
        }
        self.factory.counters.inits.fetch_add(1, Ordering::SeqCst);
        self.configuration = Some(configuration);
        Ok(())
    }

    async fn dispose(&mut self) {
        if self.configuration.take().is_some() {
            self.factory.counters.disposes.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn configuration(&self) -> Option<&Configuration> {
        self.configuration.as_ref()
    }

    fn as_create(&self) -> Option<&dyn CreateOp> {
        Some(self)
    }

    fn as_search(&self) -> Option<&dyn SearchOp> {
        Some(self)
    }

    fn as_test(&self) -> Option<&dyn TestOp> {
        Some(self)
    }

    fn as_poolable(&self) -> Option<&dyn PoolableConnector> {
        if self.factory.poolable {
            Some(self)
        } else {
            None
        }
    }
}

#[async_trait]
impl CreateOp for MockConnector {
    async fn create(
        &self,
        _object_class: &ObjectClass,
        attributes: AttributeSet,
        _options: &OperationOptions,
    ) -> ConnectorResult<Uid> {
        if let Some(delay) = self.factory.operation_delay {
            tokio::time::sleep(delay).await;
        }
        match attributes.get_str("__NAME__") {
            Some("duplicate") => Err(ConnectorError::AlreadyExists {
                uid: "duplicate".to_string(),
            }),
            Some(name) => Ok(Uid::new(name)),
            None => Err(ConnectorError::InvalidConfiguration {
                message: "__NAME__ is required".to_string(),
            }),
        }
    }
}

#[async_trait]
impl SearchOp for MockConnector {
    async fn search(
        &self,
        object_class: &ObjectClass,
        _filter: Option<&Filter>,
        handler: &mut dyn ResultsHandler,
        _options: &OperationOptions,
    ) -> ConnectorResult<SearchResult> {
        let counters = &self.factory.counters;
        counters.open_cursors.fetch_add(1, Ordering::SeqCst);
        let mut complete = true;
        for index in 1..=self.factory.records {
            let object = ConnectorObject::new(object_class.clone(), Uid::new(format!("r{index}")))
                .with_name(format!("record-{index}"));
            if !handler.handle(object).await {
                complete = false;
                break;
            }
            counters.accepted.fetch_add(1, Ordering::SeqCst);
        }
        counters.open_cursors.fetch_sub(1, Ordering::SeqCst);
        Ok(SearchResult {
            all_results_returned: complete,
            ..SearchResult::default()
        })
    }
}

#[async_trait]
impl TestOp for MockConnector {
    async fn test(&self) -> ConnectorResult<()> {
        let fail = self
            .configuration
            .as_ref()
            .and_then(|c| c.get_bool("failTest"))
            .unwrap_or(false);
        if fail {
            return Err(ConnectorError::ConnectionFailed {
                message: "target unreachable".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl PoolableConnector for MockConnector {
    async fn check_alive(&self) -> ConnectorResult<()> {
        if self.factory.counters.unreachable.load(Ordering::SeqCst) {
            return Err(ConnectorError::ConnectionFailed {
                message: "target unreachable".to_string(),
            });
        }
        let checks = self.alive_checks.fetch_add(1, Ordering::SeqCst) + 1;
        match self.factory.fail_alive_after {
            Some(limit) if checks > limit => Err(ConnectorError::ConnectionFailed {
                message: format!("connection lost after {limit} checks"),
            }),
            _ => Ok(()),
        }
    }
}
