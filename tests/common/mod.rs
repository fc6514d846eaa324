#![allow(dead_code)]

use async_trait::async_trait;
use connector_host::bundle::{
    BundleManifest, ConnectorDeclaration, ConnectorFactoryRegistry, LocalConnectorInfoManager,
};
use connector_host::config::ServerConfig;
use connector_host::connector::{
    AttributeSet, Capability, Configuration, ConfigurationSchema, Connector, ConnectorFactory,
    ConnectorKey, ConnectorObject, CreateOp, Filter, ObjectClass, OperationOptions,
    PoolableConnector, PropertySpec, PropertyType, ResultsHandler, SearchOp, SearchResult, TestOp,
    Uid,
};
use connector_host::error::{ConnectorError, ConnectorResult, Result};
use connector_host::pool::PoolConfig;
use connector_host::remote::RemoteFrameworkConnectionInfo;
use connector_host::security::{GuardedSecret, HashAlgorithm, SecretHash};
use connector_host::server::{ConnectorServer, ServerMetrics};
use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

pub const SHARED_SECRET: &str = "integration-shared-secret";
pub const TEST_BUNDLE: &str = "integration-bundle";
pub const TEST_VERSION: &str = "2.1.0";
pub const COUNTING_CLASS: &str = "CountingConnector";

/// Observable side effects of every instance a factory created.
#[derive(Default)]
pub struct Counters {
    pub inits: AtomicUsize,
    pub disposes: AtomicUsize,
    pub alive_checks: AtomicUsize,
    pub open_cursors: AtomicUsize,
    /// Results the handler accepted.
    pub delivered: AtomicUsize,
    pub in_flight: AtomicUsize,
    pub peak_in_flight: AtomicUsize,
}

impl Counters {
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

#[derive(Clone)]
pub struct CountingConnectorFactory {
    counters: Arc<Counters>,
    records: usize,
    fail_alive_after: Option<usize>,
    hold: Duration,
}

impl CountingConnectorFactory {
    pub fn new() -> Self {
        Self {
            counters: Arc::new(Counters::default()),
            records: 5,
            fail_alive_after: None,
            hold: Duration::ZERO,
        }
    }

    pub fn with_records(mut self, records: usize) -> Self {
        self.records = records;
        self
    }

    /// The liveness check fails once it ran more than `checks` times.
    pub fn fail_alive_after(mut self, checks: usize) -> Self {
        self.fail_alive_after = Some(checks);
        self
    }

    /// `test()` keeps the instance busy this long.
    pub fn holding(mut self, hold: Duration) -> Self {
        self.hold = hold;
        self
    }

    pub fn counters(&self) -> Arc<Counters> {
        self.counters.clone()
    }
}

impl ConnectorFactory for CountingConnectorFactory {
    fn capabilities(&self) -> BTreeSet<Capability> {
        [
            Capability::Create,
            Capability::Search,
            Capability::Test,
            Capability::Pooling,
        ]
        .into_iter()
        .collect()
    }

    fn configuration_schema(&self) -> ConfigurationSchema {
        ConfigurationSchema::new(vec![
            PropertySpec::new("endpoint", PropertyType::String).required(),
            PropertySpec::new("password", PropertyType::Secret),
        ])
    }

    fn create(&self) -> Box<dyn Connector> {
        Box::new(CountingConnector {
            factory: self.clone(),
            configuration: None,
        })
    }
}

struct CountingConnector {
    factory: CountingConnectorFactory,
    configuration: Option<Configuration>,
}

#[async_trait]
impl Connector for CountingConnector {
    async fn init(&mut self, configuration: Configuration) -> ConnectorResult<()> {
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
        Some(self)
    }
}

#[async_trait]
impl CreateOp for CountingConnector {
    async fn create(
        &self,
        _object_class: &ObjectClass,
        attributes: AttributeSet,
        _options: &OperationOptions,
    ) -> ConnectorResult<Uid> {
        match attributes.get_str(AttributeSet::NAME_ATTRIBUTE) {
            Some(name) if name.starts_with("taken") => Err(ConnectorError::AlreadyExists {
                uid: name.to_string(),
            }),
            Some(name) => Ok(Uid::new(format!("uid-{name}"))),
            None => Err(ConnectorError::OperationFailed {
                message: "name is required".to_string(),
                code: Some("E_NAME".to_string()),
            }),
        }
    }
}

#[async_trait]
impl SearchOp for CountingConnector {
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
                .with_name(format!("record {index}"));
            if !handler.handle(object).await {
                complete = false;
                break;
            }
            counters.delivered.fetch_add(1, Ordering::SeqCst);
        }
        counters.open_cursors.fetch_sub(1, Ordering::SeqCst);
        Ok(SearchResult {
            all_results_returned: complete,
            ..SearchResult::default()
        })
    }
}

#[async_trait]
impl TestOp for CountingConnector {
    async fn test(&self) -> ConnectorResult<()> {
        let counters = &self.factory.counters;
        let now = counters.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        counters.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.factory.hold.is_zero() {
            tokio::time::sleep(self.factory.hold).await;
        }
        counters.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl PoolableConnector for CountingConnector {
    async fn check_alive(&self) -> ConnectorResult<()> {
        let checks = self.factory.counters.alive_checks.fetch_add(1, Ordering::SeqCst) + 1;
        match self.factory.fail_alive_after {
            Some(limit) if checks > limit => Err(ConnectorError::ConnectionFailed {
                message: "socket reset".to_string(),
            }),
            _ => Ok(()),
        }
    }
}

pub fn counting_key() -> ConnectorKey {
    ConnectorKey::new(TEST_BUNDLE, TEST_VERSION, COUNTING_CLASS)
}

pub fn configuration() -> Configuration {
    Configuration::new().with("endpoint", "ldap://directory.test")
}

pub fn manager_with(
    factory: CountingConnectorFactory,
    pool_config: PoolConfig,
) -> LocalConnectorInfoManager {
    let registry = ConnectorFactoryRegistry::new().with(COUNTING_CLASS, Arc::new(factory));
    let bundle = BundleManifest::new(TEST_BUNDLE, TEST_VERSION).with_connector(
        ConnectorDeclaration::new(COUNTING_CLASS).with_display_name("Counting connector"),
    );
    let (manager, report) = LocalConnectorInfoManager::builder(registry)
        .bundle(bundle)
        .pool_config(pool_config)
        .scan()
        .expect("test bundle scans");
    assert!(report.excluded.is_empty());
    manager
}

pub fn manager(factory: CountingConnectorFactory) -> LocalConnectorInfoManager {
    manager_with(factory, PoolConfig::default())
}

pub fn key_hash(secret: &str) -> String {
    let secret = GuardedSecret::from_string(secret.to_string()).unwrap();
    SecretHash::generate(&secret, HashAlgorithm::Sha256)
        .unwrap()
        .to_string()
}

pub struct TestServer {
    pub addr: SocketAddr,
    pub metrics_addr: Option<SocketAddr>,
    pub server: Option<JoinHandle<Result<()>>>,
    metrics: Arc<ServerMetrics>,
    manager: Arc<LocalConnectorInfoManager>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl TestServer {
    pub async fn start(manager: LocalConnectorInfoManager) -> Self {
        Self::start_with(manager, None).await
    }

    /// Also serves `/metrics` on an ephemeral port.
    pub async fn start_with_metrics(manager: LocalConnectorInfoManager) -> Self {
        Self::start_with(manager, Some("127.0.0.1:0".to_string())).await
    }

    async fn start_with(
        manager: LocalConnectorInfoManager,
        metrics_address: Option<String>,
    ) -> Self {
        let config = ServerConfig {
            port: 0,
            key_hash: key_hash(SHARED_SECRET),
            handshake_timeout_ms: 2_000,
            metrics_address,
            ..ServerConfig::default()
        };
        let manager = Arc::new(manager);
        let server = ConnectorServer::bind(&config, manager.clone())
            .await
            .expect("server binds");
        let addr = server.local_addr().unwrap();
        let metrics_addr = server.metrics_addr();
        let metrics = server.metrics();
        let (tx, rx) = oneshot::channel();
        let handle = tokio::spawn(server.run_until(async {
            let _ = rx.await;
        }));
        Self {
            addr,
            metrics_addr,
            server: Some(handle),
            metrics,
            manager,
            shutdown: Some(tx),
        }
    }

    pub fn render_metrics(&self) -> String {
        self.metrics
            .render_with_pools(self.manager.pools())
            .expect("metrics render")
    }

    pub fn connection_info(&self, secret: &str) -> RemoteFrameworkConnectionInfo {
        let key = GuardedSecret::from_string(secret.to_string()).unwrap();
        RemoteFrameworkConnectionInfo::new("127.0.0.1", self.addr.port(), key)
            .with_connect_timeout(Duration::from_secs(2))
    }

    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.server.take() {
            handle.await.unwrap().unwrap();
        }
    }
}
